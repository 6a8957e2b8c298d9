//! Client-side state for the Pulse realtime protocol.
//!
//! The hub pushes events; this crate folds them into local conversation
//! state: optimistic sends, server reconciliation, and delivery status
//! tracking.

pub mod store;
