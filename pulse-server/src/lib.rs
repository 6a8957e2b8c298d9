//! Pulse realtime hub library.
//!
//! Hosts the presence registry, typing tracker, room membership, message
//! delivery engine, reaction manager, and group broadcast relay behind a
//! single injected [`realtime::Realtime`] service, plus the axum WebSocket
//! layer that feeds it. Exposed as a library for embedding in tests.

pub mod config;
pub mod delivery;
pub mod groups;
pub mod hub;
pub mod presence;
pub mod reactions;
pub mod realtime;
pub mod rooms;
pub mod socket;
pub mod store;
pub mod typing;
