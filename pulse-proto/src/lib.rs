//! Shared protocol definitions for the Pulse realtime wire format.

pub mod codec;
pub mod event;
pub mod ids;
pub mod message;
