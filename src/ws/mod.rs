//! WebSocket transport

pub mod handler;
pub mod protocol;
