//! Presence, invite handshake and the lobby service that owns them

pub mod broker;
pub mod presence;
pub mod service;

#[cfg(test)]
pub use presence::ConnectionHandle;
pub use service::LobbyService;
