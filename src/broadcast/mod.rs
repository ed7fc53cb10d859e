//! WebSocket broadcast hub
//!
//! Live connections grouped by channel. Writes publish [`DomainEvent`]s
//! which the hub fans out to every subscribed connection without blocking
//! on any single one.

pub mod channel;
pub mod connection;
pub mod events;
pub mod hub;
pub mod protocol;

use thiserror::Error;

pub use channel::{Channel, InvalidChannel};
pub use events::{Action, DomainEvent};
pub use hub::{ConnectionHandle, ConnectionId, HeartbeatReport, Hub, HubConfig, HubStats, Outbound};
pub use protocol::{ClientMessage, ServerMessage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("Authentication required for private channels")]
    AuthenticationRequired,
    #[error("Unauthorized for this channel")]
    Unauthorized,
    #[error(transparent)]
    InvalidChannel(#[from] InvalidChannel),
    #[error("unknown connection")]
    UnknownConnection,
}
