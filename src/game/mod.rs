//! Game simulation modules

pub mod clock;
pub mod combat;
pub mod entity;
pub mod lobby;
pub mod r#match;
pub mod physics;
pub mod rules;
pub mod snapshot;

pub use r#match::{GameMatch, MatchHandle, MatchPhase};

use crate::ws::protocol::ClientMsg;
use entity::ConnId;

/// What a connection asked the match to do
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A socket opened; it gets the current lobby state
    Connected,
    /// A decoded client message
    Message(ClientMsg),
    /// The socket closed
    Disconnected,
}

/// Request from a WebSocket session to the match task
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub conn_id: ConnId,
    pub event: SessionEvent,
}
