use std::net::SocketAddr;

use session::{SessionHandle, SessionId};
use tokio::sync::mpsc;

/// Actor binding carried over a hot restart for an inherited connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumedSession {
    pub actor_name: String,
    pub room: u32,
}

/// Messages from connection tasks to the control loop.
#[derive(Debug)]
pub enum NetEvent {
    /// A connection was accepted. Always precedes any `Line` for the session.
    NewSession {
        handle: SessionHandle,
        peer: Option<SocketAddr>,
    },
    /// An inherited connection was adopted after a hot restart.
    SessionResumed {
        handle: SessionHandle,
        peer: Option<SocketAddr>,
        resume: ResumedSession,
    },
    /// One complete input line.
    Line { session_id: SessionId, line: String },
    /// The connection is gone. Sent exactly once per session.
    SessionLost { session_id: SessionId },
}

impl NetEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::NewSession { handle, .. } | Self::SessionResumed { handle, .. } => {
                handle.session_id()
            }
            Self::Line { session_id, .. } | Self::SessionLost { session_id } => *session_id,
        }
    }
}

/// Sender from connection tasks to the control loop.
pub type EventTx = mpsc::UnboundedSender<NetEvent>;
/// Receiver in the control loop.
pub type EventRx = mpsc::UnboundedReceiver<NetEvent>;
