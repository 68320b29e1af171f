use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

mod handle;
mod throttle;

pub use handle::{ConnectionEnds, DelayGate, OutboundRx, OutboundTx, SessionHandle};
pub use throttle::InputThrottle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to an in-world actor owned by the world model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

/// Where a session stands in the pre-gameplay exchange.
///
/// Progression is forward only, except for the explicit retry edges taken
/// by the admission state machine (rejected name, declined confirmation,
/// wrong or mismatched credential).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    Unauthenticated,
    AwaitingName,
    AwaitingNameConfirmation,
    AwaitingCredential,
    AwaitingCredentialConfirmation,
    AwaitingAcknowledgement,
    Interactive,
}

impl AdmissionState {
    pub fn is_interactive(self) -> bool {
        self == Self::Interactive
    }
}

/// Server-side state of one connection. Owned by the control loop.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub state: AdmissionState,
    pub actor: Option<ActorId>,
    /// Name chosen during admission, not yet bound to an actor.
    pub pending_name: Option<String>,
    /// The pending name belongs to a stored character.
    pub returning: bool,
    /// Credential hash chosen during admission, kept until it is stored.
    pub pending_credential: Option<String>,
    pub throttle: InputThrottle,
    handle: SessionHandle,
}

impl Session {
    pub fn new(handle: SessionHandle, peer: Option<SocketAddr>) -> Self {
        Self {
            id: handle.session_id(),
            peer,
            state: AdmissionState::Unauthenticated,
            actor: None,
            pending_name: None,
            returning: false,
            pending_credential: None,
            throttle: InputThrottle::unlimited(),
            handle,
        }
    }

    /// A session carried over a hot restart: already admitted and bound.
    pub fn resumed(handle: SessionHandle, peer: Option<SocketAddr>, actor: ActorId) -> Self {
        Self {
            state: AdmissionState::Interactive,
            actor: Some(actor),
            ..Self::new(handle, peer)
        }
    }

    /// Forget everything chosen during admission.
    pub fn clear_pending(&mut self) {
        self.pending_name = None;
        self.returning = false;
        self.pending_credential = None;
    }

    pub fn with_throttle(mut self, throttle: InputThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn send(&self, text: &str) -> bool {
        self.handle.send_text(text)
    }

    pub fn is_interactive(&self) -> bool {
        self.state.is_interactive()
    }

    /// Peer address for log lines.
    pub fn origin(&self) -> String {
        self.peer
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "inherited".to_string())
    }
}

/// The set of connected sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. A session with the same id is replaced and closed.
    pub fn insert(&mut self, session: Session) {
        if let Some(previous) = self.sessions.insert(session.id, session) {
            tracing::warn!(session_id = %previous.id, "session id reused, closing previous");
            previous.handle.close();
        }
    }

    /// Remove and close a session. Removing an unknown id is a no-op, so
    /// duplicate loss notifications are harmless.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        session.handle.close();
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// All sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn interactive(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.is_interactive())
    }

    pub fn session_for_actor(&self, actor: ActorId) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|s| s.actor == Some(actor))
            .map(|s| s.id)
    }

    /// Queue `text` on every session, admitted or not.
    pub fn broadcast(&self, text: &str) {
        for session in self.sessions.values() {
            session.send(text);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
