use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::SessionId;

/// Outbound byte queue: control loop (and framer refusals) -> writer task.
pub type OutboundTx = mpsc::UnboundedSender<Vec<u8>>;
pub type OutboundRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// Earliest instant at which the next inbound line of a session may be
/// handed to the control loop.
///
/// This is the only per-session field written outside the control loop's
/// ownership; every access is a single load or store under the lock.
#[derive(Debug, Clone)]
pub struct DelayGate(Arc<Mutex<Instant>>);

impl DelayGate {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    /// Hold back further input until `duration` from now.
    pub fn delay_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        *self.lock() = until;
    }

    pub fn deadline(&self) -> Instant {
        *self.lock()
    }

    /// Suspend until the deadline has passed. Re-reads the deadline after
    /// waking, since it may have been pushed further out meanwhile.
    pub async fn wait(&self) {
        loop {
            let deadline = self.deadline();
            if deadline <= Instant::now() {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        // A poisoned lock still holds a valid instant.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DelayGate {
    fn default() -> Self {
        Self::new()
    }
}

/// The control loop's grip on one connection: enqueue bytes, request close,
/// set the input delay. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    outbound: OutboundTx,
    close: Arc<watch::Sender<bool>>,
    delay: DelayGate,
    /// A duplicate of the connection's socket. While any handle is alive the
    /// descriptor number cannot be handed to another connection, even after
    /// the I/O bridge has dropped its own copy.
    socket: Option<Arc<OwnedFd>>,
}

/// The connection side of a [`SessionHandle`], consumed by the I/O bridge.
#[derive(Debug)]
pub struct ConnectionEnds {
    /// Used by the inbound loop to queue negotiation refusals, so that all
    /// socket writes go through the single outbound path.
    pub outbound_tx: OutboundTx,
    pub outbound_rx: OutboundRx,
    pub close_rx: watch::Receiver<bool>,
    pub delay: DelayGate,
}

impl SessionHandle {
    /// Create a handle and the matching connection ends. `socket` is a
    /// duplicate of the accepted socket's descriptor, when there is one.
    pub fn new(session_id: SessionId, socket: Option<OwnedFd>) -> (Self, ConnectionEnds) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let delay = DelayGate::new();

        let handle = Self {
            session_id,
            outbound: outbound_tx.clone(),
            close: Arc::new(close_tx),
            delay: delay.clone(),
            socket: socket.map(Arc::new),
        };
        let ends = ConnectionEnds {
            outbound_tx,
            outbound_rx,
            close_rx,
            delay,
        };
        (handle, ends)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue bytes for the writer. Returns false once the connection is gone.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outbound.send(bytes.into()).is_ok()
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send(text.as_bytes().to_vec())
    }

    /// Ask the writer to flush what is queued and stop. Idempotent.
    pub fn close(&self) {
        self.close.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.close.borrow() || self.outbound.is_closed()
    }

    pub fn delay_for(&self, duration: Duration) {
        self.delay.delay_for(duration);
    }

    pub fn delay_gate(&self) -> &DelayGate {
        &self.delay
    }

    /// Descriptor held by this handle for the underlying socket. It stays
    /// open, and its number reserved, until the last handle is dropped.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|fd| fd.as_raw_fd())
    }
}
