use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use session::SessionId;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::channels::{EventTx, ResumedSession};
use crate::connection::{spawn_connection, Announce};
use crate::handoff;
use crate::rate_limiter::{ConnectionPermit, SharedLimiter};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

/// The server's listening socket, with its descriptor exposed for hand-off.
#[derive(Debug)]
pub struct TelnetListener {
    inner: TcpListener,
}

impl TelnetListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }

    /// Reopen the listening socket inherited from the previous process image.
    pub fn adopt(fd: RawFd) -> io::Result<Self> {
        let inner = handoff::listener_from_fd(fd)?;
        Ok(Self { inner })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Accept connections until `shutdown` flips to true.
///
/// Each accepted socket is checked against the connection limits, announced
/// to the control loop and given its own I/O bridge. Rejected sockets get one
/// line of explanation and are closed.
pub async fn run_accept_loop(
    listener: TelnetListener,
    events: EventTx,
    limiter: SharedLimiter,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(addr = ?listener.local_addr().ok(), "accepting telnet connections");

    loop {
        let accepted = tokio::select! {
            accepted = listener.inner.accept() => accepted,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let (stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                // EMFILE and friends: back off instead of spinning.
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let permit = match ConnectionPermit::acquire(&limiter, peer_addr.ip()) {
            Ok(permit) => permit,
            Err(rejection) => {
                tracing::warn!(%peer_addr, %rejection, "connection rejected");
                tokio::spawn(async move {
                    let mut stream = stream;
                    let _ = stream
                        .write_all(format!("Sorry, {rejection}.\r\n").as_bytes())
                        .await;
                    let _ = stream.shutdown().await;
                });
                continue;
            }
        };

        let session_id = next_session_id();
        tracing::info!(%session_id, %peer_addr, "new connection");
        if !spawn_connection(stream, session_id, events.clone(), Announce::New, Some(permit)) {
            break;
        }
    }

    tracing::info!("accept loop stopped");
}

/// Adopt one connection inherited across a hot restart and announce it as
/// resumed. Fails if the descriptor is not an open socket.
pub fn adopt_session(
    fd: RawFd,
    events: &EventTx,
    limiter: &SharedLimiter,
    resume: ResumedSession,
) -> io::Result<SessionId> {
    let stream = handoff::stream_from_fd(fd)?;
    let permit = ConnectionPermit::inherited(limiter, stream.peer_addr().ok().map(|a| a.ip()));
    let session_id = next_session_id();
    tracing::info!(%session_id, fd, name = %resume.actor_name, "resuming connection");
    if !spawn_connection(
        stream,
        session_id,
        events.clone(),
        Announce::Resumed(resume),
        Some(permit),
    ) {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "control loop is not running",
        ));
    }
    Ok(session_id)
}
