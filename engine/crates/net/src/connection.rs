use std::os::fd::AsFd;

use session::{ConnectionEnds, DelayGate, OutboundRx, OutboundTx, SessionHandle, SessionId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::channels::{EventTx, NetEvent, ResumedSession};
use crate::rate_limiter::ConnectionPermit;
use crate::telnet::{Frame, Framer, FramerError};

/// How a connection is introduced to the control loop.
#[derive(Debug)]
pub enum Announce {
    New,
    Resumed(ResumedSession),
}

/// Why a connection's bridge stopped.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionEnd {
    #[error("peer closed the connection")]
    Eof,
    #[error("read failed: {0}")]
    ReadFailed(std::io::Error),
    #[error("write failed: {0}")]
    WriteFailed(std::io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] FramerError),
    #[error("closed by server")]
    Closed,
    #[error("control loop stopped")]
    ControlLoopGone,
}

/// Sends `SessionLost` when the bridge task ends, however it ends.
struct LostGuard {
    session_id: SessionId,
    events: EventTx,
}

impl Drop for LostGuard {
    fn drop(&mut self) {
        let _ = self.events.send(NetEvent::SessionLost {
            session_id: self.session_id,
        });
    }
}

/// Register a connection with the control loop and start its I/O bridge.
///
/// The announcement is queued before the bridge task exists, so the control
/// loop always sees the session before any of its lines. The handle keeps
/// its own duplicate of the socket descriptor, so the number it reports
/// cannot be reused by a later connection while the control loop still
/// knows the session.
///
/// Returns false only if the control loop is gone. A socket that cannot be
/// duplicated is dropped without an announcement.
pub fn spawn_connection(
    stream: TcpStream,
    session_id: SessionId,
    events: EventTx,
    announce: Announce,
    permit: Option<ConnectionPermit>,
) -> bool {
    let socket = match stream.as_fd().try_clone_to_owned() {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!(%session_id, error = %e, "cannot duplicate socket, dropping connection");
            return true;
        }
    };
    let peer = stream.peer_addr().ok();
    let (handle, ends) = SessionHandle::new(session_id, Some(socket));

    let event = match announce {
        Announce::New => NetEvent::NewSession { handle, peer },
        Announce::Resumed(resume) => NetEvent::SessionResumed {
            handle,
            peer,
            resume,
        },
    };
    if events.send(event).is_err() {
        tracing::warn!(%session_id, "control loop gone, dropping connection");
        return false;
    }

    tokio::spawn(run_bridge(stream, session_id, ends, events, permit));
    true
}

async fn run_bridge(
    stream: TcpStream,
    session_id: SessionId,
    ends: ConnectionEnds,
    events: EventTx,
    permit: Option<ConnectionPermit>,
) {
    let _lost = LostGuard {
        session_id,
        events: events.clone(),
    };
    let _permit = permit;

    let ConnectionEnds {
        outbound_tx,
        outbound_rx,
        close_rx,
        delay,
    } = ends;
    let (reader, writer) = stream.into_split();

    // Whichever side finishes first ends the connection; the other is dropped.
    let end = tokio::select! {
        end = inbound_loop(reader, session_id, &events, &outbound_tx, &delay) => end,
        end = outbound_loop(writer, outbound_rx, close_rx) => end,
    };

    match &end {
        ConnectionEnd::Protocol(_) => tracing::warn!(%session_id, reason = %end, "connection dropped"),
        _ => tracing::info!(%session_id, reason = %end, "connection ended"),
    }
}

async fn inbound_loop(
    mut reader: OwnedReadHalf,
    session_id: SessionId,
    events: &EventTx,
    outbound: &OutboundTx,
    delay: &DelayGate,
) -> ConnectionEnd {
    let mut framer = Framer::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return ConnectionEnd::Eof,
            Ok(n) => n,
            Err(e) => return ConnectionEnd::ReadFailed(e),
        };
        framer.push(&buf[..n]);

        loop {
            match framer.next_frame() {
                Ok(Some(Frame::Negotiation(negotiation))) => {
                    tracing::trace!(%session_id, ?negotiation, "refusing telnet option");
                    let _ = outbound.send(negotiation.refusal().to_vec());
                }
                Ok(Some(Frame::Line(line))) => {
                    delay.wait().await;
                    if events.send(NetEvent::Line { session_id, line }).is_err() {
                        return ConnectionEnd::ControlLoopGone;
                    }
                }
                Ok(None) => break,
                Err(e) => return e.into(),
            }
        }
    }
}

async fn outbound_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: OutboundRx,
    mut close_rx: watch::Receiver<bool>,
) -> ConnectionEnd {
    loop {
        tokio::select! {
            biased;
            payload = outbound.recv() => match payload {
                Some(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        return ConnectionEnd::WriteFailed(e);
                    }
                }
                None => return ConnectionEnd::Closed,
            },
            _ = close_requested(&mut close_rx) => {
                // Flush whatever was queued before the close.
                while let Ok(bytes) = outbound.try_recv() {
                    if let Err(e) = writer.write_all(&bytes).await {
                        return ConnectionEnd::WriteFailed(e);
                    }
                }
                let _ = writer.shutdown().await;
                return ConnectionEnd::Closed;
            }
        }
    }
}

/// Resolves once close is requested or every handle is dropped.
async fn close_requested(close_rx: &mut watch::Receiver<bool>) {
    loop {
        if *close_rx.borrow_and_update() {
            return;
        }
        if close_rx.changed().await.is_err() {
            return;
        }
    }
}
