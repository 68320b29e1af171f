use std::io;
use std::os::fd::RawFd;

use engine_core::ProcessReplacer;
use persistence::{PersistenceError, RestartSnapshot, SnapshotFile};
use session::{SessionId, SessionRegistry};

use crate::world::{RoomId, World};

pub const RESTART_WARNING: &str =
    "An awful whining noise rises to a shrill pitch as the fabric of reality pulls itself apart at the seams.\r\n";

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("a restart is already under way")]
    InProgress,

    #[error(transparent)]
    Snapshot(#[from] PersistenceError),

    #[error("there is no listening socket to hand over")]
    NoListener,

    #[error("session {0} has no socket descriptor")]
    MissingDescriptor(SessionId),

    #[error("could not replace the process: {0}")]
    Replace(#[source] io::Error),
}

struct PendingRestart {
    requester: SessionId,
    descriptors: Vec<RawFd>,
}

/// Hot restart: record every admitted session in the snapshot file, warn
/// everyone, then replace the process image with the sockets kept open.
pub struct RestartCoordinator {
    snapshot: SnapshotFile,
    listener_fd: Option<RawFd>,
    fallback_room: RoomId,
    replacer: Box<dyn ProcessReplacer>,
    pending: Option<PendingRestart>,
}

impl RestartCoordinator {
    pub fn new(snapshot: SnapshotFile, replacer: Box<dyn ProcessReplacer>) -> Self {
        Self {
            snapshot,
            listener_fd: None,
            fallback_room: RoomId(1),
            replacer,
            pending: None,
        }
    }

    pub fn with_listener(mut self, fd: RawFd) -> Self {
        self.listener_fd = Some(fd);
        self
    }

    /// Recorded for actors standing in a room that no longer exists.
    pub fn with_fallback_room(mut self, room: RoomId) -> Self {
        self.fallback_room = room;
        self
    }

    pub fn snapshot_file(&self) -> &SnapshotFile {
        &self.snapshot
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Write the snapshot and queue the warning on every session. Returns
    /// the number of sessions recorded. Nothing is written if a
    /// precondition fails.
    pub fn begin(
        &mut self,
        requester: SessionId,
        sessions: &SessionRegistry,
        world: &World,
    ) -> Result<usize, RestartError> {
        if self.pending.is_some() {
            return Err(RestartError::InProgress);
        }
        if self.snapshot.exists() {
            return Err(PersistenceError::SnapshotExists(self.snapshot.path().to_path_buf()).into());
        }
        let listener_fd = self.listener_fd.ok_or(RestartError::NoListener)?;

        let mut snapshot = RestartSnapshot::new(listener_fd);
        for session in sessions.interactive() {
            let Some(actor) = session.actor.and_then(|id| world.actor(id)) else {
                continue;
            };
            // The peer is gone and its loss is still queued. Its socket must
            // not be handed to the successor under this actor's name.
            if session.handle().is_closed() {
                tracing::debug!(session_id = %session.id, name = %actor.name, "skipping closed session");
                continue;
            }
            let fd = session
                .handle()
                .raw_fd()
                .ok_or(RestartError::MissingDescriptor(session.id))?;
            let room = if world.has_room(actor.room) {
                actor.room
            } else {
                self.fallback_room
            };
            snapshot.push(fd, &actor.name, room.0);
        }

        self.snapshot.create(&snapshot)?;
        let recorded = snapshot.sessions.len();
        tracing::info!(
            path = %self.snapshot.path().display(),
            sessions = recorded,
            "restart snapshot written"
        );

        sessions.broadcast(RESTART_WARNING);
        self.pending = Some(PendingRestart {
            requester,
            descriptors: snapshot.descriptors(),
        });
        Ok(recorded)
    }

    /// Replace the process. Only returns if that failed (or nothing was
    /// pending), after removing the snapshot, with the requester to tell.
    pub fn finish(&mut self) -> Option<(SessionId, RestartError)> {
        let pending = self.pending.take()?;
        let error = self.replacer.replace(&pending.descriptors);
        tracing::error!(error = %error, "process replacement failed");
        if let Err(e) = self.snapshot.discard() {
            tracing::error!(error = %e, "could not remove restart snapshot");
        }
        Some((pending.requester, RestartError::Replace(error)))
    }
}
