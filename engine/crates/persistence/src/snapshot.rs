use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

pub const SNAPSHOT_VERSION: u32 = 1;

/// One live connection carried across a hot restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSession {
    /// Descriptor of the accepted socket, valid in the successor image.
    pub fd: i32,
    pub name: String,
    pub room: u32,
}

/// Everything the successor process needs to pick up the running server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSnapshot {
    pub version: u32,
    pub listener_fd: i32,
    pub sessions: Vec<SnapshotSession>,
}

impl RestartSnapshot {
    pub fn new(listener_fd: i32) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            listener_fd,
            sessions: Vec::new(),
        }
    }

    pub fn push(&mut self, fd: i32, name: impl Into<String>, room: u32) {
        self.sessions.push(SnapshotSession {
            fd,
            name: name.into(),
            room,
        });
    }

    /// Every descriptor the successor has to inherit.
    pub fn descriptors(&self) -> Vec<i32> {
        std::iter::once(self.listener_fd)
            .chain(self.sessions.iter().map(|s| s.fd))
            .collect()
    }
}

/// The restart snapshot's single file at a well-known path.
///
/// Written once by the outgoing process, consumed once by its successor.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a consumed snapshot is moved so a crash loop cannot replay it.
    pub fn consumed_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".consumed");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the snapshot, refusing to replace one already on disk.
    pub fn create(&self, snapshot: &RestartSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PersistenceError::SnapshotExists(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            let _ = std::fs::remove_file(&self.path);
            return Err(e.into());
        }

        tracing::info!(
            sessions = snapshot.sessions.len(),
            bytes = bytes.len(),
            path = %self.path.display(),
            "restart snapshot written"
        );
        Ok(())
    }

    /// Read the snapshot if one is present and move it out of the way.
    ///
    /// The file is renamed before it is parsed, so a snapshot that crashes
    /// the successor is never processed twice.
    pub fn take(&self) -> Result<Option<RestartSnapshot>, PersistenceError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        std::fs::rename(&self.path, self.consumed_path())?;

        let snapshot: RestartSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                got: snapshot.version,
            });
        }
        tracing::info!(
            sessions = snapshot.sessions.len(),
            listener_fd = snapshot.listener_fd,
            path = %self.path.display(),
            "restart snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// Remove a snapshot that will not be consumed (replacement failed).
    pub fn discard(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RestartSnapshot {
        let mut snap = RestartSnapshot::new(3);
        snap.push(7, "Alice", 2);
        snap.push(9, "Bob", 1);
        snap
    }

    #[test]
    fn create_then_take_consumes_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("copyover.json"));

        file.create(&sample()).unwrap();
        assert!(file.exists());

        let loaded = file.take().unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.descriptors(), vec![3, 7, 9]);
        assert!(!file.exists());
        assert!(file.consumed_path().exists());

        assert!(file.take().unwrap().is_none());
    }

    #[test]
    fn create_refuses_existing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("copyover.json"));
        file.create(&sample()).unwrap();

        let err = file.create(&RestartSnapshot::new(4)).unwrap_err();
        assert!(matches!(err, PersistenceError::SnapshotExists(_)));
        // The first snapshot is untouched.
        assert_eq!(file.take().unwrap().unwrap(), sample());
    }

    #[test]
    fn create_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("data/nested/copyover.json"));
        file.create(&sample()).unwrap();
        assert!(file.exists());
    }

    #[test]
    fn discard_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("copyover.json"));
        file.create(&sample()).unwrap();
        file.discard().unwrap();
        assert!(!file.exists());
        file.discard().unwrap();
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copyover.json");
        std::fs::write(&path, r#"{"version":99,"listener_fd":3,"sessions":[]}"#).unwrap();

        let file = SnapshotFile::new(&path);
        let err = file.take().unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::VersionMismatch { expected: 1, got: 99 }
        ));
        assert!(!file.exists());
    }

    #[test]
    fn garbage_is_corrupt_and_still_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copyover.json");
        std::fs::write(&path, b"not json").unwrap();

        let file = SnapshotFile::new(&path);
        assert!(matches!(file.take().unwrap_err(), PersistenceError::Corrupt(_)));
        assert!(file.consumed_path().exists());
    }

    #[test]
    fn file_format_is_plain_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["listener_fd"], 3);
        assert_eq!(json["sessions"][0]["fd"], 7);
        assert_eq!(json["sessions"][0]["name"], "Alice");
        assert_eq!(json["sessions"][1]["room"], 1);
    }
}
