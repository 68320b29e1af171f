use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("snapshot already exists at {}", .0.display())]
    SnapshotExists(PathBuf),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() || e.is_data() {
            PersistenceError::Corrupt(e.to_string())
        } else {
            PersistenceError::Serialization(e.to_string())
        }
    }
}
