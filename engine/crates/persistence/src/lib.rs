pub mod error;
pub mod snapshot;

pub use error::PersistenceError;
pub use snapshot::{RestartSnapshot, SnapshotFile, SnapshotSession, SNAPSHOT_VERSION};
