use std::path::Path;

use rusqlite::Connection;

use crate::character::CharacterRepo;
use crate::error::WorldDbError;
use crate::room::RoomRepo;
use crate::schema;

/// Main database handle wrapping a SQLite connection.
pub struct WorldDb {
    conn: Connection,
}

impl WorldDb {
    /// Open (or create) a database at the given file path. A new file has
    /// no rooms until [`WorldDb::seed_default_rooms`] is called.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorldDbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    /// Open an in-memory database with the default rooms (for testing).
    pub fn open_memory() -> Result<Self, WorldDbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self::init(conn)?;
        db.seed_default_rooms()?;
        Ok(db)
    }

    fn init(conn: Connection) -> Result<Self, WorldDbError> {
        schema::create_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Add the default rooms if the world has none. Returns whether it did.
    pub fn seed_default_rooms(&self) -> Result<bool, WorldDbError> {
        schema::seed_rooms(&self.conn)
    }

    /// Get room repository.
    pub fn rooms(&self) -> RoomRepo<'_> {
        RoomRepo::new(&self.conn)
    }

    /// Get character repository.
    pub fn characters(&self) -> CharacterRepo<'_> {
        CharacterRepo::new(&self.conn)
    }
}

impl std::fmt::Debug for WorldDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_db_is_seeded() {
        let db = WorldDb::open_memory().unwrap();
        let rooms = db.rooms().load_all().unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(db.characters().get_by_name("nobody").unwrap().is_none());
    }

    #[test]
    fn file_db_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/world.db");
        {
            let db = WorldDb::open(&path).unwrap();
            assert!(db.seed_default_rooms().unwrap());
            db.characters().create("Alice", "$hash", 1, 2).unwrap();
        }
        let db = WorldDb::open(&path).unwrap();
        assert_eq!(db.rooms().load_all().unwrap().len(), 2);
        let alice = db.characters().get_by_name("alice").unwrap().unwrap();
        assert_eq!(alice.room_id, Some(2));
        assert!(!db.seed_default_rooms().unwrap());
    }

    #[test]
    fn file_db_has_no_rooms_until_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let db = WorldDb::open(dir.path().join("world.db")).unwrap();
        assert!(matches!(db.rooms().load_all(), Err(WorldDbError::EmptyWorld)));
        assert!(db.seed_default_rooms().unwrap());
        assert_eq!(db.rooms().load_all().unwrap().len(), 2);
    }
}
