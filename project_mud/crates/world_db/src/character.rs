use rusqlite::{Connection, Row};

use crate::credential::verify_credential;
use crate::error::WorldDbError;

/// A character record from the database.
#[derive(Debug, Clone)]
pub struct CharacterRecord {
    pub id: i64,
    pub name: String,
    pub level: u32,
    pub room_id: Option<u32>,
    pub created_at: String,
    pub last_played: Option<String>,
}

const COLUMNS: &str = "id, name, level, room_id, created_at, last_played";

fn from_row(row: &Row<'_>) -> rusqlite::Result<CharacterRecord> {
    Ok(CharacterRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        level: row.get(2)?,
        room_id: row.get(3)?,
        created_at: row.get(4)?,
        last_played: row.get(5)?,
    })
}

/// Repository for character operations.
pub struct CharacterRepo<'a> {
    conn: &'a Connection,
}

impl<'a> CharacterRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a character. `credential_hash` is the output of
    /// [`crate::hash_credential`].
    pub fn create(
        &self,
        name: &str,
        credential_hash: &str,
        level: u32,
        room_id: u32,
    ) -> Result<CharacterRecord, WorldDbError> {
        if self.get_by_name(name)?.is_some() {
            return Err(WorldDbError::CharacterNameTaken(name.to_string()));
        }

        self.conn.execute(
            "INSERT INTO characters (name, password_hash, level, room_id) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![name, credential_hash, level, room_id],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(character_id = id, name, "character created");
        self.load(id)
    }

    /// Load a character by ID.
    pub fn load(&self, id: i64) -> Result<CharacterRecord, WorldDbError> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM characters WHERE id = ?1"),
                rusqlite::params![id],
                from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => WorldDbError::CharacterNotFound(id.to_string()),
                other => other.into(),
            })
    }

    /// Get a character by name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, WorldDbError> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM characters WHERE name = ?1"),
            rusqlite::params![name],
            from_row,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check a credential. Returns the character on success.
    pub fn authenticate(&self, name: &str, credential: &str) -> Result<CharacterRecord, WorldDbError> {
        let result = self.conn.query_row(
            "SELECT id, password_hash FROM characters WHERE name = ?1",
            rusqlite::params![name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );
        let (id, hash) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(WorldDbError::CharacterNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        verify_credential(credential, &hash)?;

        self.conn.execute(
            "UPDATE characters SET last_played = datetime('now') WHERE id = ?1",
            rusqlite::params![id],
        )?;
        self.load(id)
    }

    /// Record where a character is standing.
    pub fn save_location(&self, id: i64, room_id: u32) -> Result<(), WorldDbError> {
        let rows = self.conn.execute(
            "UPDATE characters SET room_id = ?1, last_played = datetime('now') WHERE id = ?2",
            rusqlite::params![room_id, id],
        )?;
        if rows == 0 {
            return Err(WorldDbError::CharacterNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_level(&self, id: i64, level: u32) -> Result<(), WorldDbError> {
        let rows = self.conn.execute(
            "UPDATE characters SET level = ?1 WHERE id = ?2",
            rusqlite::params![level, id],
        )?;
        if rows == 0 {
            return Err(WorldDbError::CharacterNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{hash_credential, WorldDb, WorldDbError};

    #[test]
    fn create_character() {
        let db = WorldDb::open_memory().unwrap();
        let hash = hash_credential("secret").unwrap();
        let c = db.characters().create("Alice", &hash, 1, 2).unwrap();
        assert_eq!(c.name, "Alice");
        assert_eq!(c.level, 1);
        assert_eq!(c.room_id, Some(2));
        assert!(!c.created_at.is_empty());
    }

    #[test]
    fn duplicate_name_rejected_case_insensitively() {
        let db = WorldDb::open_memory().unwrap();
        db.characters().create("Hero", "$h", 1, 2).unwrap();
        let result = db.characters().create("hero", "$h", 1, 2);
        assert!(matches!(result, Err(WorldDbError::CharacterNameTaken(_))));
    }

    #[test]
    fn authenticate_success_and_failure() {
        let db = WorldDb::open_memory().unwrap();
        let hash = hash_credential("secret123").unwrap();
        db.characters().create("Hero", &hash, 1, 2).unwrap();

        let ok = db.characters().authenticate("hero", "secret123").unwrap();
        assert_eq!(ok.name, "Hero");
        assert!(ok.last_played.is_some());

        assert!(matches!(
            db.characters().authenticate("Hero", "wrong"),
            Err(WorldDbError::InvalidCredential)
        ));
        assert!(matches!(
            db.characters().authenticate("Ghost", "x"),
            Err(WorldDbError::CharacterNotFound(_))
        ));
    }

    #[test]
    fn save_location_and_level() {
        let db = WorldDb::open_memory().unwrap();
        let c = db.characters().create("Walker", "$h", 1, 2).unwrap();
        db.characters().save_location(c.id, 1).unwrap();
        db.characters().set_level(c.id, 60).unwrap();

        let loaded = db.characters().load(c.id).unwrap();
        assert_eq!(loaded.room_id, Some(1));
        assert_eq!(loaded.level, 60);
    }

    #[test]
    fn missing_character_errors() {
        let db = WorldDb::open_memory().unwrap();
        assert!(matches!(
            db.characters().save_location(99, 1),
            Err(WorldDbError::CharacterNotFound(_))
        ));
        assert!(matches!(
            db.characters().load(99),
            Err(WorldDbError::CharacterNotFound(_))
        ));
    }
}
