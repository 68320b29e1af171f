use rusqlite::Connection;

use crate::error::WorldDbError;

/// A room record from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: u32,
    pub zone: u32,
    pub name: String,
    pub description: String,
}

/// Repository for room data.
pub struct RoomRepo<'a> {
    conn: &'a Connection,
}

impl<'a> RoomRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Every room, ordered by id. An empty world is an error.
    pub fn load_all(&self) -> Result<Vec<RoomRecord>, WorldDbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, zone, name, description FROM rooms ORDER BY id")?;
        let rooms = stmt
            .query_map([], |row| {
                Ok(RoomRecord {
                    id: row.get(0)?,
                    zone: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rooms.is_empty() {
            return Err(WorldDbError::EmptyWorld);
        }
        Ok(rooms)
    }

    /// Add or replace a room.
    pub fn upsert(&self, room: &RoomRecord) -> Result<(), WorldDbError> {
        self.conn.execute(
            "INSERT INTO rooms (id, zone, name, description) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET zone = ?2, name = ?3, description = ?4",
            rusqlite::params![room.id, room.zone, room.name, room.description],
        )?;
        Ok(())
    }
}
