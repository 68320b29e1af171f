use rusqlite::Connection;

use crate::error::WorldDbError;

pub fn create_tables(conn: &Connection) -> Result<(), WorldDbError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS rooms (
            id          INTEGER PRIMARY KEY,
            zone        INTEGER NOT NULL DEFAULT 0,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS characters (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            level         INTEGER NOT NULL DEFAULT 1,
            room_id       INTEGER,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            last_played   TEXT
        );
        ",
    )?;
    Ok(())
}

/// Give an empty world the two rooms every server needs: the void that
/// stranded actors fall back to, and a place to start. Returns false if the
/// world already had rooms.
pub fn seed_rooms(conn: &Connection) -> Result<bool, WorldDbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(false);
    }
    conn.execute_batch(
        "
        INSERT INTO rooms (id, zone, name, description) VALUES
            (1, 0, 'Limbo', 'You float in a formless grey void.'),
            (2, 1, 'Town Square', 'A wide cobbled square. Roads lead off in every direction.');
        ",
    )?;
    tracing::info!("seeded empty world with default rooms");
    Ok(true)
}
