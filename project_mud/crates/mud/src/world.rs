use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use session::{ActorId, SessionId};
use world_db::RoomRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub zone: u32,
    pub name: String,
    pub description: String,
}

impl From<RoomRecord> for Room {
    fn from(record: RoomRecord) -> Self {
        Self {
            id: RoomId(record.id),
            zone: record.zone,
            name: record.name,
            description: record.description,
        }
    }
}

/// Something standing in the world. Player actors have a session while
/// connected and keep standing there "link-dead" after losing it.
#[derive(Debug)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub level: u32,
    pub room: RoomId,
    pub session: Option<SessionId>,
    /// Row id in the character table, for saving.
    pub character_id: Option<i64>,
    output: String,
}

impl Actor {
    /// Buffer text for the next output flush.
    pub fn send(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    pub fn is_link_dead(&self) -> bool {
        self.session.is_none()
    }
}

/// Rooms, zones and the actors standing in them.
#[derive(Debug)]
pub struct World {
    rooms: BTreeMap<RoomId, Room>,
    actors: BTreeMap<ActorId, Actor>,
    zone_resets: BTreeMap<u32, Instant>,
    next_actor: u64,
}

impl World {
    pub fn new(rooms: impl IntoIterator<Item = Room>) -> Self {
        let now = Instant::now();
        let rooms: BTreeMap<RoomId, Room> = rooms.into_iter().map(|r| (r.id, r)).collect();
        let zone_resets = rooms.values().map(|r| (r.zone, now)).collect();
        Self {
            rooms,
            actors: BTreeMap::new(),
            zone_resets,
            next_actor: 1,
        }
    }

    pub fn from_records(records: Vec<RoomRecord>) -> Self {
        Self::new(records.into_iter().map(Room::from))
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn has_room(&self, id: RoomId) -> bool {
        self.rooms.contains_key(&id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Place a new actor in `room`.
    pub fn spawn_actor(&mut self, name: &str, level: u32, room: RoomId) -> ActorId {
        let id = ActorId(self.next_actor);
        self.next_actor += 1;
        self.actors.insert(
            id,
            Actor {
                id,
                name: name.to_string(),
                level,
                room,
                session: None,
                character_id: None,
                output: String::new(),
            },
        );
        id
    }

    pub fn remove_actor(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn actors_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    /// Case-insensitive name lookup.
    pub fn find_actor_by_name(&self, name: &str) -> Option<ActorId> {
        self.actors
            .values()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.id)
    }

    pub fn actors_in_room(&self, room: RoomId) -> Vec<ActorId> {
        self.actors
            .values()
            .filter(|a| a.room == room)
            .map(|a| a.id)
            .collect()
    }

    /// Buffer `text` for everyone in `room` except `except`.
    pub fn send_to_room(&mut self, room: RoomId, except: Option<ActorId>, text: &str) {
        for actor in self.actors.values_mut() {
            if actor.room == room && Some(actor.id) != except {
                actor.send(text);
            }
        }
    }

    /// Buffer `text` for everyone standing in `zone`.
    pub fn send_to_zone(&mut self, zone: u32, text: &str) {
        let rooms = &self.rooms;
        for actor in self.actors.values_mut() {
            if rooms.get(&actor.room).is_some_and(|r| r.zone == zone) {
                actor.send(text);
            }
        }
    }

    /// Zones whose last reset is at least `lifespan` before `now`. Their
    /// reset clock restarts at `now`.
    pub fn zones_due(&mut self, now: Instant, lifespan: Duration) -> Vec<u32> {
        let mut due = Vec::new();
        for (zone, last) in self.zone_resets.iter_mut() {
            if now.saturating_duration_since(*last) >= lifespan {
                *last = now;
                due.push(*zone);
            }
        }
        due
    }

    /// Text of the `look` command.
    pub fn describe_room(&self, viewer: ActorId) -> String {
        let Some(actor) = self.actors.get(&viewer) else {
            return String::new();
        };
        let Some(room) = self.rooms.get(&actor.room) else {
            return "You look around in the void.  There's nothing here, yet!\r\n".to_string();
        };
        let mut out = format!("{}\r\n  {}\r\n", room.name, room.description);
        for other in self.actors_in_room(room.id) {
            let Some(other) = self.actors.get(&other).filter(|a| a.id != viewer) else {
                continue;
            };
            if other.is_link_dead() {
                out.push_str(&format!("{} is here, staring blankly.\r\n", other.name));
            } else {
                out.push_str(&format!("{} is here.\r\n", other.name));
            }
        }
        out
    }
}
