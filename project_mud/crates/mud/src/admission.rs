//! Pre-gameplay exchange: choose a name, prove or choose a credential,
//! acknowledge, and get bound to an actor.
//!
//! Every transition answers with exactly one write to the session's
//! outbound queue. Nothing here blocks on the network; the store calls are
//! synchronous and short.

use session::{ActorId, AdmissionState, Session};
use world_db::{hash_credential, verify_credential, CharacterRecord, WorldDb, WorldDbError};

use crate::commands::ADMIN_LEVEL;
use crate::names::{title_case, NameRules};
use crate::world::{RoomId, World};

pub const NAME_PROMPT: &str = "By what name do you wish to be known? ";
pub const CREDENTIAL_PROMPT: &str = "Password: ";
pub const ACKNOWLEDGE_PROMPT: &str = "[ PRESS RETURN TO JOIN ]\r\n";
pub const RECONNECTING: &str = "Reconnecting to a session in progress.\r\n";

const INVALID_NAME: &str = "Invalid name, please try another.\r\n\r\nBy what name do you wish to be known? ";
const NAME_IN_USE: &str = "That character is already playing.\r\n\r\nBy what name do you wish to be known? ";
const NAME_TAKEN: &str =
    "That name was taken while you were choosing.\r\n\r\nBy what name do you wish to be known? ";
const DECLINED: &str = "\r\nBy what name do you wish to be known? ";
const WRONG_CREDENTIAL: &str = "Wrong password.\r\n\r\nBy what name do you wish to be known? ";
const RETYPE_PROMPT: &str = "Please retype password: ";
const MISMATCH: &str = "Passwords don't match.\r\nPlease choose a password: ";
const STORE_FAILED: &str =
    "Something went wrong, please try again.\r\n\r\nBy what name do you wish to be known? ";

#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub server_name: String,
    /// Sent once, right before the first name prompt.
    pub greeting: String,
    pub confirm_credential: bool,
    /// Names that get administrator level.
    pub admins: Vec<String>,
    pub start_room: RoomId,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            server_name: "the Realm".to_string(),
            greeting: String::new(),
            confirm_credential: false,
            admins: Vec::new(),
            start_room: RoomId(2),
        }
    }
}

impl AdmissionSettings {
    pub fn is_admin(&self, name: &str) -> bool {
        self.admins.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Pending,
    /// The session is interactive and bound to `actor`.
    Admitted { actor: ActorId, reconnected: bool },
}

/// Borrowed view of everything admission needs, built per line by the
/// server.
pub struct Admission<'a> {
    pub settings: &'a AdmissionSettings,
    pub names: &'a dyn NameRules,
    pub db: &'a WorldDb,
    pub world: &'a mut World,
}

/// Move a fresh session to the name prompt.
pub fn greet(session: &mut Session, greeting: &str) {
    session.state = AdmissionState::AwaitingName;
    session.send(&format!("{greeting}{NAME_PROMPT}"));
}

impl Admission<'_> {
    pub fn handle_line(&mut self, session: &mut Session, line: &str) -> AdmissionOutcome {
        match session.state {
            AdmissionState::Unauthenticated => {
                greet(session, &self.settings.greeting);
                AdmissionOutcome::Pending
            }
            AdmissionState::AwaitingName => {
                self.on_name(session, line);
                AdmissionOutcome::Pending
            }
            AdmissionState::AwaitingNameConfirmation => {
                on_name_confirmation(session, line);
                AdmissionOutcome::Pending
            }
            AdmissionState::AwaitingCredential => {
                self.on_credential(session, line);
                AdmissionOutcome::Pending
            }
            AdmissionState::AwaitingCredentialConfirmation => {
                on_credential_confirmation(session, line);
                AdmissionOutcome::Pending
            }
            AdmissionState::AwaitingAcknowledgement => self.on_acknowledgement(session),
            AdmissionState::Interactive => {
                tracing::warn!(session_id = %session.id, "admission input for interactive session");
                AdmissionOutcome::Pending
            }
        }
    }

    fn on_name(&mut self, session: &mut Session, line: &str) {
        let name = title_case(line.trim());
        if !self.names.is_valid(&name) {
            session.send(INVALID_NAME);
            return;
        }

        let in_world = self.world.find_actor_by_name(&name).and_then(|id| self.world.actor(id));
        let record = match self.db.characters().get_by_name(&name) {
            Ok(record) => record,
            Err(e) => {
                store_failed(session, &e);
                return;
            }
        };

        match (record, in_world) {
            (_, Some(actor)) if !actor.is_link_dead() => {
                session.send(NAME_IN_USE);
            }
            (Some(record), _) => {
                tracing::debug!(session_id = %session.id, name = %record.name, "returning character");
                session.pending_name = Some(record.name);
                session.returning = true;
                session.state = AdmissionState::AwaitingCredential;
                session.send(CREDENTIAL_PROMPT);
            }
            // A link-dead actor without a stored character cannot prove
            // ownership.
            (None, Some(_)) => {
                session.send(NAME_IN_USE);
            }
            (None, None) => {
                session.send(&format!(
                    "No adventurer with that name exists.  Create {name}? [y/N] "
                ));
                session.pending_name = Some(name);
                session.returning = false;
                session.state = AdmissionState::AwaitingNameConfirmation;
            }
        }
    }

    fn on_credential(&mut self, session: &mut Session, line: &str) {
        let Some(name) = session.pending_name.clone() else {
            restart_admission(session, DECLINED);
            return;
        };

        if session.returning {
            match self.db.characters().authenticate(&name, line) {
                Ok(_) => {
                    session.state = AdmissionState::AwaitingAcknowledgement;
                    session.send(ACKNOWLEDGE_PROMPT);
                }
                Err(WorldDbError::InvalidCredential) | Err(WorldDbError::CharacterNotFound(_)) => {
                    tracing::info!(session_id = %session.id, origin = %session.origin(), %name, "wrong credential");
                    restart_admission(session, WRONG_CREDENTIAL);
                }
                Err(e) => store_failed(session, &e),
            }
            return;
        }

        match hash_credential(line) {
            Ok(hash) => {
                session.pending_credential = Some(hash);
                if self.settings.confirm_credential {
                    session.state = AdmissionState::AwaitingCredentialConfirmation;
                    session.send(RETYPE_PROMPT);
                } else {
                    session.state = AdmissionState::AwaitingAcknowledgement;
                    session.send(ACKNOWLEDGE_PROMPT);
                }
            }
            Err(e) => store_failed(session, &e),
        }
    }

    fn on_acknowledgement(&mut self, session: &mut Session) -> AdmissionOutcome {
        let Some(name) = session.pending_name.clone() else {
            restart_admission(session, DECLINED);
            return AdmissionOutcome::Pending;
        };
        let result = if session.returning {
            self.admit_returning(session, &name)
        } else {
            self.admit_new(session, &name)
        };
        match result {
            Ok(outcome) => outcome,
            Err(WorldDbError::CharacterNameTaken(_)) => {
                restart_admission(session, NAME_TAKEN);
                AdmissionOutcome::Pending
            }
            Err(e) => {
                store_failed(session, &e);
                AdmissionOutcome::Pending
            }
        }
    }

    fn admit_new(&mut self, session: &mut Session, name: &str) -> Result<AdmissionOutcome, WorldDbError> {
        let Some(hash) = session.pending_credential.clone() else {
            restart_admission(session, DECLINED);
            return Ok(AdmissionOutcome::Pending);
        };
        let level = if self.settings.is_admin(name) { ADMIN_LEVEL } else { 1 };
        let room = self.settings.start_room;
        let record = self.db.characters().create(name, &hash, level, room.0)?;
        let actor = self.spawn(&record, room);
        Ok(self.enter(session, actor))
    }

    fn admit_returning(&mut self, session: &mut Session, name: &str) -> Result<AdmissionOutcome, WorldDbError> {
        if let Some(id) = self.world.find_actor_by_name(name) {
            let link_dead = self.world.actor(id).is_some_and(|a| a.is_link_dead());
            if !link_dead {
                restart_admission(session, NAME_IN_USE);
                return Ok(AdmissionOutcome::Pending);
            }
            return Ok(self.reattach(session, id));
        }

        let mut record = self
            .db
            .characters()
            .get_by_name(name)?
            .ok_or_else(|| WorldDbError::CharacterNotFound(name.to_string()))?;
        if self.settings.is_admin(name) && record.level < ADMIN_LEVEL {
            self.db.characters().set_level(record.id, ADMIN_LEVEL)?;
            record.level = ADMIN_LEVEL;
        }
        let room = record
            .room_id
            .map(RoomId)
            .filter(|r| self.world.has_room(*r))
            .unwrap_or(self.settings.start_room);
        let actor = self.spawn(&record, room);
        Ok(self.enter(session, actor))
    }

    fn spawn(&mut self, record: &CharacterRecord, room: RoomId) -> ActorId {
        let actor = self.world.spawn_actor(&record.name, record.level, room);
        if let Some(a) = self.world.actor_mut(actor) {
            a.character_id = Some(record.id);
        }
        actor
    }

    fn enter(&mut self, session: &mut Session, actor: ActorId) -> AdmissionOutcome {
        bind(session, self.world, actor);
        session.send(&format!("Welcome to {}.\r\n", self.settings.server_name));
        self.announce(actor, "has entered the game.");
        tracing::info!(session_id = %session.id, origin = %session.origin(), actor = actor.0, "admitted");
        AdmissionOutcome::Admitted {
            actor,
            reconnected: false,
        }
    }

    fn reattach(&mut self, session: &mut Session, actor: ActorId) -> AdmissionOutcome {
        bind(session, self.world, actor);
        if let Some(a) = self.world.actor_mut(actor) {
            a.clear_output();
        }
        session.send(RECONNECTING);
        self.announce(actor, "has reconnected.");
        tracing::info!(session_id = %session.id, origin = %session.origin(), actor = actor.0, "re-attached link-dead actor");
        AdmissionOutcome::Admitted {
            actor,
            reconnected: true,
        }
    }

    /// Tell the room, and queue a look for the arriving actor.
    fn announce(&mut self, actor: ActorId, what: &str) {
        let Some((name, room)) = self.world.actor(actor).map(|a| (a.name.clone(), a.room)) else {
            return;
        };
        self.world
            .send_to_room(room, Some(actor), &format!("{name} {what}\r\n"));
        let look = self.world.describe_room(actor);
        if let Some(a) = self.world.actor_mut(actor) {
            a.send(&look);
        }
    }
}

fn on_name_confirmation(session: &mut Session, line: &str) {
    if line.trim_start().starts_with(['n', 'N']) {
        restart_admission(session, DECLINED);
        return;
    }
    let name = session.pending_name.as_deref().unwrap_or_default();
    session.send(&format!(
        "Creating new character {name}.\r\nPlease choose a password: "
    ));
    session.state = AdmissionState::AwaitingCredential;
}

fn on_credential_confirmation(session: &mut Session, line: &str) {
    let matches = session
        .pending_credential
        .as_deref()
        .is_some_and(|hash| verify_credential(line, hash).is_ok());
    if matches {
        session.state = AdmissionState::AwaitingAcknowledgement;
        session.send(ACKNOWLEDGE_PROMPT);
    } else {
        session.pending_credential = None;
        session.state = AdmissionState::AwaitingCredential;
        session.send(MISMATCH);
    }
}

fn bind(session: &mut Session, world: &mut World, actor: ActorId) {
    session.clear_pending();
    session.actor = Some(actor);
    session.state = AdmissionState::Interactive;
    if let Some(a) = world.actor_mut(actor) {
        a.session = Some(session.id);
    }
}

/// Back to the name prompt with `message`.
fn restart_admission(session: &mut Session, message: &str) {
    session.clear_pending();
    session.state = AdmissionState::AwaitingName;
    session.send(message);
}

fn store_failed(session: &mut Session, error: &WorldDbError) {
    tracing::warn!(session_id = %session.id, error = %error, "store failure during admission");
    restart_admission(session, STORE_FAILED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::StandardNameRules;
    use session::{ConnectionEnds, SessionHandle, SessionId};

    struct Fixture {
        settings: AdmissionSettings,
        names: StandardNameRules,
        db: WorldDb,
        world: World,
    }

    impl Fixture {
        fn new() -> Self {
            let db = WorldDb::open_memory().unwrap();
            let world = World::from_records(db.rooms().load_all().unwrap());
            Self {
                settings: AdmissionSettings::default(),
                names: StandardNameRules::default(),
                db,
                world,
            }
        }

        fn line(&mut self, session: &mut Session, text: &str) -> AdmissionOutcome {
            Admission {
                settings: &self.settings,
                names: &self.names,
                db: &self.db,
                world: &mut self.world,
            }
            .handle_line(session, text)
        }
    }

    fn connect(id: u64) -> (Session, ConnectionEnds) {
        let (handle, ends) = SessionHandle::new(SessionId(id), None);
        let mut session = Session::new(handle, None);
        greet(&mut session, "");
        (session, ends)
    }

    /// Every write queued so far, one string per write.
    fn writes(ends: &mut ConnectionEnds) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(bytes) = ends.outbound_rx.try_recv() {
            out.push(String::from_utf8(bytes).unwrap());
        }
        out
    }

    #[test]
    fn new_character_transcript() {
        let mut fx = Fixture::new();
        let (mut s, mut ends) = connect(1);
        assert_eq!(writes(&mut ends), vec![NAME_PROMPT]);

        assert_eq!(fx.line(&mut s, "alice"), AdmissionOutcome::Pending);
        assert_eq!(s.state, AdmissionState::AwaitingNameConfirmation);
        assert_eq!(
            writes(&mut ends),
            vec!["No adventurer with that name exists.  Create Alice? [y/N] "]
        );

        fx.line(&mut s, "y");
        assert_eq!(s.state, AdmissionState::AwaitingCredential);
        assert_eq!(
            writes(&mut ends),
            vec!["Creating new character Alice.\r\nPlease choose a password: "]
        );

        fx.line(&mut s, "hunter2");
        assert_eq!(s.state, AdmissionState::AwaitingAcknowledgement);
        assert_eq!(writes(&mut ends), vec![ACKNOWLEDGE_PROMPT]);

        let outcome = fx.line(&mut s, "");
        let AdmissionOutcome::Admitted { actor, reconnected } = outcome else {
            panic!("not admitted: {outcome:?}");
        };
        assert!(!reconnected);
        assert!(s.is_interactive());
        assert_eq!(s.actor, Some(actor));
        assert_eq!(writes(&mut ends), vec!["Welcome to the Realm.\r\n"]);

        let a = fx.world.actor(actor).unwrap();
        assert_eq!(a.name, "Alice");
        assert_eq!(a.room, RoomId(2));
        assert_eq!(a.session, Some(SessionId(1)));
        assert!(a.has_output(), "arrival look is buffered");
        assert!(fx.db.characters().get_by_name("alice").unwrap().is_some());
    }

    #[test]
    fn declining_returns_to_name_prompt() {
        let mut fx = Fixture::new();
        let (mut s, mut ends) = connect(1);
        writes(&mut ends);
        fx.line(&mut s, "alice");
        writes(&mut ends);

        fx.line(&mut s, "No thanks");
        assert_eq!(s.state, AdmissionState::AwaitingName);
        assert!(s.pending_name.is_none());
        assert_eq!(writes(&mut ends), vec![DECLINED]);
    }

    #[test]
    fn any_other_answer_confirms() {
        let mut fx = Fixture::new();
        for (id, answer) in [(1, ""), (2, "yes"), (3, "maybe")] {
            let (mut s, _ends) = connect(id);
            fx.line(&mut s, "alice");
            fx.line(&mut s, answer);
            assert_eq!(s.state, AdmissionState::AwaitingCredential, "answer {answer:?}");
        }
    }

    #[test]
    fn invalid_name_reprompts() {
        let mut fx = Fixture::new();
        let (mut s, mut ends) = connect(1);
        writes(&mut ends);
        fx.line(&mut s, "x1");
        assert_eq!(s.state, AdmissionState::AwaitingName);
        assert_eq!(writes(&mut ends), vec![INVALID_NAME]);
    }

    #[test]
    fn returning_character_needs_the_right_credential() {
        let mut fx = Fixture::new();
        let hash = hash_credential("secret").unwrap();
        fx.db.characters().create("Bob", &hash, 1, 1).unwrap();

        let (mut s, mut ends) = connect(1);
        writes(&mut ends);
        fx.line(&mut s, "BOB");
        assert_eq!(s.state, AdmissionState::AwaitingCredential);
        assert!(s.returning);
        assert_eq!(writes(&mut ends), vec![CREDENTIAL_PROMPT]);

        fx.line(&mut s, "guess");
        assert_eq!(s.state, AdmissionState::AwaitingName);
        assert_eq!(writes(&mut ends), vec![WRONG_CREDENTIAL]);

        fx.line(&mut s, "bob");
        fx.line(&mut s, "secret");
        assert_eq!(s.state, AdmissionState::AwaitingAcknowledgement);
        let outcome = fx.line(&mut s, "");
        let AdmissionOutcome::Admitted { actor, .. } = outcome else {
            panic!("not admitted: {outcome:?}");
        };
        // Stored room is honored.
        assert_eq!(fx.world.actor(actor).unwrap().room, RoomId(1));
    }

    #[test]
    fn connected_name_is_rejected() {
        let mut fx = Fixture::new();
        let (mut first, _e1) = connect(1);
        for input in ["alice", "y", "pw", ""] {
            fx.line(&mut first, input);
        }
        assert!(first.is_interactive());

        let (mut second, mut ends) = connect(2);
        writes(&mut ends);
        fx.line(&mut second, "Alice");
        assert_eq!(second.state, AdmissionState::AwaitingName);
        assert_eq!(writes(&mut ends), vec![NAME_IN_USE]);
    }

    #[test]
    fn link_dead_actor_is_reattached() {
        let mut fx = Fixture::new();
        let (mut first, _e1) = connect(1);
        for input in ["alice", "y", "pw", ""] {
            fx.line(&mut first, input);
        }
        let actor = first.actor.unwrap();
        fx.world.actor_mut(actor).unwrap().session = None;
        fx.world.actor_mut(actor).unwrap().send("stale output");

        let (mut second, mut ends) = connect(2);
        writes(&mut ends);
        for input in ["alice", "pw"] {
            fx.line(&mut second, input);
        }
        writes(&mut ends);
        let outcome = fx.line(&mut second, "");
        assert_eq!(
            outcome,
            AdmissionOutcome::Admitted {
                actor,
                reconnected: true
            }
        );
        assert_eq!(writes(&mut ends), vec![RECONNECTING]);
        let a = fx.world.actor_mut(actor).unwrap();
        assert_eq!(a.session, Some(SessionId(2)));
        assert!(!a.take_output().contains("stale output"));
    }

    #[test]
    fn confirmation_mismatch_returns_to_credential() {
        let mut fx = Fixture::new();
        fx.settings.confirm_credential = true;
        let (mut s, mut ends) = connect(1);
        for input in ["carol", "y", "first"] {
            fx.line(&mut s, input);
        }
        assert_eq!(s.state, AdmissionState::AwaitingCredentialConfirmation);
        writes(&mut ends);

        fx.line(&mut s, "second");
        assert_eq!(s.state, AdmissionState::AwaitingCredential);
        assert_eq!(writes(&mut ends), vec![MISMATCH]);

        fx.line(&mut s, "third");
        fx.line(&mut s, "third");
        assert_eq!(s.state, AdmissionState::AwaitingAcknowledgement);
    }

    #[test]
    fn name_taken_during_admission() {
        let mut fx = Fixture::new();
        let (mut slow, mut ends) = connect(1);
        for input in ["dave", "y", "pw"] {
            fx.line(&mut slow, input);
        }
        fx.db.characters().create("Dave", "$h", 1, 2).unwrap();
        writes(&mut ends);

        assert_eq!(fx.line(&mut slow, ""), AdmissionOutcome::Pending);
        assert_eq!(slow.state, AdmissionState::AwaitingName);
        assert_eq!(writes(&mut ends), vec![NAME_TAKEN]);
    }

    #[test]
    fn admins_get_admin_level() {
        let mut fx = Fixture::new();
        fx.settings.admins = vec!["erin".to_string()];
        let (mut s, _ends) = connect(1);
        for input in ["erin", "y", "pw"] {
            fx.line(&mut s, input);
        }
        let AdmissionOutcome::Admitted { actor, .. } = fx.line(&mut s, "") else {
            panic!("not admitted");
        };
        assert_eq!(fx.world.actor(actor).unwrap().level, ADMIN_LEVEL);
    }

    #[test]
    fn arrival_is_announced_to_the_room() {
        let mut fx = Fixture::new();
        let watcher = fx.world.spawn_actor("Watcher", 1, RoomId(2));
        let (mut s, _ends) = connect(1);
        for input in ["frank", "y", "pw", ""] {
            fx.line(&mut s, input);
        }
        let heard = fx.world.actor_mut(watcher).unwrap().take_output();
        assert_eq!(heard, "Frank has entered the game.\r\n");
    }

    #[test]
    fn greeting_precedes_first_prompt() {
        let (handle, mut ends) = SessionHandle::new(SessionId(1), None);
        let mut s = Session::new(handle, None);
        greet(&mut s, "Welcome, traveller.\r\n");
        assert_eq!(s.state, AdmissionState::AwaitingName);
        assert_eq!(
            writes(&mut ends),
            vec!["Welcome, traveller.\r\nBy what name do you wish to be known? "]
        );
    }
}
