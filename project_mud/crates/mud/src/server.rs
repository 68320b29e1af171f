use std::net::SocketAddr;
use std::time::Duration;

use engine_core::hooks::fire_periodic;
use engine_core::{EventHandler, Flow, NoScripts, ScriptHost, ServerEvent, TimerKind};
use net::{NetEvent, ResumedSession};
use session::{ActorId, InputThrottle, Session, SessionHandle, SessionId, SessionRegistry};
use world_db::WorldDb;

use crate::admission::{self, Admission, AdmissionSettings};
use crate::commands::{self, parse_command, CommandOutcome};
use crate::names::{NameRules, StandardNameRules};
use crate::restart::RestartCoordinator;
use crate::systems::WorldSystems;
use crate::world::{Actor, RoomId, World};

pub const PROMPT: &str = "\r\n> ";
pub const FAREWELL: &str = "Alas, all good things must come to an end.\r\n";
pub const RECOVERED: &str = "Copyover recovery complete.\r\n";
pub const SHUTTING_DOWN: &str = "The server is shutting down. See you soon.\r\n";
pub const RESTARTING: &str = "The server is restarting. Please reconnect in a moment.\r\n";

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub admission: AdmissionSettings,
    /// Zero disables the input throttle.
    pub max_commands_per_second: u32,
    pub throttle_penalty: Duration,
    /// Where resumed actors go when their recorded room is gone.
    pub fallback_room: RoomId,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            admission: AdmissionSettings::default(),
            max_commands_per_second: 20,
            throttle_penalty: Duration::from_millis(1000),
            fallback_room: RoomId(1),
        }
    }
}

/// Owner of every session, the world and the store; the control loop's
/// event handler.
pub struct MudServer<S = NoScripts> {
    settings: ServerSettings,
    sessions: SessionRegistry,
    systems: WorldSystems<S>,
    db: WorldDb,
    names: Box<dyn NameRules>,
    restart: RestartCoordinator,
}

impl<S: ScriptHost> MudServer<S> {
    pub fn new(
        settings: ServerSettings,
        systems: WorldSystems<S>,
        db: WorldDb,
        restart: RestartCoordinator,
    ) -> Self {
        Self {
            settings,
            sessions: SessionRegistry::new(),
            systems,
            db,
            names: Box::new(StandardNameRules::default()),
            restart,
        }
    }

    pub fn with_name_rules(mut self, rules: impl NameRules + 'static) -> Self {
        self.names = Box::new(rules);
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn world(&self) -> &World {
        &self.systems.world
    }

    pub fn db(&self) -> &WorldDb {
        &self.db
    }

    fn throttle(&self) -> InputThrottle {
        InputThrottle::new(
            self.settings.max_commands_per_second,
            self.settings.throttle_penalty,
        )
    }

    fn on_new_session(&mut self, handle: SessionHandle, peer: Option<SocketAddr>) {
        // Between snapshot and exec nobody new is admitted; the socket would
        // not be recorded and would die with this process image.
        if self.restart.is_pending() {
            tracing::info!(session_id = %handle.session_id(), "refusing connection during restart");
            handle.send_text(RESTARTING);
            handle.close();
            return;
        }
        let mut session = Session::new(handle, peer).with_throttle(self.throttle());
        tracing::info!(session_id = %session.id, origin = %session.origin(), "new session");
        admission::greet(&mut session, &self.settings.admission.greeting);
        self.sessions.insert(session);
    }

    /// A connection inherited across a hot restart: bind it straight to its
    /// actor, skipping admission.
    fn on_session_resumed(
        &mut self,
        handle: SessionHandle,
        peer: Option<SocketAddr>,
        resume: ResumedSession,
    ) {
        let throttle = self.throttle();
        let world = &mut self.systems.world;
        let recorded = RoomId(resume.room);
        let room = if world.has_room(recorded) {
            recorded
        } else {
            self.settings.fallback_room
        };

        let actor = match world.find_actor_by_name(&resume.actor_name) {
            Some(actor) => actor,
            None => {
                let record = match self.db.characters().get_by_name(&resume.actor_name) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(name = %resume.actor_name, error = %e, "cannot load resumed character");
                        None
                    }
                };
                let level = record.as_ref().map_or(1, |r| r.level);
                let actor = world.spawn_actor(&resume.actor_name, level, room);
                if let Some(a) = world.actor_mut(actor) {
                    a.character_id = record.map(|r| r.id);
                }
                actor
            }
        };

        let session = Session::resumed(handle, peer, actor).with_throttle(throttle);
        if let Some(a) = world.actor_mut(actor) {
            a.session = Some(session.id);
        }
        tracing::info!(session_id = %session.id, name = %resume.actor_name, %room, "session resumed");
        session.send(RECOVERED);
        let look = world.describe_room(actor);
        if let Some(a) = world.actor_mut(actor) {
            a.send(&look);
        }
        self.sessions.insert(session);
    }

    fn on_line(&mut self, id: SessionId, line: String) -> Flow {
        let Some(session) = self.sessions.get_mut(id) else {
            tracing::debug!(session_id = %id, "line for unknown session");
            return Flow::Continue;
        };
        if let Some(penalty) = session.throttle.record_line() {
            tracing::debug!(session_id = %id, ?penalty, "input throttled");
            session.handle().delay_for(penalty);
        }

        if !session.is_interactive() {
            Admission {
                settings: &self.settings.admission,
                names: self.names.as_ref(),
                db: &self.db,
                world: &mut self.systems.world,
            }
            .handle_line(session, &line);
            return Flow::Continue;
        }

        let Some(actor) = session.actor else {
            tracing::warn!(session_id = %id, "interactive session without actor");
            return Flow::Continue;
        };
        match commands::execute(&mut self.systems.world, actor, parse_command(&line)) {
            CommandOutcome::Done => Flow::Continue,
            CommandOutcome::Quit => {
                self.quit(id, actor);
                Flow::Continue
            }
            CommandOutcome::Copyover => self.begin_restart(id),
            CommandOutcome::Shutdown => {
                tracing::info!(session_id = %id, "shutdown requested by command");
                Flow::Shutdown
            }
        }
    }

    fn quit(&mut self, id: SessionId, actor: ActorId) {
        let Some(mut a) = self.systems.world.remove_actor(actor) else {
            return;
        };
        save_location(&self.db, &a);
        let mut farewell = a.take_output();
        farewell.push_str(FAREWELL);
        if let Some(session) = self.sessions.get(id) {
            session.send(&farewell);
        }
        self.systems
            .world
            .send_to_room(a.room, None, &format!("{} has left the game.\r\n", a.name));
        tracing::info!(session_id = %id, name = %a.name, "quit");
        // Queued writes drain before the socket closes.
        self.sessions.remove(id);
    }

    fn on_session_lost(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(id) else {
            return;
        };
        tracing::info!(session_id = %id, origin = %session.origin(), state = ?session.state, "session lost");
        let Some(actor) = session.actor else {
            return;
        };
        let world = &mut self.systems.world;
        let Some(a) = world.actor_mut(actor) else {
            return;
        };
        if a.session != Some(id) {
            return;
        }
        a.session = None;
        a.clear_output();
        let (name, room) = (a.name.clone(), a.room);
        save_location(&self.db, a);
        world.send_to_room(room, Some(actor), &format!("{name} has lost their link.\r\n"));
    }

    fn begin_restart(&mut self, requester: SessionId) -> Flow {
        self.flush_output();
        match self
            .restart
            .begin(requester, &self.sessions, &self.systems.world)
        {
            Ok(recorded) => {
                tracing::info!(session_id = %requester, sessions = recorded, "hot restart prepared");
                self.save_all();
                Flow::Restart
            }
            Err(e) => {
                tracing::warn!(session_id = %requester, error = %e, "hot restart refused");
                self.tell_session(requester, &format!("You failed to copyover: {e}.\r\n"));
                Flow::Continue
            }
        }
    }

    fn tell_session(&self, id: SessionId, text: &str) {
        if let Some(session) = self.sessions.get(id) {
            session.send(text);
        }
    }

    /// Move every actor's pending output to its session, followed by the
    /// prompt. Output for link-dead actors is dropped.
    pub fn flush_output(&mut self) {
        let sessions = &self.sessions;
        for actor in self.systems.world.actors_mut() {
            if !actor.has_output() {
                continue;
            }
            let text = actor.take_output();
            if let Some(session) = actor.session.and_then(|id| sessions.get(id)) {
                session.send(&format!("{text}{PROMPT}"));
            }
        }
    }

    /// Save the location of every actor with a stored character. Returns
    /// how many were saved.
    pub fn save_all(&self) -> usize {
        self.systems
            .world
            .actors()
            .filter(|a| save_location(&self.db, a))
            .count()
    }

    /// Last words before the process exits: save everyone, say goodbye and
    /// close every session once its queue drains.
    pub fn shutdown(&mut self) {
        self.flush_output();
        self.sessions.broadcast(SHUTTING_DOWN);
        let saved = self.save_all();
        tracing::info!(saved, sessions = self.sessions.len(), "characters saved for shutdown");
        let ids: Vec<SessionId> = self.sessions.iter().map(|s| s.id).collect();
        for id in ids {
            self.sessions.remove(id);
        }
    }
}

fn save_location(db: &WorldDb, actor: &Actor) -> bool {
    let Some(id) = actor.character_id else {
        return false;
    };
    match db.characters().save_location(id, actor.room.0) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(name = %actor.name, error = %e, "could not save character");
            false
        }
    }
}

impl<S: ScriptHost> EventHandler for MudServer<S> {
    fn handle(&mut self, event: ServerEvent) -> Flow {
        match event {
            ServerEvent::Net(NetEvent::NewSession { handle, peer }) => {
                self.on_new_session(handle, peer);
                Flow::Continue
            }
            ServerEvent::Net(NetEvent::SessionResumed { handle, peer, resume }) => {
                self.on_session_resumed(handle, peer, resume);
                Flow::Continue
            }
            ServerEvent::Net(NetEvent::Line { session_id, line }) => self.on_line(session_id, line),
            ServerEvent::Net(NetEvent::SessionLost { session_id }) => {
                self.on_session_lost(session_id);
                Flow::Continue
            }
            ServerEvent::Timer(TimerKind::OutputFlush) => {
                self.flush_output();
                Flow::Continue
            }
            ServerEvent::Timer(kind) => {
                fire_periodic(&mut self.systems, kind);
                Flow::Continue
            }
        }
    }

    fn complete_restart(&mut self) -> Flow {
        if let Some((requester, e)) = self.restart.finish() {
            self.tell_session(requester, &format!("You failed to copyover: {e}.\r\n"));
        }
        Flow::Continue
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
