//! Startup and teardown of the running server: store, world, listener
//! (fresh or inherited), control loop and accept loop.

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::path::PathBuf;

use engine_core::{ControlLoop, NoScripts, ProcessReplacer};
use mud::{MudServer, RestartCoordinator, RoomId, World, WorldSystems};
use net::{adopt_session, run_accept_loop, ConnectionLimiter, ResumedSession, TelnetListener};
use persistence::{PersistenceError, RestartSnapshot, SnapshotFile};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use world_db::{WorldDb, WorldDbError};

use crate::config::ServerConfig;
use crate::shutdown::ShutdownRx;

/// Failures that keep the server from serving at all.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot open world database {path}: {source}")]
    Database {
        path: PathBuf,
        source: WorldDbError,
    },

    #[error("cannot load rooms: {0}")]
    Rooms(WorldDbError),

    #[error("cannot read restart snapshot: {0}")]
    Snapshot(#[from] PersistenceError),

    #[error("cannot listen on {addr}: {source}")]
    Listen { addr: String, source: io::Error },

    #[error("cannot adopt inherited listener (fd {fd}): {source}")]
    AdoptListener { fd: RawFd, source: io::Error },
}

/// A started server, not yet running its control loop.
pub struct App {
    control: ControlLoop<MudServer<NoScripts>>,
    accept: JoinHandle<()>,
    stop_accept: watch::Sender<bool>,
    local_addr: Option<SocketAddr>,
    resumed: usize,
}

impl App {
    /// Open the store, pick up a pending hot restart if there is one, and
    /// start accepting connections. Must be called inside a tokio runtime.
    pub async fn start(
        config: &ServerConfig,
        replacer: Box<dyn ProcessReplacer>,
        shutdown: ShutdownRx,
    ) -> Result<Self, StartupError> {
        let db = WorldDb::open(&config.database.path).map_err(|source| StartupError::Database {
            path: config.database.path.clone(),
            source,
        })?;
        if config.world.seed_default_rooms {
            db.seed_default_rooms().map_err(StartupError::Rooms)?;
        }
        let rooms = db.rooms().load_all().map_err(StartupError::Rooms)?;
        let world = World::from_records(rooms);
        tracing::info!(rooms = world.room_count(), "world loaded");

        let snapshot_file = SnapshotFile::new(&config.restart.snapshot_path);
        let inherited = snapshot_file.take()?;
        let listener = open_listener(config, inherited.as_ref()).await?;
        let local_addr = listener.local_addr().ok();

        let restart = RestartCoordinator::new(snapshot_file, replacer)
            .with_listener(listener.raw_fd())
            .with_fallback_room(RoomId(config.restart.fallback_room));
        let systems = WorldSystems::new(world, NoScripts, config.world.zone_reset_minutes);
        let server = MudServer::new(config.server_settings(), systems, db, restart);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let limiter = ConnectionLimiter::new(config.rate_limits());
        let control = ControlLoop::new(server, events_rx, &config.schedule())
            .with_shutdown(shutdown.into_inner())
            .with_restart_grace(config.flush_grace());

        let mut resumed = 0;
        for session in inherited.iter().flat_map(|s| &s.sessions) {
            let resume = ResumedSession {
                actor_name: session.name.clone(),
                room: session.room,
            };
            match adopt_session(session.fd, &events_tx, &limiter, resume) {
                Ok(_) => resumed += 1,
                Err(e) => {
                    tracing::warn!(fd = session.fd, name = %session.name, error = %e, "skipping inherited session")
                }
            }
        }
        if inherited.is_some() {
            tracing::info!(resumed, "hot restart recovered");
        }

        let (stop_accept, stop_rx) = watch::channel(false);
        let accept = tokio::spawn(run_accept_loop(listener, events_tx, limiter, stop_rx));

        Ok(Self {
            control,
            accept,
            stop_accept,
            local_addr,
            resumed,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Sessions carried over from the previous process.
    pub fn resumed(&self) -> usize {
        self.resumed
    }

    /// Run until shutdown, then stop accepting and save everyone.
    pub async fn run(self) -> MudServer<NoScripts> {
        let Self {
            control,
            accept,
            stop_accept,
            ..
        } = self;

        let mut server = control.run().await;
        stop_accept.send_replace(true);
        if let Err(e) = accept.await {
            tracing::warn!(error = %e, "accept loop ended abnormally");
        }
        server.shutdown();
        server
    }
}

async fn open_listener(
    config: &ServerConfig,
    inherited: Option<&RestartSnapshot>,
) -> Result<TelnetListener, StartupError> {
    match inherited {
        Some(snapshot) => {
            let fd = snapshot.listener_fd;
            let listener = TelnetListener::adopt(fd)
                .map_err(|source| StartupError::AdoptListener { fd, source })?;
            tracing::info!(fd, sessions = snapshot.sessions.len(), "adopted inherited listener");
            Ok(listener)
        }
        None => {
            let addr = config.net.telnet_addr.clone();
            TelnetListener::bind(&addr)
                .await
                .map_err(|source| StartupError::Listen { addr, source })
        }
    }
}
