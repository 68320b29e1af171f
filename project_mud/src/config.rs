use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use engine_core::ScheduleConfig;
use mud::{AdmissionSettings, RoomId, ServerSettings};
use net::RateLimitConfig;

/// Command line of the `mud_server` binary. A hot restart re-executes the
/// binary with the same arguments.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mud_server", about = "Telnet MUD server")]
pub struct Cli {
    /// TOML configuration file. Missing file means defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override `[net] telnet_addr`.
    #[arg(long)]
    pub telnet_addr: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub telnet_addr: String,
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            telnet_addr: "0.0.0.0:4000".to_string(),
            max_connections_total: 1000,
            max_connections_per_ip: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimerSection {
    pub world_tick_ms: u64,
    pub zone_reset_secs: u64,
    pub output_flush_ms: u64,
    pub update_sweep_secs: u64,
}

impl Default for TimerSection {
    fn default() -> Self {
        Self {
            world_tick_ms: 2000,
            zone_reset_secs: 60,
            output_flush_ms: 50,
            update_sweep_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/world.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub max_commands_per_second: u32,
    pub throttle_penalty_ms: u64,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            max_commands_per_second: 20,
            throttle_penalty_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionSection {
    pub server_name: String,
    pub greeting: String,
    pub confirm_credential: bool,
    pub admins: Vec<String>,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            server_name: "the Realm".to_string(),
            greeting: String::new(),
            confirm_credential: false,
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    pub start_room: u32,
    pub zone_reset_minutes: u32,
    /// Give an empty store the default rooms at startup. When off, a store
    /// without rooms is a startup error.
    pub seed_default_rooms: bool,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            start_room: 2,
            zone_reset_minutes: 15,
            seed_default_rooms: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestartSection {
    pub snapshot_path: PathBuf,
    pub fallback_room: u32,
    pub flush_grace_ms: u64,
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/copyover.json"),
            fallback_room: 1,
            flush_grace_ms: 100,
        }
    }
}

/// Top-level MUD server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub timers: TimerSection,
    pub database: DatabaseSection,
    pub security: SecuritySection,
    pub admission: AdmissionSection,
    pub world: WorldSection,
    pub restart: RestartSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    /// File configuration with command line overrides applied.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::load(cli.config.as_deref())?;
        if let Some(addr) = &cli.telnet_addr {
            config.net.telnet_addr = addr.clone();
        }
        Ok(config)
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            world_tick: Duration::from_millis(self.timers.world_tick_ms),
            zone_reset: Duration::from_secs(self.timers.zone_reset_secs),
            output_flush: Duration::from_millis(self.timers.output_flush_ms),
            update_sweep: Duration::from_secs(self.timers.update_sweep_secs),
        }
    }

    pub fn rate_limits(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_connections_total: self.net.max_connections_total,
            max_connections_per_ip: self.net.max_connections_per_ip,
        }
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            admission: AdmissionSettings {
                server_name: self.admission.server_name.clone(),
                greeting: self.admission.greeting.clone(),
                confirm_credential: self.admission.confirm_credential,
                admins: self.admission.admins.clone(),
                start_room: RoomId(self.world.start_room),
            },
            max_commands_per_second: self.security.max_commands_per_second,
            throttle_penalty: Duration::from_millis(self.security.throttle_penalty_ms),
            fallback_room: RoomId(self.restart.fallback_room),
        }
    }

    pub fn flush_grace(&self) -> Duration {
        Duration::from_millis(self.restart.flush_grace_ms)
    }
}
