pub mod app;
pub mod config;
pub mod shutdown;

pub use app::{App, StartupError};
pub use config::{Cli, ConfigError, ServerConfig};
