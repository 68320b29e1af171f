use std::process::ExitCode;

use clap::Parser;

use engine_core::ExecReplacer;
use project_mud::shutdown::{shutdown_channel, trigger_on_signal};
use project_mud::{App, Cli, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    observability::init_logging();

    let cli = Cli::parse();
    let config = match ServerConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    let replacer = match ExecReplacer::current() {
        Ok(replacer) => replacer,
        Err(e) => {
            tracing::error!(error = %e, "cannot locate the server executable");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %config.net.telnet_addr, "MUD server starting");

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let app = match App::start(&config, Box::new(replacer), shutdown_rx).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };
    trigger_on_signal(shutdown_tx);

    app.run().await;
    // Let the goodbye lines reach the sockets.
    tokio::time::sleep(config.flush_grace()).await;
    tracing::info!("server stopped");
    ExitCode::SUCCESS
}
