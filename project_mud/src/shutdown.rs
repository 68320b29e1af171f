use std::io;

use tokio::sync::watch;

/// Sender side, held by main; triggers shutdown.
pub struct ShutdownTx(watch::Sender<bool>);

/// Receiver side, cloned to each subsystem.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

/// Create a shutdown channel pair.
pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    /// Signal all receivers to shut down.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl ShutdownRx {
    /// Unwrap into the underlying watch::Receiver for passing to engine crates.
    pub fn into_inner(self) -> watch::Receiver<bool> {
        self.0
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
    }
    Ok(())
}

/// Trigger `tx` when a termination signal arrives.
pub fn trigger_on_signal(tx: ShutdownTx) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => tx.trigger(),
            Err(e) => tracing::error!(error = %e, "cannot listen for termination signals"),
        }
    });
}
