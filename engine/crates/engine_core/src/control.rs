use std::time::{Duration, Instant};

use net::{EventRx, NetEvent};
use observability::EventMetrics;
use tokio::sync::watch;

use crate::schedule::{Schedule, ScheduleConfig, TimerKind};

/// One unit of work for the control loop.
#[derive(Debug)]
pub enum ServerEvent {
    Net(NetEvent),
    Timer(TimerKind),
}

impl ServerEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Net(NetEvent::NewSession { .. }) => "new_session",
            Self::Net(NetEvent::SessionResumed { .. }) => "session_resumed",
            Self::Net(NetEvent::Line { .. }) => "line",
            Self::Net(NetEvent::SessionLost { .. }) => "session_lost",
            Self::Timer(kind) => kind.label(),
        }
    }
}

/// What the loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the loop and return the handler to the caller.
    Shutdown,
    /// A hot restart was prepared. The loop lets outbound queues drain for
    /// the grace period, then calls [`EventHandler::complete_restart`].
    Restart,
}

/// Owner of all shared server state, driven one event at a time.
pub trait EventHandler {
    fn handle(&mut self, event: ServerEvent) -> Flow;

    /// Replace the process image. Only returns if that failed, with the
    /// flow to continue with.
    fn complete_restart(&mut self) -> Flow;

    /// Number of live sessions, for metrics.
    fn session_count(&self) -> usize {
        0
    }
}

/// The single consumer of network events and timer firings.
///
/// Every event is handled to completion before the next is selected, so the
/// handler mutates world and session state with plain sequential code.
pub struct ControlLoop<H> {
    handler: H,
    events: EventRx,
    schedule: Schedule,
    shutdown: Option<watch::Receiver<bool>>,
    restart_grace: Duration,
    processed: u64,
}

impl<H: EventHandler> ControlLoop<H> {
    /// Must be called inside a tokio runtime (the schedule's timers start
    /// here).
    pub fn new(handler: H, events: EventRx, schedule: &ScheduleConfig) -> Self {
        Self {
            handler,
            events,
            schedule: Schedule::new(schedule),
            shutdown: None,
            restart_grace: Duration::from_millis(100),
            processed: 0,
        }
    }

    /// Stop when `shutdown` becomes true (signal handling lives in the binary).
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace = grace;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Process one event to completion.
    pub fn dispatch(&mut self, event: ServerEvent) -> Flow {
        let kind = event.label();
        let started = Instant::now();
        let flow = self.handler.handle(event);
        self.processed += 1;
        EventMetrics::new(kind, self.processed, started.elapsed(), self.handler.session_count())
            .log();
        flow
    }

    /// Run until shutdown is requested, the handler asks to stop, or every
    /// event sender is gone. Returns the handler for final cleanup.
    pub async fn run(mut self) -> H {
        tracing::info!("control loop started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => {
                    tracing::info!("shutdown requested");
                    break;
                }
                kind = self.schedule.next() => ServerEvent::Timer(kind),
                event = self.events.recv() => match event {
                    Some(event) => ServerEvent::Net(event),
                    None => {
                        tracing::info!("event channel closed");
                        break;
                    }
                },
            };

            match self.dispatch(event) {
                Flow::Continue => {}
                Flow::Shutdown => break,
                Flow::Restart => {
                    tokio::time::sleep(self.restart_grace).await;
                    if self.handler.complete_restart() == Flow::Shutdown {
                        break;
                    }
                }
            }
        }
        tracing::info!(events = self.processed, "control loop stopped");
        self.handler
    }
}

async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        if rx.wait_for(|stop| *stop).await.is_ok() {
            return;
        }
    }
    // No shutdown source, or its sender is gone: never fires.
    std::future::pending::<()>().await
}
