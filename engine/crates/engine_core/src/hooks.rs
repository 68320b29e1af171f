//! Narrow interfaces to the subsystems the control loop drives but does not
//! own: periodic world work and the scripting engine.
//!
//! Both are synchronous and report only success or failure. Failures are
//! logged by the caller and never stop the loop.

use crate::schedule::TimerKind;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook {hook} failed: {message}")]
    Failed { hook: String, message: String },
}

impl HookError {
    pub fn failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// A scripting engine seen from the control loop: call a named hook with
/// string arguments, learn whether it worked.
pub trait ScriptHost: Send {
    fn call(&mut self, hook: &str, args: &[&str]) -> Result<(), HookError>;
}

/// Host used when no scripts are loaded; every hook succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScripts;

impl ScriptHost for NoScripts {
    fn call(&mut self, _hook: &str, _args: &[&str]) -> Result<(), HookError> {
        Ok(())
    }
}

/// Periodic subsystems invoked on their timers.
pub trait PeriodicHooks {
    /// Combat rounds and other pulse work.
    fn world_tick(&mut self) -> Result<(), HookError>;
    fn zone_reset(&mut self) -> Result<(), HookError>;
    /// Periodic character effects.
    fn update_sweep(&mut self) -> Result<(), HookError>;
}

/// Run the hook belonging to `kind` and log a failure. Returns false if the
/// hook failed. The output flush has no hook and always succeeds.
pub fn fire_periodic<P: PeriodicHooks + ?Sized>(hooks: &mut P, kind: TimerKind) -> bool {
    let result = match kind {
        TimerKind::WorldTick => hooks.world_tick(),
        TimerKind::ZoneReset => hooks.zone_reset(),
        TimerKind::UpdateSweep => hooks.update_sweep(),
        TimerKind::OutputFlush => return true,
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(timer = kind.label(), error = %e, "periodic hook failed");
            false
        }
    }
}
