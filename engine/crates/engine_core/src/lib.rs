pub mod control;
pub mod hooks;
pub mod restart;
pub mod schedule;

pub use control::{ControlLoop, EventHandler, Flow, ServerEvent};
pub use hooks::{HookError, NoScripts, PeriodicHooks, ScriptHost};
pub use restart::{ExecReplacer, ProcessReplacer};
pub use schedule::{Schedule, ScheduleConfig, TimerKind};
