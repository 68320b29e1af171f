use std::time::{Duration, Instant};

use engine_core::{HookError, PeriodicHooks, ScriptHost};

use crate::world::World;

pub const ZONE_RESET_MESSAGE: &str = "You hear the patter of little feet.\r\n";

/// The world plus the script host, driven by the periodic timers.
pub struct WorldSystems<S> {
    pub world: World,
    scripts: S,
    zone_lifespan: Duration,
    pulse: u64,
}

impl<S: ScriptHost> WorldSystems<S> {
    pub fn new(world: World, scripts: S, zone_reset_minutes: u32) -> Self {
        Self {
            world,
            scripts,
            zone_lifespan: Duration::from_secs(u64::from(zone_reset_minutes) * 60),
            pulse: 0,
        }
    }

    pub fn with_zone_lifespan(mut self, lifespan: Duration) -> Self {
        self.zone_lifespan = lifespan;
        self
    }

    pub fn pulse(&self) -> u64 {
        self.pulse
    }

    pub fn scripts_mut(&mut self) -> &mut S {
        &mut self.scripts
    }
}

impl<S: ScriptHost> PeriodicHooks for WorldSystems<S> {
    fn world_tick(&mut self) -> Result<(), HookError> {
        self.pulse += 1;
        self.scripts.call("world_tick", &[&self.pulse.to_string()])
    }

    /// Reset every zone that outlived its lifespan. A failing zone does not
    /// keep the others from resetting; the first failure is reported.
    fn zone_reset(&mut self) -> Result<(), HookError> {
        let mut first_error = None;
        for zone in self.world.zones_due(Instant::now(), self.zone_lifespan) {
            tracing::debug!(zone, "zone reset");
            self.world.send_to_zone(zone, ZONE_RESET_MESSAGE);
            if let Err(e) = self.scripts.call("zone_reset", &[&zone.to_string()]) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn update_sweep(&mut self) -> Result<(), HookError> {
        let names: Vec<String> = self.world.actors().map(|a| a.name.clone()).collect();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.scripts.call("character_update", &[&name]) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
