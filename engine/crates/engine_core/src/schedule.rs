use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// The fixed set of periodic timers owned by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Combat rounds and other per-pulse world work.
    WorldTick,
    /// Sweep zones and reset those whose age exceeded their lifespan.
    ZoneReset,
    /// Move buffered actor output to the network.
    OutputFlush,
    /// Periodic character effects.
    UpdateSweep,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::WorldTick,
        TimerKind::ZoneReset,
        TimerKind::OutputFlush,
        TimerKind::UpdateSweep,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::WorldTick => "timer:world_tick",
            Self::ZoneReset => "timer:zone_reset",
            Self::OutputFlush => "timer:output_flush",
            Self::UpdateSweep => "timer:update_sweep",
        }
    }
}

/// Timer periods.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub world_tick: Duration,
    pub zone_reset: Duration,
    pub output_flush: Duration,
    pub update_sweep: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            world_tick: Duration::from_secs(2),
            zone_reset: Duration::from_secs(60),
            output_flush: Duration::from_millis(50),
            update_sweep: Duration::from_secs(15),
        }
    }
}

impl ScheduleConfig {
    pub fn period(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::WorldTick => self.world_tick,
            TimerKind::ZoneReset => self.zone_reset,
            TimerKind::OutputFlush => self.output_flush,
            TimerKind::UpdateSweep => self.update_sweep,
        }
    }
}

/// Source of timer firings. Each timer first fires one period after
/// creation. A late timer fires once and then keeps its period from there,
/// so a stalled loop never sees a burst of catch-up ticks.
#[derive(Debug)]
pub struct Schedule {
    world_tick: Interval,
    zone_reset: Interval,
    output_flush: Interval,
    update_sweep: Interval,
}

impl Schedule {
    /// Must be called inside a tokio runtime.
    pub fn new(config: &ScheduleConfig) -> Self {
        let timer = |kind| {
            // A zero period would make tokio panic.
            let period = config.period(kind).max(Duration::from_millis(1));
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        };
        Self {
            world_tick: timer(TimerKind::WorldTick),
            zone_reset: timer(TimerKind::ZoneReset),
            output_flush: timer(TimerKind::OutputFlush),
            update_sweep: timer(TimerKind::UpdateSweep),
        }
    }

    /// Wait for the next timer to fire.
    pub async fn next(&mut self) -> TimerKind {
        tokio::select! {
            biased;
            _ = self.world_tick.tick() => TimerKind::WorldTick,
            _ = self.zone_reset.tick() => TimerKind::ZoneReset,
            _ = self.update_sweep.tick() => TimerKind::UpdateSweep,
            _ = self.output_flush.tick() => TimerKind::OutputFlush,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ScheduleConfig {
        ScheduleConfig {
            world_tick: Duration::from_millis(200),
            zone_reset: Duration::from_secs(10),
            output_flush: Duration::from_millis(50),
            update_sweep: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_at_their_periods() {
        let mut schedule = Schedule::new(&fast_config());
        let start = Instant::now();

        let first = schedule.next().await;
        assert_eq!(first, TimerKind::OutputFlush);
        assert!(start.elapsed() >= Duration::from_millis(50));

        let mut flushes = 1;
        let mut ticks = 0;
        loop {
            match schedule.next().await {
                TimerKind::OutputFlush => flushes += 1,
                TimerKind::WorldTick => ticks += 1,
                TimerKind::UpdateSweep => break,
                TimerKind::ZoneReset => panic!("zone reset fired early"),
            }
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1050));
        // The world tick due at 1s wins the tie with the update sweep.
        assert_eq!(ticks, 5);
        assert!(flushes >= 18);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_before_first_period() {
        let mut schedule = Schedule::new(&fast_config());
        let early = tokio::time::timeout(Duration::from_millis(49), schedule.next()).await;
        assert!(early.is_err());
    }

    #[test]
    fn default_periods() {
        let config = ScheduleConfig::default();
        assert_eq!(config.period(TimerKind::WorldTick), Duration::from_secs(2));
        assert_eq!(config.period(TimerKind::OutputFlush), Duration::from_millis(50));
        assert_eq!(TimerKind::ALL.len(), 4);
    }
}
