use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::entity::HookFault;
use super::metrics::{LoopMetricsSnapshot, MetricsAccumulator, MetricsHandle};
use super::rendering::{Surface, CLEAR_COLOR};
use super::WorldState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockKind {
    Simulation,
    Render,
    Metrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_period: Duration,
    /// Longest gap the simulation clock catches up on. Anything beyond it is
    /// a stall and is dropped.
    pub max_catch_up: Duration,
    pub metrics_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period: tick_period_for_rate(60),
            max_catch_up: Duration::from_secs(1),
            metrics_interval: Duration::from_secs(1),
        }
    }
}

pub fn tick_period_for_rate(ticks_per_second: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(ticks_per_second.max(1)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PumpReport {
    pub ticks_run: u32,
    pub frame_rendered: bool,
    pub metrics: Option<LoopMetricsSnapshot>,
    pub dropped_backlog: Duration,
    pub hook_faults: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationAdvance {
    pub ticks_run: u32,
    pub dropped_backlog: Duration,
    pub hook_faults: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ClockSwitch {
    running: bool,
}

impl Default for ClockSwitch {
    fn default() -> Self {
        Self { running: true }
    }
}

/// Drives the simulation, render and metrics clocks over one logical thread.
///
/// The simulation and metrics clocks advance from wall time alone, whenever the
/// host wakes the scheduler; render frames never gate them. Within a single
/// [`FrameScheduler::pump`] the order is fixed: every due simulation tick, then
/// the render frame, then the metrics tick. Each clock can be stopped on its own.
#[derive(Debug)]
pub struct FrameScheduler {
    config: SchedulerConfig,
    last_advance: Option<Instant>,
    accumulator: Duration,
    next_metrics_at: Option<Instant>,
    simulation: ClockSwitch,
    render: ClockSwitch,
    metrics_clock: ClockSwitch,
    tick_count: u64,
    frame_count: u64,
    hook_fault_count: u64,
    metrics: MetricsAccumulator,
    metrics_handle: MetricsHandle,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_metrics_handle(config, MetricsHandle::default())
    }

    pub fn with_metrics_handle(config: SchedulerConfig, metrics_handle: MetricsHandle) -> Self {
        let defaults = SchedulerConfig::default();
        let tick_period = normalize_non_zero_duration(config.tick_period, defaults.tick_period);
        let config = SchedulerConfig {
            tick_period,
            max_catch_up: normalize_non_zero_duration(config.max_catch_up, defaults.max_catch_up)
                .max(tick_period),
            metrics_interval: normalize_non_zero_duration(
                config.metrics_interval,
                defaults.metrics_interval,
            ),
        };
        Self {
            config,
            last_advance: None,
            accumulator: Duration::ZERO,
            next_metrics_at: None,
            simulation: ClockSwitch::default(),
            render: ClockSwitch::default(),
            metrics_clock: ClockSwitch::default(),
            tick_count: 0,
            frame_count: 0,
            hook_fault_count: 0,
            metrics: MetricsAccumulator::default(),
            metrics_handle,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Anchors all clocks at `now`. Advancing without starting starts implicitly.
    pub fn start(&mut self, now: Instant) {
        self.last_advance = Some(now);
        self.accumulator = Duration::ZERO;
        self.next_metrics_at = Some(now + self.config.metrics_interval);
    }

    pub fn stop(&mut self, clock: ClockKind) {
        self.switch_mut(clock).running = false;
        info!(clock = ?clock, "clock_stopped");
    }

    pub fn stop_all(&mut self) {
        for clock in [ClockKind::Simulation, ClockKind::Render, ClockKind::Metrics] {
            if self.is_running(clock) {
                self.stop(clock);
            }
        }
    }

    pub fn is_running(&self, clock: ClockKind) -> bool {
        match clock {
            ClockKind::Simulation => self.simulation.running,
            ClockKind::Render => self.render.running,
            ClockKind::Metrics => self.metrics_clock.running,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn hook_fault_count(&self) -> u64 {
        self.hook_fault_count
    }

    /// Earliest instant a running simulation or metrics clock becomes due.
    /// `None` once both are stopped.
    pub fn next_deadline(&self) -> Option<Instant> {
        let next_tick = self
            .simulation
            .running
            .then(|| {
                self.last_advance.map(|last| {
                    last + self.config.tick_period.saturating_sub(self.accumulator)
                })
            })
            .flatten();
        let next_metrics = self
            .metrics_clock
            .running
            .then_some(self.next_metrics_at)
            .flatten();
        match (next_tick, next_metrics) {
            (Some(tick), Some(metrics)) => Some(tick.min(metrics)),
            (tick, metrics) => tick.or(metrics),
        }
    }

    /// Wall-clock driven work with no render frame: due ticks, then metrics.
    pub fn run_due(
        &mut self,
        now: Instant,
        world: &mut WorldState,
    ) -> (SimulationAdvance, Option<LoopMetricsSnapshot>) {
        let advance = self.advance_simulation(now, world);
        (advance, self.poll_metrics(now))
    }

    pub fn pump(
        &mut self,
        now: Instant,
        world: &mut WorldState,
        surface: &mut dyn Surface,
    ) -> PumpReport {
        let advance = self.advance_simulation(now, world);
        let frame_faults = self.run_frame(world, surface);
        let metrics = self.poll_metrics(now);
        PumpReport {
            ticks_run: advance.ticks_run,
            frame_rendered: frame_faults.is_some(),
            metrics,
            dropped_backlog: advance.dropped_backlog,
            hook_faults: advance.hook_faults + frame_faults.unwrap_or(0),
        }
    }

    /// Runs every simulation tick that became due since the previous advance.
    /// The whole backlog is carried; only a gap longer than `max_catch_up` is
    /// cut down to it.
    pub fn advance_simulation(&mut self, now: Instant, world: &mut WorldState) -> SimulationAdvance {
        let last_advance = *self.last_advance.get_or_insert(now);
        if self.next_metrics_at.is_none() {
            self.next_metrics_at = Some(now + self.config.metrics_interval);
        }
        if now < last_advance {
            return SimulationAdvance::default();
        }
        self.last_advance = Some(now);
        if !self.simulation.running {
            return SimulationAdvance::default();
        }

        let (elapsed, dropped_backlog) = clamp_catch_up(
            now.saturating_duration_since(last_advance),
            self.config.max_catch_up,
        );
        self.accumulator = self.accumulator.saturating_add(elapsed);
        let plan = plan_sim_steps(self.accumulator, self.config.tick_period);
        self.accumulator = plan.remaining_accumulator;

        let mut hook_faults = 0;
        for _ in 0..plan.ticks_to_run {
            hook_faults += self.run_tick(world).unwrap_or(0);
        }

        if dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = dropped_backlog.as_millis() as u64,
                max_catch_up_ms = self.config.max_catch_up.as_millis() as u64,
                "sim_stall_dropped"
            );
        }
        SimulationAdvance {
            ticks_run: plan.ticks_to_run,
            dropped_backlog,
            hook_faults,
        }
    }

    /// One simulation tick: camera, entity step pass, input consolidation.
    /// `None` when the simulation clock is stopped.
    pub fn run_tick(&mut self, world: &mut WorldState) -> Option<usize> {
        if !self.simulation.running {
            return None;
        }
        world.update_camera();
        let faults = world.step_entities();
        world.consolidate_input();

        self.tick_count = self.tick_count.saturating_add(1);
        self.metrics.record_tick();
        Some(self.absorb_faults(&faults))
    }

    /// One render frame: clear, blocks, entities. `None` when stopped.
    pub fn run_frame(&mut self, world: &WorldState, surface: &mut dyn Surface) -> Option<usize> {
        if !self.render.running {
            return None;
        }
        surface.clear(CLEAR_COLOR);
        let mut faults = world.draw_tiles(surface);
        faults.extend(world.draw_entities(surface));

        self.frame_count = self.frame_count.saturating_add(1);
        self.metrics.record_frame();
        Some(self.absorb_faults(&faults))
    }

    pub fn poll_metrics(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        if !self.metrics_clock.running {
            return None;
        }
        let interval = self.config.metrics_interval;
        let due_at = *self.next_metrics_at.get_or_insert(now + interval);
        if now < due_at {
            return None;
        }

        let mut next = due_at + interval;
        if next <= now {
            // More than one interval behind.
            next = now + interval;
        }
        self.next_metrics_at = Some(next);
        Some(self.run_metrics())
    }

    pub fn run_metrics(&mut self) -> LoopMetricsSnapshot {
        let snapshot = self
            .metrics
            .sample(self.config.metrics_interval, self.hook_fault_count);
        self.metrics_handle.publish(snapshot);
        info!(
            fps = snapshot.fps,
            tps = snapshot.tps,
            average_fps = snapshot.average_fps_display(),
            average_tps = snapshot.average_tps_display(),
            hook_faults = snapshot.hook_faults,
            "loop_metrics"
        );
        snapshot
    }

    fn absorb_faults(&mut self, faults: &[HookFault]) -> usize {
        self.hook_fault_count = self
            .hook_fault_count
            .saturating_add(faults.len() as u64);
        faults.len()
    }

    fn switch_mut(&mut self, clock: ClockKind) -> &mut ClockSwitch {
        match clock {
            ClockKind::Simulation => &mut self.simulation,
            ClockKind::Render => &mut self.render,
            ClockKind::Metrics => &mut self.metrics_clock,
        }
    }
}

fn plan_sim_steps(accumulator: Duration, fixed_dt: Duration) -> StepPlan {
    let whole_ticks = accumulator.as_nanos() / fixed_dt.as_nanos().max(1);
    let ticks_to_run = u32::try_from(whole_ticks).unwrap_or(u32::MAX);
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator.saturating_sub(fixed_dt.saturating_mul(ticks_to_run)),
    }
}

/// Splits an elapsed gap into the part to simulate and the stalled remainder.
fn clamp_catch_up(elapsed: Duration, max_catch_up: Duration) -> (Duration, Duration) {
    let kept = elapsed.min(max_catch_up);
    (kept, elapsed - kept)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
