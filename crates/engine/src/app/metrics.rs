use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub average_fps: f32,
    pub average_tps: f32,
    pub samples: u64,
    pub hook_faults: u64,
}

impl LoopMetricsSnapshot {
    pub fn average_fps_display(&self) -> f32 {
        floor_to_hundredths(self.average_fps)
    }

    pub fn average_tps_display(&self) -> f32 {
        floor_to_hundredths(self.average_tps)
    }
}

fn floor_to_hundredths(value: f32) -> f32 {
    (value * 100.0).floor() / 100.0
}

#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

/// Per-interval frame/tick counters plus running averages since start.
/// Averages are updated incrementally: `avg += (sample - avg) / n`.
#[derive(Debug, Default)]
pub(crate) struct MetricsAccumulator {
    frames: u32,
    ticks: u32,
    samples: u64,
    average_fps: f64,
    average_tps: f64,
}

impl MetricsAccumulator {
    pub(crate) fn record_frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn sample(&mut self, interval: Duration, hook_faults: u64) -> LoopMetricsSnapshot {
        let interval_seconds = interval.as_secs_f64().max(f64::EPSILON);
        let fps = self.frames as f64 / interval_seconds;
        let tps = self.ticks as f64 / interval_seconds;

        self.samples = self.samples.saturating_add(1);
        let n = self.samples as f64;
        self.average_fps += (fps - self.average_fps) / n;
        self.average_tps += (tps - self.average_tps) / n;

        self.frames = 0;
        self.ticks = 0;

        LoopMetricsSnapshot {
            fps: fps as f32,
            tps: tps as f32,
            average_fps: self.average_fps as f32,
            average_tps: self.average_tps as f32,
            samples: self.samples,
            hook_faults,
        }
    }
}
