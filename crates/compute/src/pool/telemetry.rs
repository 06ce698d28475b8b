use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::sync::lock;

/// Number of one-second samples every rolling window keeps.
pub const WINDOW_DEPTH: usize = 3;

/// EMA weight kept from the previous power estimate.
const POWER_DECAY: f64 = 0.37;

/// Lower bound reported by [`Telemetry::block_rate`].
const MIN_BLOCK_RATE: f64 = 0.01;

// ── Rolling window ───────────────────────────────────────────────────

/// A fixed-depth window of samples, evicting the oldest on overflow.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Push a sample, evicting the oldest if at capacity.
    pub fn push(&mut self, sample: f64) {
        while self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Mean of the stored samples, `None` while empty.
    pub fn mean(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.buf.iter().sum::<f64>() / self.buf.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

// ── Pool telemetry ───────────────────────────────────────────────────

#[derive(Debug)]
struct Windows {
    /// Completed tasks per tick (never below 1).
    speeds: RollingWindow,
    /// Queue depth + 2 per tick.
    queue_sizes: RollingWindow,
    /// Queue depth / speed per tick.
    loads: RollingWindow,
    /// Blocked dequeues per tick.
    blocked: RollingWindow,
    /// Mean queue wait (ms) of the tasks dequeued per tick.
    waits: RollingWindow,
}

impl Windows {
    fn new() -> Self {
        Self {
            speeds: RollingWindow::new(WINDOW_DEPTH),
            queue_sizes: RollingWindow::new(WINDOW_DEPTH),
            loads: RollingWindow::new(WINDOW_DEPTH),
            blocked: RollingWindow::new(WINDOW_DEPTH),
            waits: RollingWindow::new(WINDOW_DEPTH),
        }
    }

    fn speed(&self) -> f64 {
        self.speeds.mean().unwrap_or(1.0)
    }

    fn queue_size(&self) -> f64 {
        self.queue_sizes.mean().unwrap_or(1.0)
    }
}

/// Counters bumped by workers plus the windows the monitor rolls them into.
///
/// Windows have a single writer (the monitor thread); every reader gets an
/// approximate view, which is all the load heuristics need.
#[derive(Debug)]
pub(crate) struct Telemetry {
    windows: RwLock<Windows>,
    power: Mutex<f64>,
    completed: AtomicU64,
    blocked: AtomicU64,
    dequeued: AtomicU64,
    wait_nanos: AtomicU64,
    avg_task_nanos: AtomicU64,
}

impl Telemetry {
    pub(crate) fn new(initial_power: f64, initial_avg_task: Duration) -> Self {
        Self {
            windows: RwLock::new(Windows::new()),
            power: Mutex::new(initial_power),
            completed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            wait_nanos: AtomicU64::new(0),
            avg_task_nanos: AtomicU64::new(duration_nanos(initial_avg_task)),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Windows> {
        self.windows
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ── worker side ──

    /// Account for one dequeue that waited `waited` in the queue.
    pub(crate) fn record_dequeue(&self, waited: Duration, latency_ratio: f64) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.wait_nanos
            .fetch_add(duration_nanos(waited), Ordering::Relaxed);
        if waited >= self.blocked_threshold(latency_ratio) {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue wait at which a task counts as blocked.
    pub(crate) fn blocked_threshold(&self, latency_ratio: f64) -> Duration {
        self.avg_task_time().mul_f64(latency_ratio)
    }

    // ── monitor side ──

    /// Roll the per-tick counters into the windows.
    pub(crate) fn sample(&self, queue_len: usize) {
        let blocked = self.blocked.swap(0, Ordering::Relaxed);
        let completed = self.completed.swap(0, Ordering::Relaxed);
        let dequeued = self.dequeued.swap(0, Ordering::Relaxed);
        let wait_nanos = self.wait_nanos.swap(0, Ordering::Relaxed);

        let mut windows = self
            .windows
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let load = queue_len as f64 / windows.speed();
        windows.loads.push(load);
        windows.blocked.push(blocked as f64);
        windows.speeds.push(completed.max(1) as f64);
        windows.queue_sizes.push((queue_len + 2) as f64);

        let mean_wait_ms = if dequeued == 0 {
            0.0
        } else {
            wait_nanos as f64 / dequeued as f64 / 1_000_000.0
        };
        windows.waits.push(mean_wait_ms);
    }

    // ── readers ──

    pub(crate) fn current_speed(&self) -> f64 {
        self.read().speed()
    }

    pub(crate) fn task_queue_size(&self) -> f64 {
        self.read().queue_size()
    }

    pub(crate) fn load(&self) -> f64 {
        self.read().loads.mean().unwrap_or(0.0)
    }

    pub(crate) fn average_wait_ms(&self) -> f64 {
        self.read().waits.mean().unwrap_or(0.0)
    }

    pub(crate) fn block_rate(&self) -> f64 {
        let windows = self.read();
        let blocked = windows.blocked.mean().unwrap_or(0.0);
        (blocked / windows.speed()).max(MIN_BLOCK_RATE)
    }

    /// Advance and return the EMA of throughput per unit of backlog.
    pub(crate) fn power(&self) -> f64 {
        let ratio = {
            let windows = self.read();
            windows.speed() / windows.queue_size()
        };
        let mut power = lock(&self.power);
        *power = POWER_DECAY * *power + (1.0 - POWER_DECAY) * ratio;
        *power
    }

    pub(crate) fn set_avg_task_time(&self, avg: Duration) {
        self.avg_task_nanos
            .store(duration_nanos(avg), Ordering::Relaxed);
    }

    pub(crate) fn avg_task_time(&self) -> Duration {
        Duration::from_nanos(self.avg_task_nanos.load(Ordering::Relaxed))
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
