use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use edgeplay_core::PoolConfig;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::ComputeError;
use crate::sync::{lock, ShutdownSignal};

use super::handle::TaskHandle;
use super::telemetry::Telemetry;
use super::worker;

pub(super) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pending work. `jobs` and `enqueued_at` are always pushed and popped together.
pub(super) struct QueueState {
    pub(super) jobs: VecDeque<Job>,
    pub(super) enqueued_at: VecDeque<Instant>,
    pub(super) shutdown: bool,
}

/// State shared between the pool handle, its workers and its monitor.
pub(super) struct Shared {
    pub(super) queue: Mutex<QueueState>,
    /// Wakes workers when work arrives or on shutdown.
    pub(super) available: Condvar,
    /// Wakes the monitor early on shutdown.
    pub(super) tick: Condvar,
    pub(super) telemetry: Telemetry,
    pub(super) latency_ratio: f64,
    pub(super) monitor_interval: Duration,
}

/// Fixed-size pool of worker threads standing in for CPU cores.
///
/// Work is taken in FIFO order from one shared queue. A monitor thread
/// samples throughput, backlog and blocking once per tick; the getters
/// expose the rolling means of those samples.
pub struct ThreadPool {
    shared: Arc<Shared>,
    thread_count: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Ids of every spawned thread; outlives `handles`, which join takes.
    thread_ids: Mutex<Vec<ThreadId>>,
    joining: AtomicBool,
    joined: ShutdownSignal,
}

impl ThreadPool {
    /// Start `threads` workers plus one monitor thread.
    ///
    /// An impossible thread count is replaced by `config.fallback_threads`.
    pub fn new(threads: usize, config: &PoolConfig) -> Result<Self, ComputeError> {
        let thread_count = config.resolve_threads(threads);
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                enqueued_at: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
            tick: Condvar::new(),
            telemetry: Telemetry::new(
                thread_count as f64,
                Duration::from_millis(config.initial_avg_task_ms),
            ),
            latency_ratio: config.latency_ratio,
            monitor_interval: Duration::from_millis(config.monitor_interval_ms),
        });

        let pool = Self {
            shared,
            thread_count,
            handles: Mutex::new(Vec::with_capacity(thread_count + 1)),
            thread_ids: Mutex::new(Vec::with_capacity(thread_count + 1)),
            joining: AtomicBool::new(false),
            joined: ShutdownSignal::new(),
        };

        for i in 0..thread_count {
            let shared = Arc::clone(&pool.shared);
            pool.spawn(format!("pool-worker-{}", i), move || worker::run_worker(&shared))?;
        }
        let shared = Arc::clone(&pool.shared);
        pool.spawn("pool-monitor".to_string(), move || worker::run_monitor(&shared))?;

        debug!(threads = thread_count, "worker pool started");
        Ok(pool)
    }

    fn spawn(&self, name: String, f: impl FnOnce() + Send + 'static) -> Result<(), ComputeError> {
        match thread::Builder::new().name(name).spawn(f) {
            Ok(handle) => {
                lock(&self.thread_ids).push(handle.thread().id());
                lock(&self.handles).push(handle);
                Ok(())
            }
            Err(e) => {
                // Dropping `self` joins whatever already started.
                error!(error = %e, "failed to spawn pool thread");
                Err(ComputeError::Spawn(e))
            }
        }
    }

    /// Queue `f` for execution.
    ///
    /// Returns [`ComputeError::ShuttingDown`] once [`join_all`](Self::join_all)
    /// has been called. Panics inside `f` are reported through the handle.
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>, ComputeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| ComputeError::TaskPanicked(panic_message(payload.as_ref())));
            // The caller may have dropped the handle; that is fine.
            let _ = tx.send(result);
        });

        {
            let mut state = lock(&self.shared.queue);
            if state.shutdown {
                return Err(ComputeError::ShuttingDown);
            }
            state.enqueued_at.push_back(Instant::now());
            state.jobs.push_back(job);
        }
        self.shared.available.notify_one();

        Ok(TaskHandle::new(rx))
    }

    /// Stop accepting work, let the queue drain, then join every thread.
    ///
    /// Safe to call more than once and from several threads: later callers
    /// block until the first has joined everything, unless they run on one
    /// of the pool's own threads.
    pub fn join_all(&self) {
        {
            let mut state = lock(&self.shared.queue);
            state.shutdown = true;
        }
        self.shared.available.notify_all();
        self.shared.tick.notify_all();

        if self.joining.swap(true, Ordering::SeqCst) {
            if !self.owns_current_thread() {
                self.joined.wait();
            }
            return;
        }

        let handles = std::mem::take(&mut *lock(&self.handles));
        let current = thread::current().id();
        for handle in handles {
            // A task that ends up dropping its own pool must not join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("pool thread panicked");
            }
        }
        self.joined.trigger();
        info!(threads = self.thread_count, "worker pool joined");
    }

    /// Whether the calling thread is one of this pool's threads.
    pub fn owns_current_thread(&self) -> bool {
        let current = thread::current().id();
        lock(&self.thread_ids).contains(&current)
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.shared.queue).shutdown
    }

    /// Number of worker threads (the monitor is not counted).
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Tasks currently waiting in the queue.
    pub fn pending(&self) -> usize {
        lock(&self.shared.queue).jobs.len()
    }

    /// Mean of the sampled queue-depth/speed ratio (0 before any sample).
    pub fn load(&self) -> f64 {
        self.shared.telemetry.load()
    }

    /// Current queue depth over the mean speed.
    pub fn instant_load(&self) -> f64 {
        self.pending() as f64 / self.current_speed()
    }

    /// Mean completions per tick over the last three ticks (1 before any sample).
    pub fn current_speed(&self) -> f64 {
        self.shared.telemetry.current_speed()
    }

    /// Mean of the sampled queue sizes (1 before any sample).
    pub fn task_queue_size(&self) -> f64 {
        self.shared.telemetry.task_queue_size()
    }

    /// EMA of speed over queue size; each call advances the average.
    pub fn power(&self) -> f64 {
        self.shared.telemetry.power()
    }

    /// Mean blocked dequeues over mean speed, floored at 0.01.
    pub fn block_rate(&self) -> f64 {
        self.shared.telemetry.block_rate()
    }

    /// Mean queue wait in milliseconds over the last three ticks.
    pub fn average_wait_ms(&self) -> f64 {
        self.shared.telemetry.average_wait_ms()
    }

    pub fn set_avg_task_time(&self, avg: Duration) {
        self.shared.telemetry.set_avg_task_time(avg);
    }

    pub fn avg_task_time(&self) -> Duration {
        self.shared.telemetry.avg_task_time()
    }

    /// Queue wait from which a dequeued task counts as blocked.
    pub fn blocked_threshold(&self) -> Duration {
        self.shared
            .telemetry
            .blocked_threshold(self.shared.latency_ratio)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join_all();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
