use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use edgeplay_core::{NodeConfig, PoolConfig, Task};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::ComputeError;
use crate::ledger::ResourceLedger;
use crate::limiter::RateLimiter;
use crate::metrics::NodeMetrics;
use crate::pool::{TaskHandle, ThreadPool};
use crate::sync::{lock, ShutdownSignal};

/// Hardware shape of a simulated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub cores: usize,
    pub memory_mb: u64,
}

impl NodeSpec {
    pub fn new(cores: usize, memory_mb: u64) -> Self {
        Self { cores, memory_mb }
    }

    /// 1-8 cores and 512-10240 MB of memory, uniformly.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            cores: rng.gen_range(1..=8),
            memory_mb: rng.gen_range(512..=10240),
        }
    }
}

/// How a task fared once a worker ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskOutcome {
    /// Ran with its memory reserved (or needed none).
    Completed,
    /// Ran, but the ledger could not reserve its memory.
    MemoryExhausted,
}

impl TaskOutcome {
    pub fn succeeded(self) -> bool {
        self == TaskOutcome::Completed
    }
}

#[derive(Debug, Default)]
struct TaskStats {
    count: u64,
    total: Duration,
}

/// A simulated compute server.
///
/// Owns one worker pool (cores + 1 threads, the extra one hosting the
/// reclamation loop), one memory ledger and one admission limiter.
pub struct Node {
    id: usize,
    spec: NodeSpec,
    config: NodeConfig,
    pool: Arc<ThreadPool>,
    ledger: Arc<ResourceLedger>,
    limiter: RateLimiter,
    weight: Arc<AtomicU32>,
    stats: Mutex<TaskStats>,
    shutdown: Arc<ShutdownSignal>,
    reclaimer: Mutex<Option<TaskHandle<()>>>,
    tuner: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    /// Fired once the first `stop` has joined the pool.
    finished: ShutdownSignal,
}

impl Node {
    pub fn new(
        id: usize,
        spec: NodeSpec,
        config: &NodeConfig,
        pool_config: &PoolConfig,
    ) -> Result<Self, ComputeError> {
        let cores = pool_config.resolve_cores(spec.cores);
        let spec = NodeSpec { cores, ..spec };
        let pool = Arc::new(ThreadPool::new(cores + 1, pool_config)?);
        let ledger = Arc::new(ResourceLedger::new(spec.memory_mb, config.ledger_floor_mb));
        let shutdown = Arc::new(ShutdownSignal::new());
        let weight = Arc::new(AtomicU32::new(1));

        let reclaimer = {
            let ledger = Arc::clone(&ledger);
            let shutdown = Arc::clone(&shutdown);
            let interval = Duration::from_millis(config.reclaim_interval_ms);
            let chunk = config.reclaim_size_mb;
            pool.submit(move || reclaim_loop(id, &ledger, &shutdown, interval, chunk))?
        };

        let tuner = if config.game_mode {
            let pool = Arc::clone(&pool);
            let weight = Arc::clone(&weight);
            let signal = Arc::clone(&shutdown);
            let term = Duration::from_millis(config.game_term_ms);
            let max_weight = config.max_weight;
            let spawned = thread::Builder::new()
                .name(format!("node-{}-tuner", id))
                .spawn(move || tune_weight_loop(id, &pool, &weight, &signal, term, max_weight));
            match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    // Release the reclamation worker so the pool can be joined.
                    shutdown.trigger();
                    return Err(ComputeError::Spawn(e));
                }
            }
        } else {
            None
        };

        info!(
            node = id,
            cores = spec.cores,
            memory_mb = spec.memory_mb,
            qps = config.default_qps,
            "node started"
        );

        Ok(Self {
            id,
            spec,
            config: config.clone(),
            pool,
            ledger,
            limiter: RateLimiter::new(config.default_qps),
            weight,
            stats: Mutex::new(TaskStats::default()),
            shutdown,
            reclaimer: Mutex::new(Some(reclaimer)),
            tuner: Mutex::new(tuner),
            stopped: AtomicBool::new(false),
            finished: ShutdownSignal::new(),
        })
    }

    /// Admit, account for and enqueue one task.
    ///
    /// Blocks only for admission pacing. The handle resolves once a worker
    /// has simulated the task.
    pub fn execute(&self, task: Task) -> Result<TaskHandle<TaskOutcome>, ComputeError> {
        if self.is_stopped() {
            return Err(ComputeError::ShuttingDown);
        }
        self.limiter.pass();

        let avg = {
            let mut stats = lock(&self.stats);
            stats.count += 1;
            stats.total += task.compute_cost;
            Duration::from_nanos((stats.total.as_nanos() / u128::from(stats.count)) as u64)
        };
        self.pool.set_avg_task_time(avg);

        let ledger = Arc::clone(&self.ledger);
        let id = self.id;
        self.pool.submit(move || run_task(id, &ledger, task))
    }

    /// Lower the admission ceiling by one step; no-op at the floor.
    pub fn reduce_qps(&self) {
        let qps = self.limiter.qps();
        if qps <= self.config.min_qps {
            debug!(node = self.id, qps, "qps already at floor");
            return;
        }
        let next = qps.saturating_sub(self.config.qps_step).max(self.config.min_qps);
        self.limiter.set_qps(next);
        debug!(node = self.id, from = qps, to = next, "qps reduced");
    }

    /// Raise the admission ceiling by one step.
    pub fn raise_qps(&self) {
        let qps = self.limiter.qps();
        let next = qps.saturating_add(self.config.qps_step);
        self.limiter.set_qps(next);
        debug!(node = self.id, from = qps, to = next, "qps raised");
    }

    /// Stop background work, then drain and join the pool.
    ///
    /// The tuner and the reclamation loop are finished before the pool is
    /// told to join, so neither outlives it. A concurrent second caller
    /// blocks until the first has finished, except on one of our workers.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            if !self.pool.owns_current_thread() {
                self.finished.wait();
            }
            return;
        }
        info!(node = self.id, "node stopping");
        self.shutdown.trigger();

        if let Some(tuner) = lock(&self.tuner).take() {
            if tuner.thread().id() != thread::current().id() && tuner.join().is_err() {
                error!(node = self.id, "weight tuner panicked");
            }
        }

        if let Some(reclaimer) = lock(&self.reclaimer).take() {
            // Waiting from one of our own workers would deadlock.
            if !self.pool.owns_current_thread() {
                if let Err(e) = reclaimer.wait() {
                    warn!(node = self.id, error = %e, "reclamation loop ended abnormally");
                }
            }
        }

        self.pool.join_all();
        self.finished.trigger();
        info!(node = self.id, "node stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    // ── telemetry surface ──

    pub fn id(&self) -> usize {
        self.id
    }

    /// Cores actually serving tasks, after any fallback at construction.
    pub fn cores(&self) -> usize {
        self.spec.cores
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Ordering::Relaxed);
    }

    pub fn qps(&self) -> u32 {
        self.limiter.qps()
    }

    /// Current queue depth over mean speed.
    pub fn load(&self) -> f64 {
        self.pool.instant_load()
    }

    pub fn average_load(&self) -> f64 {
        self.pool.load()
    }

    pub fn memory_utilization(&self) -> f64 {
        self.ledger.utilization()
    }

    pub fn memory_capacity(&self) -> u64 {
        self.ledger.capacity()
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn task_queue_size(&self) -> f64 {
        self.pool.task_queue_size()
    }

    pub fn pending(&self) -> usize {
        self.pool.pending()
    }

    pub fn current_speed(&self) -> f64 {
        self.pool.current_speed()
    }

    pub fn power(&self) -> f64 {
        self.pool.power()
    }

    pub fn block_rate(&self) -> f64 {
        self.pool.block_rate()
    }

    pub fn average_wait_ms(&self) -> f64 {
        self.pool.average_wait_ms()
    }

    /// Running mean of the compute cost of every task executed so far.
    pub fn avg_task_time(&self) -> Duration {
        self.pool.avg_task_time()
    }

    pub fn tasks_executed(&self) -> u64 {
        lock(&self.stats).count
    }

    pub fn snapshot(&self) -> NodeMetrics {
        NodeMetrics {
            id: self.id,
            weight: self.weight(),
            qps: self.qps(),
            load: self.load(),
            average_load: self.average_load(),
            memory_utilization: self.memory_utilization(),
            memory_capacity_mb: self.memory_capacity(),
            queue_size: self.task_queue_size(),
            pending: self.pending(),
            speed: self.current_speed(),
            power: self.power(),
            block_rate: self.block_rate(),
            average_wait_ms: self.average_wait_ms(),
            cores: self.cores(),
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "server[{}] - load:{:.3},queue:{:.1},speed:{:.1}",
            self.id,
            self.load(),
            self.task_queue_size(),
            self.current_speed()
        )
    }

    pub fn print_status(&self) {
        info!("{}", self.status_line());
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("weight", &self.weight())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Simulate one task: reserve memory, compute, hand back 20% of the memory.
///
/// The kept 80% models a retained working set, left for the reclamation
/// loop. Pure-compute tasks never touch the ledger.
fn run_task(node: usize, ledger: &ResourceLedger, task: Task) -> TaskOutcome {
    if task.is_compute_only() {
        thread::sleep(task.compute_cost);
        return TaskOutcome::Completed;
    }

    let outcome = match ledger.reserve(task.storage_cost) {
        Ok(()) => TaskOutcome::Completed,
        Err(e) => {
            debug!(node, error = %e, "memory reservation failed");
            TaskOutcome::MemoryExhausted
        }
    };
    thread::sleep(task.compute_cost);
    ledger.release(task.storage_cost / 5);
    outcome
}

fn reclaim_loop(
    node: usize,
    ledger: &ResourceLedger,
    shutdown: &ShutdownSignal,
    interval: Duration,
    chunk_mb: u64,
) {
    while !shutdown.wait_timeout(interval) {
        ledger.release(chunk_mb);
        debug!(node, freed_mb = chunk_mb, used_mb = ledger.used(), "memory reclaimed");
    }
}

fn tune_weight_loop(
    node: usize,
    pool: &ThreadPool,
    weight: &AtomicU32,
    shutdown: &ShutdownSignal,
    term: Duration,
    max_weight: u32,
) {
    while !shutdown.wait_timeout(term) {
        let power = pool.power();
        let next = (power.round() as u32).clamp(1, max_weight.max(1));
        let prev = weight.swap(next, Ordering::Relaxed);
        if prev != next {
            debug!(node, power, from = prev, to = next, "weight retuned");
        }
    }
}
