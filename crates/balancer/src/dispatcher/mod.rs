use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use edgeplay_compute::Node;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::algorithm::Algorithm;
use crate::error::BalanceError;
use crate::statistics::{DispatchStatistics, NodeDispatchCount};
use crate::target::DispatchTarget;
use crate::weighted::WeightedQueue;

/// Routes each task to one node of a fixed, non-empty cluster.
///
/// Selection is safe from any number of client threads. The weighted
/// algorithm serves from an immutable [`WeightedQueue`] snapshot; when a
/// round runs out, or a node's weight no longer matches the round, a
/// background thread builds the next one from the nodes' current weights
/// and swaps it in whole. Selections made meanwhile fall back to round robin.
pub struct Dispatcher<T: DispatchTarget = Node> {
    targets: Arc<Vec<Arc<T>>>,
    algorithm: RwLock<Algorithm>,
    counters: Vec<AtomicU64>,
    offset: AtomicUsize,
    rng: Mutex<StdRng>,
    queue: Arc<RwLock<Arc<WeightedQueue>>>,
    rebuilding: Arc<AtomicBool>,
    rebuild: Mutex<Option<JoinHandle<()>>>,
}

impl<T: DispatchTarget> Dispatcher<T> {
    pub fn new(targets: Vec<Arc<T>>, algorithm: Algorithm) -> Result<Self, BalanceError> {
        Self::with_rng(targets, algorithm, StdRng::from_entropy())
    }

    /// Same as [`Dispatcher::new`] with a reproducible random stream.
    pub fn with_seed(
        targets: Vec<Arc<T>>,
        algorithm: Algorithm,
        seed: u64,
    ) -> Result<Self, BalanceError> {
        Self::with_rng(targets, algorithm, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        targets: Vec<Arc<T>>,
        algorithm: Algorithm,
        rng: StdRng,
    ) -> Result<Self, BalanceError> {
        if targets.is_empty() {
            return Err(BalanceError::NoNodes);
        }

        let initial = WeightedQueue::build(&current_weights(targets.as_slice()));
        let counters = targets.iter().map(|_| AtomicU64::new(0)).collect();

        info!(
            nodes = targets.len(),
            algorithm = %algorithm,
            round = initial.len(),
            "dispatcher ready"
        );

        Ok(Self {
            targets: Arc::new(targets),
            algorithm: RwLock::new(algorithm),
            counters,
            offset: AtomicUsize::new(0),
            rng: Mutex::new(rng),
            queue: Arc::new(RwLock::new(Arc::new(initial))),
            rebuilding: Arc::new(AtomicBool::new(false)),
            rebuild: Mutex::new(None),
        })
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Pick a node for the next task under the current algorithm.
    pub fn select_one_server(&self) -> Arc<T> {
        let idx = self.select_index();
        Arc::clone(&self.targets[idx])
    }

    /// Index form of [`Dispatcher::select_one_server`]; also counts the dispatch.
    pub fn select_index(&self) -> usize {
        let idx = match self.algorithm() {
            Algorithm::Random => self.pick_random(),
            Algorithm::RoundRobin => self.pick_round_robin(),
            Algorithm::PowerOfTwoChoices => self.pick_power_of_two(),
            Algorithm::Weighted => self.pick_weighted(),
        };
        self.counters[idx].fetch_add(1, Ordering::Relaxed);
        idx
    }

    fn pick_random(&self) -> usize {
        lock(&self.rng).gen_range(0..self.targets.len())
    }

    fn pick_round_robin(&self) -> usize {
        self.offset.fetch_add(1, Ordering::Relaxed) % self.targets.len()
    }

    fn pick_power_of_two(&self) -> usize {
        let (a, b) = {
            let mut rng = lock(&self.rng);
            let n = self.targets.len();
            (rng.gen_range(0..n), rng.gen_range(0..n))
        };
        self.less_blocked(a, b)
    }

    /// The candidate with the strictly lower block rate, else the first.
    pub(crate) fn less_blocked(&self, a: usize, b: usize) -> usize {
        if a == b {
            return a;
        }
        if self.targets[b].block_rate() < self.targets[a].block_rate() {
            b
        } else {
            a
        }
    }

    fn pick_weighted(&self) -> usize {
        if self.rebuilding.load(Ordering::Acquire) {
            return self.pick_round_robin();
        }

        let queue = self.current_queue();
        if !queue.built_from(self.targets.iter().map(|t| t.weight())) {
            self.request_rebuild();
            return self.pick_round_robin();
        }
        if let Some(idx) = queue.next() {
            return idx;
        }

        // An empty round with unchanged weights has nothing to rebuild from.
        if !queue.is_empty() {
            self.request_rebuild();
        }
        self.pick_round_robin()
    }

    // ── Weighted queue maintenance ──────────────────────────────────

    /// Start building a fresh weighted round in the background.
    ///
    /// Returns `false` when a rebuild is already in flight or the builder
    /// thread could not be spawned; the current round stays published.
    pub fn request_rebuild(&self) -> bool {
        if self
            .rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let mut slot = lock(&self.rebuild);
        if let Some(previous) = slot.take() {
            // Already cleared the flag, so it is finished or about to be.
            let _ = previous.join();
        }

        let targets = Arc::clone(&self.targets);
        let queue = Arc::clone(&self.queue);
        let rebuilding = Arc::clone(&self.rebuilding);

        let spawned = thread::Builder::new()
            .name("weighted-rebuild".into())
            .spawn(move || {
                let fresh = WeightedQueue::build(&current_weights(targets.as_slice()));
                debug!(round = fresh.len(), "weighted round rebuilt");
                *queue.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(fresh);
                rebuilding.store(false, Ordering::Release);
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn weighted rebuild");
                self.rebuilding.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Block until any in-flight rebuild has published its round.
    pub fn wait_for_rebuild(&self) {
        let handle = lock(&self.rebuild).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("weighted rebuild thread panicked");
                self.rebuilding.store(false, Ordering::Release);
            }
        }
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    /// Node order of the currently published weighted round.
    pub fn weighted_order(&self) -> Vec<usize> {
        self.current_queue().order().to_vec()
    }

    fn current_queue(&self) -> Arc<WeightedQueue> {
        Arc::clone(&self.queue.read().unwrap_or_else(PoisonError::into_inner))
    }

    // ── Configuration ───────────────────────────────────────────────

    pub fn algorithm(&self) -> Algorithm {
        *self.algorithm.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch algorithms. Switching to weighted refreshes the round from
    /// the nodes' current weights.
    pub fn set_algorithm(&self, algorithm: Algorithm) {
        let previous = std::mem::replace(
            &mut *self.algorithm.write().unwrap_or_else(PoisonError::into_inner),
            algorithm,
        );
        if previous != algorithm {
            info!(from = %previous, to = %algorithm, "dispatch algorithm changed");
        }
        if algorithm == Algorithm::Weighted {
            self.request_rebuild();
        }
    }

    pub fn nodes(&self) -> &[Arc<T>] {
        self.targets.as_slice()
    }

    pub fn node_count(&self) -> usize {
        self.targets.len()
    }

    // ── Statistics ──────────────────────────────────────────────────

    /// Dispatches per node index so far.
    pub fn dispatch_counts(&self) -> Vec<u64> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub fn statistics(&self) -> DispatchStatistics {
        let per_node: Vec<NodeDispatchCount> = self
            .targets
            .iter()
            .zip(&self.counters)
            .map(|(t, c)| NodeDispatchCount {
                node: t.id(),
                count: c.load(Ordering::Relaxed),
            })
            .collect();
        let total = per_node.iter().map(|n| n.count).sum();

        DispatchStatistics {
            algorithm: self.algorithm(),
            per_node,
            total,
        }
    }

    pub fn print_statistics(&self) {
        let stats = self.statistics();
        for entry in &stats.per_node {
            info!(node = entry.node, dispatched = entry.count, "dispatch count");
        }
        info!(algorithm = %stats.algorithm, total = stats.total, "dispatch totals");
    }
}

impl<T: DispatchTarget> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.wait_for_rebuild();
    }
}

impl<T: DispatchTarget> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("nodes", &self.targets.len())
            .field("algorithm", &self.algorithm())
            .field("rebuilding", &self.is_rebuilding())
            .finish()
    }
}

fn current_weights<T: DispatchTarget>(targets: &[Arc<T>]) -> Vec<u32> {
    targets.iter().map(|t| t.weight()).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
