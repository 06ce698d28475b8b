use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A unit of simulated work: how long it computes and how much memory it touches.
///
/// Created once by the workload generator, consumed once by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Simulated compute time.
    pub compute_cost: Duration,
    /// Simulated storage footprint in MB. Zero means a pure-compute task.
    pub storage_cost: u64,
}

impl Task {
    pub fn new(compute_ms: u64, storage_mb: u64) -> Self {
        Self {
            compute_cost: Duration::from_millis(compute_ms),
            storage_cost: storage_mb,
        }
    }

    /// A task that never touches the resource ledger.
    pub fn compute_only(compute_ms: u64) -> Self {
        Self::new(compute_ms, 0)
    }

    pub fn is_compute_only(&self) -> bool {
        self.storage_cost == 0
    }
}
