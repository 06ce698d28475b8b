use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::ComputeError;

/// Capacity substituted when a node is configured with no memory.
const FALLBACK_CAPACITY_MB: u64 = 512;

/// Lower bound reported by [`ResourceLedger::utilization`].
const MIN_UTILIZATION: f64 = 0.01;

/// Simulated memory budget of one node, in MB.
///
/// `used` starts at `floor` and an over-release snaps back to it rather
/// than going negative. `used <= capacity` is not enforced.
#[derive(Debug)]
pub struct ResourceLedger {
    capacity: u64,
    floor: u64,
    used: AtomicU64,
}

impl ResourceLedger {
    pub fn new(capacity: u64, floor: u64) -> Self {
        let capacity = if capacity == 0 {
            warn!(fallback = FALLBACK_CAPACITY_MB, "ledger capacity of 0, using fallback");
            FALLBACK_CAPACITY_MB
        } else {
            capacity
        };
        Self {
            capacity,
            floor,
            used: AtomicU64::new(floor),
        }
    }

    /// Debit `amount` iff it is strictly smaller than the free space.
    pub fn reserve(&self, amount: u64) -> Result<(), ComputeError> {
        let capacity = self.capacity;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (amount < capacity.saturating_sub(used)).then_some(used + amount)
            })
            .map(|_| ())
            .map_err(|used| ComputeError::CapacityExhausted {
                requested: amount,
                free: capacity.saturating_sub(used),
            })
    }

    /// Credit `amount` back; releasing as much as is used resets to the floor.
    pub fn release(&self, amount: u64) {
        let floor = self.floor;
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(if amount < used { used - amount } else { floor })
            });
    }

    /// `used / capacity`, floored at 0.01.
    pub fn utilization(&self) -> f64 {
        (self.used() as f64 / self.capacity as f64).max(MIN_UTILIZATION)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.used())
    }
}
