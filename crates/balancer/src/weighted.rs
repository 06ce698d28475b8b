use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

/// Largest weight a single node counts with when a round is built. Bounds
/// the round length, and so the memory and build time of every rebuild.
pub const MAX_NODE_WEIGHT: u32 = 1024;

fn capped(weight: u32) -> u32 {
    weight.min(MAX_NODE_WEIGHT)
}

/// Interleaved node order for one weighted round: node `i` appears
/// `weights[i]` times and heavy nodes are spread out rather than clumped.
///
/// Every slot picks the node with the highest running credit (lowest index
/// on ties), charges it the total weight, then every node earns its own
/// weight again. Zero total weight yields an empty order. Weights above
/// [`MAX_NODE_WEIGHT`] count as `MAX_NODE_WEIGHT`.
pub fn smooth_weighted_order(weights: &[u32]) -> Vec<usize> {
    let weights: Vec<u32> = weights.iter().map(|&w| capped(w)).collect();
    let total: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    if total == 0 {
        return Vec::new();
    }

    let len = usize::try_from(total).unwrap_or(usize::MAX);
    let mut order = Vec::with_capacity(len);
    let mut credit: Vec<i64> = weights.iter().map(|&w| i64::from(w)).collect();

    loop {
        let mut best = 0;
        for (i, &c) in credit.iter().enumerate().skip(1) {
            if c > credit[best] {
                best = i;
            }
        }
        order.push(best);
        credit[best] -= total;

        if order.len() == len {
            break;
        }
        for (c, &w) in credit.iter_mut().zip(&weights) {
            *c += i64::from(w);
        }
    }

    order
}

/// One published weighted round. Immutable apart from its read cursor, so a
/// reader holding an `Arc` to it never sees a half-built order.
#[derive(Debug)]
pub struct WeightedQueue {
    order: Vec<usize>,
    /// Capped weights the order was built from.
    weights: Vec<u32>,
    cursor: AtomicUsize,
}

impl WeightedQueue {
    pub fn build(weights: &[u32]) -> Self {
        for (node, &w) in weights.iter().enumerate() {
            if w > MAX_NODE_WEIGHT {
                warn!(node, weight = w, cap = MAX_NODE_WEIGHT, "node weight capped");
            }
        }
        Self {
            order: smooth_weighted_order(weights),
            weights: weights.iter().map(|&w| capped(w)).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Whether this round still reflects `weights`, compared after capping.
    pub fn built_from(&self, weights: impl IntoIterator<Item = u32>) -> bool {
        self.weights.iter().copied().eq(weights.into_iter().map(capped))
    }

    /// Next slot of the round. `None` once the round is used up; the cursor
    /// then wraps so the same round can be replayed if no fresh one arrives.
    pub fn next(&self) -> Option<usize> {
        let pos = self.cursor.fetch_add(1, Ordering::Relaxed);
        match self.order.get(pos) {
            Some(&idx) => Some(idx),
            None => {
                self.cursor.store(0, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
