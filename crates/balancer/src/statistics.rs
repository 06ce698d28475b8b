use serde::Serialize;

use crate::algorithm::Algorithm;

#[derive(Debug, Clone, Serialize)]
pub struct NodeDispatchCount {
    pub node: usize,
    pub count: u64,
}

/// Dispatch counters of one dispatcher, for reporting only.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatistics {
    pub algorithm: Algorithm,
    pub per_node: Vec<NodeDispatchCount>,
    pub total: u64,
}
