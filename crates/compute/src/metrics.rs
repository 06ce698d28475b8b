use serde::Serialize;

/// Point-in-time telemetry of one node, as read by monitors and recorders.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetrics {
    pub id: usize,
    pub weight: u32,
    pub qps: u32,
    /// Current queue depth over mean speed.
    pub load: f64,
    /// Rolling mean of the sampled load.
    pub average_load: f64,
    pub memory_utilization: f64,
    pub memory_capacity_mb: u64,
    /// Rolling mean of the sampled queue size.
    pub queue_size: f64,
    pub pending: usize,
    pub speed: f64,
    pub power: f64,
    pub block_rate: f64,
    pub average_wait_ms: f64,
    pub cores: usize,
}
