/// Errors surfaced by the compute layer.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("worker pool is shutting down")]
    ShuttingDown,
    #[error("memory exhausted: requested {requested}MB, {free}MB free")]
    CapacityExhausted { requested: u64, free: u64 },
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    #[error("task result dropped before completion")]
    Disconnected,
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
