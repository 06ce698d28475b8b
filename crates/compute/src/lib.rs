//! Simulated compute node: a telemetry-carrying worker pool, an admission
//! limiter and a memory ledger, composed by [`Node`].

pub mod error;
pub mod ledger;
pub mod limiter;
pub mod metrics;
pub mod node;
pub mod pool;
pub mod sync;

pub use error::ComputeError;
pub use ledger::ResourceLedger;
pub use limiter::RateLimiter;
pub use metrics::NodeMetrics;
pub use node::{Node, NodeSpec, TaskOutcome};
pub use pool::{TaskHandle, ThreadPool};
pub use sync::ShutdownSignal;
