//! Cluster-level dispatch: picks one node per task under a pluggable
//! algorithm and maintains the smooth weighted round-robin queue.

pub mod algorithm;
pub mod dispatcher;
pub mod error;
pub mod statistics;
pub mod target;
pub mod weighted;

pub use algorithm::Algorithm;
pub use dispatcher::Dispatcher;
pub use error::BalanceError;
pub use statistics::{DispatchStatistics, NodeDispatchCount};
pub use target::DispatchTarget;
pub use weighted::{smooth_weighted_order, WeightedQueue};
