pub mod config;
pub mod error;
pub mod task;

pub use config::{
    ClusterConfig, NodeConfig, OutputConfig, PoolConfig, SimConfig, WorkloadConfig,
};
pub use error::*;
pub use task::Task;
