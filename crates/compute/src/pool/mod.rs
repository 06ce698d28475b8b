//! Fixed-size worker pool with self-monitoring telemetry.
//!
//! Split into focused submodules:
//! - `core`: ThreadPool struct, construction, submission, shutdown and getters
//! - `worker`: worker and monitor thread routines
//! - `telemetry`: rolling windows, counters and the power estimate
//! - `handle`: the per-task result handle returned by `submit`

mod core;
mod handle;
mod telemetry;
mod worker;
#[cfg(test)]
mod tests;

pub use self::core::ThreadPool;
pub use self::handle::TaskHandle;
pub use self::telemetry::{RollingWindow, WINDOW_DEPTH};
