use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SimError;

/// Prefix for every environment override.
const ENV_PREFIX: &str = "EDGEPLAY";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let full = format!("{}_{}", ENV_PREFIX, key);
    let raw = lookup(&full)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = %full, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Full configuration of one simulation run.
///
/// Precedence, lowest first: built-in defaults, TOML file, environment
/// (`EDGEPLAY_*`), then whatever the binary layers on from its flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SimError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from an optional file, apply environment overrides and
    /// correct impossible values. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SimError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                debug!(path = %p.display(), "loading config file");
                Self::from_file(p)?
            }
            Some(p) => {
                debug!(path = %p.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate();
        Ok(config)
    }

    /// Apply `EDGEPLAY_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(env_opt);
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_override::<String>(&lookup, "ALGORITHM") {
            self.cluster.algorithm = v;
        }
        if let Some(v) = parse_override(&lookup, "NODES") {
            self.cluster.nodes = v;
        }
        if let Some(v) = parse_override(&lookup, "CLIENTS") {
            self.cluster.clients = v;
        }
        if let Some(v) = parse_override(&lookup, "REQUESTS") {
            self.cluster.requests_per_client = v;
        }
        if let Some(v) = parse_override(&lookup, "SEED") {
            self.cluster.seed = Some(v);
        }
        if let Some(v) = parse_override(&lookup, "DEFAULT_QPS") {
            self.node.default_qps = v;
        }
        if let Some(v) = parse_override(&lookup, "GAME_MODE") {
            self.node.game_mode = v;
        }
        if let Some(v) = parse_override(&lookup, "GC_INTERVAL_MS") {
            self.node.reclaim_interval_ms = v;
        }
        if let Some(v) = parse_override::<String>(&lookup, "DATA_DIR") {
            self.output.data_dir = PathBuf::from(v);
        }
    }

    /// Replace impossible values with safe defaults, logging each correction.
    pub fn validate(&mut self) {
        self.pool.validate();
        self.node.validate();
        self.cluster.validate();
        self.workload.validate();
        self.output.validate();
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("config loaded:");
        tracing::info!(
            "  cluster:   algorithm={}, nodes={}, clients={}, requests={}",
            self.cluster.algorithm,
            self.cluster.nodes,
            self.cluster.clients,
            self.cluster.requests_per_client
        );
        tracing::info!(
            "  node:      qps={} (step {}, floor {}), game_mode={}",
            self.node.default_qps,
            self.node.qps_step,
            self.node.min_qps,
            self.node.game_mode
        );
        tracing::info!(
            "  pool:      latency_ratio={}, monitor_interval={}ms",
            self.pool.latency_ratio,
            self.pool.monitor_interval_ms
        );
        tracing::info!("  output:    data_dir={}", self.output.data_dir.display());
    }
}

// ── Worker pool ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// A dequeued task counts as blocked when its queue wait is at least
    /// this fraction of the average task duration.
    #[serde(default = "default_latency_ratio")]
    pub latency_ratio: f64,
    /// Average task duration assumed before any task has been recorded.
    #[serde(default = "default_initial_avg_task_ms")]
    pub initial_avg_task_ms: u64,
    /// Telemetry sampling period.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Upper bound on worker threads per pool.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Thread count substituted for an impossible request.
    #[serde(default = "default_fallback_threads")]
    pub fallback_threads: usize,
}

fn default_latency_ratio() -> f64 { 0.8 }
fn default_initial_avg_task_ms() -> u64 { 50 }
fn default_monitor_interval_ms() -> u64 { 1000 }
fn default_max_threads() -> usize { 64 }
fn default_fallback_threads() -> usize { 2 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            latency_ratio: default_latency_ratio(),
            initial_avg_task_ms: default_initial_avg_task_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            max_threads: default_max_threads(),
            fallback_threads: default_fallback_threads(),
        }
    }
}

impl PoolConfig {
    fn validate(&mut self) {
        if !(self.latency_ratio > 0.0 && self.latency_ratio <= 1.0) {
            warn!(value = self.latency_ratio, "pool.latency_ratio out of (0, 1], using 0.8");
            self.latency_ratio = default_latency_ratio();
        }
        if self.monitor_interval_ms == 0 {
            warn!("pool.monitor_interval_ms is 0, using 1000");
            self.monitor_interval_ms = default_monitor_interval_ms();
        }
        if self.max_threads < 2 {
            warn!(value = self.max_threads, "pool.max_threads below 2, using 64");
            self.max_threads = default_max_threads();
        }
        if self.fallback_threads == 0 || self.fallback_threads > self.max_threads {
            warn!(value = self.fallback_threads, "pool.fallback_threads invalid, using 2");
            self.fallback_threads = default_fallback_threads().min(self.max_threads);
        }
    }

    /// Clamp a requested worker count into `1..=max_threads`, falling back
    /// to `fallback_threads` when the request is impossible.
    pub fn resolve_threads(&self, requested: usize) -> usize {
        if requested == 0 || requested > self.max_threads {
            warn!(
                requested,
                fallback = self.fallback_threads,
                "invalid worker thread count, falling back"
            );
            self.fallback_threads
        } else {
            requested
        }
    }

    /// Core count for a node whose pool also hosts one reserved worker.
    ///
    /// The result is at least 1 and leaves room for the extra thread under
    /// `max_threads`; an impossible request takes `fallback_threads`.
    pub fn resolve_cores(&self, requested: usize) -> usize {
        let limit = self.max_threads.saturating_sub(1).max(1);
        if requested == 0 || requested > limit {
            let cores = self.fallback_threads.min(limit);
            warn!(requested, cores, "invalid core count, falling back");
            cores
        } else {
            requested
        }
    }
}

// ── Node ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Admission ceiling a fresh node starts with (requests/sec).
    #[serde(default = "default_qps")]
    pub default_qps: u32,
    /// Amount added or removed by one raise/reduce step.
    #[serde(default = "default_qps_step")]
    pub qps_step: u32,
    /// Reduce is a no-op at or below this ceiling.
    #[serde(default = "default_min_qps")]
    pub min_qps: u32,
    /// Period of the local reclamation loop.
    #[serde(default = "default_reclaim_interval_ms")]
    pub reclaim_interval_ms: u64,
    /// Memory released per reclamation cycle (MB).
    #[serde(default = "default_reclaim_size_mb")]
    pub reclaim_size_mb: u64,
    /// Baseline ledger usage and the value an over-release resets to (MB).
    #[serde(default = "default_ledger_floor_mb")]
    pub ledger_floor_mb: u64,
    /// Run the node-owned weight tuner.
    #[serde(default = "default_game_mode")]
    pub game_mode: bool,
    /// Period of the weight tuner.
    #[serde(default = "default_game_term_ms")]
    pub game_term_ms: u64,
    /// Largest weight the tuner may assign.
    #[serde(default = "default_max_weight")]
    pub max_weight: u32,
}

fn default_qps() -> u32 { 50 }
fn default_qps_step() -> u32 { 5 }
fn default_min_qps() -> u32 { 5 }
fn default_reclaim_interval_ms() -> u64 { 1000 }
fn default_reclaim_size_mb() -> u64 { 30 }
fn default_ledger_floor_mb() -> u64 { 10 }
fn default_game_mode() -> bool { true }
fn default_game_term_ms() -> u64 { 1000 }
fn default_max_weight() -> u32 { 32 }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            default_qps: default_qps(),
            qps_step: default_qps_step(),
            min_qps: default_min_qps(),
            reclaim_interval_ms: default_reclaim_interval_ms(),
            reclaim_size_mb: default_reclaim_size_mb(),
            ledger_floor_mb: default_ledger_floor_mb(),
            game_mode: default_game_mode(),
            game_term_ms: default_game_term_ms(),
            max_weight: default_max_weight(),
        }
    }
}

impl NodeConfig {
    fn validate(&mut self) {
        if self.min_qps == 0 {
            warn!("node.min_qps is 0, using 1");
            self.min_qps = 1;
        }
        if self.qps_step == 0 {
            warn!("node.qps_step is 0, using 5");
            self.qps_step = default_qps_step();
        }
        if self.default_qps < self.min_qps {
            warn!(
                value = self.default_qps,
                floor = self.min_qps,
                "node.default_qps below floor, raising"
            );
            self.default_qps = self.min_qps;
        }
        if self.reclaim_interval_ms == 0 {
            warn!("node.reclaim_interval_ms is 0, using 1000");
            self.reclaim_interval_ms = default_reclaim_interval_ms();
        }
        if self.game_term_ms == 0 {
            warn!("node.game_term_ms is 0, using 1000");
            self.game_term_ms = default_game_term_ms();
        }
        if self.max_weight == 0 {
            warn!("node.max_weight is 0, using 1");
            self.max_weight = 1;
        }
    }
}

// ── Cluster / harness ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Dispatch algorithm name (`random`, `round`, `game`, `power`).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    #[serde(default = "default_clients")]
    pub clients: usize,
    #[serde(default = "default_requests")]
    pub requests_per_client: usize,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_algorithm() -> String { "random".to_string() }
fn default_nodes() -> usize { 3 }
fn default_clients() -> usize { 4 }
fn default_requests() -> usize { 100 }

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            nodes: default_nodes(),
            clients: default_clients(),
            requests_per_client: default_requests(),
            seed: None,
        }
    }
}

impl ClusterConfig {
    fn validate(&mut self) {
        if self.nodes == 0 {
            warn!("cluster.nodes is 0, using 3");
            self.nodes = default_nodes();
        }
        if self.clients == 0 {
            warn!("cluster.clients is 0, using 1");
            self.clients = 1;
        }
    }
}

// ── Workload ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_min_time_ms")]
    pub min_time_ms: u64,
    #[serde(default = "default_max_time_ms")]
    pub max_time_ms: u64,
    #[serde(default = "default_min_storage_mb")]
    pub min_storage_mb: u64,
    #[serde(default = "default_max_storage_mb")]
    pub max_storage_mb: u64,
}

fn default_min_time_ms() -> u64 { 50 }
fn default_max_time_ms() -> u64 { 150 }
fn default_min_storage_mb() -> u64 { 10 }
fn default_max_storage_mb() -> u64 { 50 }

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            min_time_ms: default_min_time_ms(),
            max_time_ms: default_max_time_ms(),
            min_storage_mb: default_min_storage_mb(),
            max_storage_mb: default_max_storage_mb(),
        }
    }
}

impl WorkloadConfig {
    fn validate(&mut self) {
        if self.min_time_ms > self.max_time_ms {
            warn!("workload time range inverted, swapping bounds");
            std::mem::swap(&mut self.min_time_ms, &mut self.max_time_ms);
        }
        if self.min_storage_mb > self.max_storage_mb {
            warn!("workload storage range inverted, swapping bounds");
            std::mem::swap(&mut self.min_storage_mb, &mut self.max_storage_mb);
        }
    }
}

// ── Output / monitor ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for experiment data files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Monitor sampling period.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Load at or above which the monitor lowers a node's QPS.
    #[serde(default = "default_high_load")]
    pub high_load: f64,
    /// Load at or below which the monitor raises a node's QPS.
    #[serde(default = "default_low_load")]
    pub low_load: f64,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_sample_interval_ms() -> u64 { 1000 }
fn default_high_load() -> f64 { 10.0 }
fn default_low_load() -> f64 { 1.0 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sample_interval_ms: default_sample_interval_ms(),
            high_load: default_high_load(),
            low_load: default_low_load(),
        }
    }
}

impl OutputConfig {
    fn validate(&mut self) {
        if self.sample_interval_ms == 0 {
            warn!("output.sample_interval_ms is 0, using 1000");
            self.sample_interval_ms = default_sample_interval_ms();
        }
        if self.low_load > self.high_load {
            warn!("output load band inverted, swapping bounds");
            std::mem::swap(&mut self.low_load, &mut self.high_load);
        }
    }
}
