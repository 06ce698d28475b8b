use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use edgeplay_compute::{Node, ShutdownSignal};
use edgeplay_core::OutputConfig;
use serde::Serialize;
use tracing::{debug, error, info};

/// One sample (or per-tick aggregate) of the four recorded metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricRow {
    /// Queue length over speed.
    pub cpu: f64,
    /// Fraction of ledger capacity in use.
    pub ram: f64,
    /// Mean queue wait in ms.
    pub wait: f64,
    /// Reserved column, always 0.
    pub other: f64,
}

impl MetricRow {
    fn map(samples: &[MetricRow], f: impl Fn(&[f64]) -> f64) -> MetricRow {
        let column =
            |pick: fn(&MetricRow) -> f64| -> Vec<f64> { samples.iter().map(pick).collect() };
        MetricRow {
            cpu: f(&column(|r| r.cpu)),
            ram: f(&column(|r| r.ram)),
            wait: f(&column(|r| r.wait)),
            other: f(&column(|r| r.other)),
        }
    }
}

/// Cross-node mean, population variance and max, one row per tick.
#[derive(Debug, Clone, Default)]
pub struct ExperimentData {
    pub avg: Vec<MetricRow>,
    pub var: Vec<MetricRow>,
    pub max: Vec<MetricRow>,
}

impl ExperimentData {
    /// Aggregate one tick worth of per-node samples. Empty ticks are skipped.
    pub fn record_tick(&mut self, samples: &[MetricRow]) {
        if samples.is_empty() {
            return;
        }
        self.avg.push(MetricRow::map(samples, mean));
        self.var.push(MetricRow::map(samples, variance));
        self.max.push(MetricRow::map(samples, |xs| {
            xs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }));
    }

    pub fn ticks(&self) -> usize {
        self.avg.len()
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

// ── Monitor thread ───────────────────────────────────────────────────

/// Periodically samples every node, nudges its admission rate toward the
/// configured load band and accumulates [`ExperimentData`].
pub struct Monitor {
    signal: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<ExperimentData>>,
}

impl Monitor {
    pub fn start(nodes: Vec<Arc<Node>>, config: OutputConfig) -> io::Result<Self> {
        let signal = Arc::new(ShutdownSignal::new());
        let handle = {
            let signal = Arc::clone(&signal);
            thread::Builder::new()
                .name("monitor".into())
                .spawn(move || run(&nodes, &config, &signal))?
        };
        info!("monitor started");
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop sampling and hand back everything recorded so far.
    pub fn stop(mut self) -> ExperimentData {
        self.signal.trigger();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(data)) => {
                info!(ticks = data.ticks(), "monitor stopped");
                data
            }
            Some(Err(_)) => {
                error!("monitor thread panicked, experiment data lost");
                ExperimentData::default()
            }
            None => ExperimentData::default(),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.signal.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(nodes: &[Arc<Node>], config: &OutputConfig, signal: &ShutdownSignal) -> ExperimentData {
    let interval = Duration::from_millis(config.sample_interval_ms);
    let mut data = ExperimentData::default();

    while !signal.wait_timeout(interval) {
        let samples: Vec<MetricRow> = nodes.iter().map(|n| sample_node(n, config)).collect();
        data.record_tick(&samples);
        debug!(tick = data.ticks(), "monitor tick");
    }
    data
}

/// Read one node's metrics and apply load-band admission control.
pub fn sample_node(node: &Node, config: &OutputConfig) -> MetricRow {
    let load = node.load();
    if load >= config.high_load {
        node.reduce_qps();
    } else if load <= config.low_load {
        node.raise_qps();
    }

    MetricRow {
        cpu: load,
        ram: node.memory_utilization(),
        wait: node.average_wait_ms(),
        other: 0.0,
    }
}
