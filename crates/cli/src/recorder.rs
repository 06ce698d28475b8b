use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use edgeplay_balancer::DispatchStatistics;
use edgeplay_compute::NodeMetrics;
use serde::Serialize;
use tracing::info;

use crate::monitor::{ExperimentData, MetricRow};

/// Task outcomes as seen by the clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskTally {
    pub submitted: u64,
    pub completed: u64,
    pub memory_exhausted: u64,
    /// Refused at admission or lost on the worker.
    pub failed: u64,
}

impl TaskTally {
    pub fn merge(&mut self, other: TaskTally) {
        self.submitted += other.submitted;
        self.completed += other.completed;
        self.memory_exhausted += other.memory_exhausted;
        self.failed += other.failed;
    }
}

/// Everything about one run that is not a per-tick series.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub algorithm: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub ticks: usize,
    pub tasks: TaskTally,
    pub dispatch: DispatchStatistics,
    pub nodes: Vec<NodeMetrics>,
}

/// Paths written by [`save`].
#[derive(Debug, Clone)]
pub struct ExperimentFiles {
    pub avg: PathBuf,
    pub var: PathBuf,
    pub max: PathBuf,
    pub summary: PathBuf,
}

/// Write `<algorithm>.{avg,var,max}.txt` and `<algorithm>.summary.json`
/// into `dir`, replacing earlier runs of the same algorithm.
pub fn save(dir: &Path, data: &ExperimentData, summary: &RunSummary) -> Result<ExperimentFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;

    let stem = &summary.algorithm;
    let files = ExperimentFiles {
        avg: dir.join(format!("{}.avg.txt", stem)),
        var: dir.join(format!("{}.var.txt", stem)),
        max: dir.join(format!("{}.max.txt", stem)),
        summary: dir.join(format!("{}.summary.json", stem)),
    };

    write_series(&files.avg, "avg", &data.avg)?;
    write_series(&files.var, "var", &data.var)?;
    write_series(&files.max, "max", &data.max)?;

    let json = serde_json::to_string_pretty(summary).context("failed to serialize run summary")?;
    fs::write(&files.summary, json)
        .with_context(|| format!("failed to write {}", files.summary.display()))?;

    info!(
        dir = %dir.display(),
        algorithm = %summary.algorithm,
        ticks = data.ticks(),
        "experiment data saved"
    );
    Ok(files)
}

fn write_series(path: &Path, kind: &str, rows: &[MetricRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    wtr.write_record([
        format!("{}_cpu", kind),
        format!("{}_ram", kind),
        format!("{}_wait_ms", kind),
        format!("{}_other", kind),
    ])?;
    for row in rows {
        wtr.write_record([
            row.cpu.to_string(),
            row.ram.to_string(),
            row.wait.to_string(),
            row.other.to_string(),
        ])?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}
