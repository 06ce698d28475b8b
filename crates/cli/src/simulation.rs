use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use edgeplay_balancer::{Algorithm, Dispatcher};
use edgeplay_compute::{ComputeError, Node, NodeSpec, TaskOutcome};
use edgeplay_core::SimConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::monitor::{ExperimentData, Monitor};
use crate::recorder::{RunSummary, TaskTally};
use crate::workload::TaskGenerator;

/// Result of one complete run, ready for the recorder.
pub struct RunReport {
    pub data: ExperimentData,
    pub summary: RunSummary,
}

/// Build the cluster, drive it with the configured clients and tear it
/// down again in dependency order: clients, monitor, nodes.
pub fn run(config: &SimConfig) -> Result<RunReport> {
    let algorithm: Algorithm = config.cluster.algorithm.parse()?;
    let seed = config.cluster.seed;

    let nodes = start_nodes(config, seed)?;
    let dispatcher = Arc::new(match seed {
        Some(seed) => Dispatcher::with_seed(nodes.clone(), algorithm, seed)?,
        None => Dispatcher::new(nodes.clone(), algorithm)?,
    });

    let monitor = Monitor::start(nodes.clone(), config.output.clone())
        .context("failed to start monitor")?;
    let started_at = Utc::now();

    let tasks = run_clients(config, &dispatcher);

    let data = monitor.stop();
    for node in &nodes {
        node.print_status();
        node.stop();
    }
    let finished_at = Utc::now();
    let tasks = tasks?;

    dispatcher.print_statistics();
    info!(
        submitted = tasks.submitted,
        completed = tasks.completed,
        memory_exhausted = tasks.memory_exhausted,
        failed = tasks.failed,
        "run finished"
    );

    let summary = RunSummary {
        algorithm: algorithm.to_string(),
        started_at,
        finished_at,
        elapsed_ms: (finished_at - started_at).num_milliseconds(),
        ticks: data.ticks(),
        tasks,
        dispatch: dispatcher.statistics(),
        nodes: nodes.iter().map(|n| n.snapshot()).collect(),
    };

    Ok(RunReport { data, summary })
}

fn start_nodes(config: &SimConfig, seed: Option<u64>) -> Result<Vec<Arc<Node>>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    (0..config.cluster.nodes)
        .map(|id| {
            let spec = NodeSpec::random(&mut rng);
            Node::new(id, spec, &config.node, &config.pool)
                .map(Arc::new)
                .with_context(|| format!("failed to start node {}", id))
        })
        .collect()
}

fn run_clients(config: &SimConfig, dispatcher: &Arc<Dispatcher>) -> Result<TaskTally> {
    let requests = config.cluster.requests_per_client;
    let mut clients = Vec::with_capacity(config.cluster.clients);

    for client in 0..config.cluster.clients {
        let dispatcher = Arc::clone(dispatcher);
        let generator = TaskGenerator::new(
            config.workload.clone(),
            config.cluster.seed.map(|s| s.wrapping_add(client as u64 + 1)),
        );
        let handle = thread::Builder::new()
            .name(format!("client-{}", client))
            .spawn(move || run_client(client, &dispatcher, generator, requests))
            .with_context(|| format!("failed to spawn client {}", client))?;
        clients.push(handle);
    }

    let mut total = TaskTally::default();
    for handle in clients {
        let tally = handle
            .join()
            .map_err(|_| anyhow!("client thread panicked"))?;
        total.merge(tally);
    }
    Ok(total)
}

/// Send `requests` tasks, then wait for every accepted one to finish.
fn run_client(
    client: usize,
    dispatcher: &Dispatcher,
    mut generator: TaskGenerator,
    requests: usize,
) -> TaskTally {
    let mut tally = TaskTally::default();
    let mut pending = Vec::with_capacity(requests);

    for _ in 0..requests {
        let node = dispatcher.select_one_server();
        tally.submitted += 1;
        match node.execute(generator.next_task()) {
            Ok(handle) => pending.push(handle),
            Err(e) => {
                warn!(client, node = node.id(), error = %e, "task refused");
                tally.failed += 1;
            }
        }
    }

    for handle in pending {
        match handle.wait() {
            Ok(TaskOutcome::Completed) => tally.completed += 1,
            Ok(TaskOutcome::MemoryExhausted) => tally.memory_exhausted += 1,
            Err(ComputeError::TaskPanicked(msg)) => {
                warn!(client, panic = %msg, "task panicked");
                tally.failed += 1;
            }
            Err(e) => {
                warn!(client, error = %e, "task lost");
                tally.failed += 1;
            }
        }
    }
    tally
}
