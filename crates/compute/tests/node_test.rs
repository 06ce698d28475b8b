//! Integration tests for a single simulated node: admission, ledger
//! accounting, background reclamation, weight tuning and shutdown order.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use edgeplay_compute::{ComputeError, Node, NodeSpec, TaskOutcome};
use edgeplay_core::{NodeConfig, PoolConfig, Task};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn pool_config() -> PoolConfig {
    PoolConfig {
        monitor_interval_ms: 20,
        ..PoolConfig::default()
    }
}

/// Fast admission, no tuner, reclamation effectively off.
fn quiet_config() -> NodeConfig {
    NodeConfig {
        default_qps: 1000,
        game_mode: false,
        reclaim_interval_ms: 60_000,
        ..NodeConfig::default()
    }
}

fn node(memory_mb: u64, config: &NodeConfig) -> Node {
    Node::new(1, NodeSpec::new(2, memory_mb), config, &pool_config()).unwrap()
}

#[test]
fn task_reserves_then_releases_a_fifth() {
    let node = node(1024, &quiet_config());
    let outcome = node.execute(Task::new(5, 20)).unwrap().wait().unwrap();

    assert_eq!(outcome, TaskOutcome::Completed);
    assert!(outcome.succeeded());
    // floor 10 + 20 reserved - 4 released
    assert_eq!(node.ledger().used(), 26);
    node.stop();
}

#[test]
fn compute_only_task_skips_the_ledger() {
    let node = node(1024, &quiet_config());
    let outcome = node.execute(Task::compute_only(5)).unwrap().wait().unwrap();

    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(node.ledger().used(), 10);
    node.stop();
}

#[test]
fn exhausted_memory_is_reported() {
    let node = node(100, &quiet_config());
    // 95 < 90 free is false
    let outcome = node.execute(Task::new(1, 95)).unwrap().wait().unwrap();

    assert_eq!(outcome, TaskOutcome::MemoryExhausted);
    assert!(!outcome.succeeded());
    // the 19MB release exceeds what is used and snaps back to the floor
    assert_eq!(node.ledger().used(), 10);
    node.stop();
}

#[test]
fn execute_tracks_average_task_time() {
    let node = node(1024, &quiet_config());
    let a = node.execute(Task::compute_only(10)).unwrap();
    let b = node.execute(Task::compute_only(30)).unwrap();
    a.wait().unwrap();
    b.wait().unwrap();

    assert_eq!(node.tasks_executed(), 2);
    assert_eq!(node.avg_task_time(), Duration::from_millis(20));
    node.stop();
}

#[test]
fn qps_steps_respect_the_floor() {
    let node = node(1024, &NodeConfig {
        default_qps: 12,
        qps_step: 5,
        min_qps: 5,
        game_mode: false,
        ..NodeConfig::default()
    });

    node.reduce_qps();
    assert_eq!(node.qps(), 7);
    node.reduce_qps();
    assert_eq!(node.qps(), 5);
    node.reduce_qps();
    assert_eq!(node.qps(), 5);

    node.raise_qps();
    node.raise_qps();
    assert_eq!(node.qps(), 15);
    node.stop();
}

#[test]
fn stop_drains_accepted_tasks_then_rejects() {
    let node = node(4096, &quiet_config());
    let handles: Vec<_> = (0..12)
        .map(|_| node.execute(Task::new(5, 10)).unwrap())
        .collect();

    node.stop();
    assert!(node.is_stopped());

    for handle in handles {
        assert!(handle.wait().is_ok());
    }
    assert!(matches!(
        node.execute(Task::compute_only(1)),
        Err(ComputeError::ShuttingDown)
    ));
}

#[test]
fn stop_does_not_wait_out_background_intervals() {
    let node = node(1024, &NodeConfig {
        game_mode: true,
        game_term_ms: 60_000,
        reclaim_interval_ms: 60_000,
        ..quiet_config()
    });

    let start = Instant::now();
    node.stop();
    assert!(start.elapsed() < Duration::from_secs(5));

    // second stop is a no-op
    node.stop();
}

#[test]
fn concurrent_stop_waits_for_the_first_to_finish() {
    let spec = NodeSpec::new(1, 4096);
    let node = Arc::new(Node::new(1, spec, &quiet_config(), &pool_config()).unwrap());
    for _ in 0..10 {
        node.execute(Task::new(10, 5)).unwrap();
    }

    let first = {
        let node = Arc::clone(&node);
        thread::spawn(move || node.stop())
    };
    thread::sleep(Duration::from_millis(20));

    // Each finished task leaves 4MB behind; all ten must be done.
    node.stop();
    assert_eq!(node.ledger().used(), 10 + 4 * 10);
    assert_eq!(node.pending(), 0);
    first.join().unwrap();
}

#[test]
fn execute_racing_stop_runs_each_accepted_task_once() {
    let node = Arc::new(node(1_000_000, &quiet_config()));
    let submitter = {
        let node = Arc::clone(&node);
        thread::spawn(move || {
            (0..300)
                .map(|_| node.execute(Task::new(1, 5)))
                .collect::<Vec<_>>()
        })
    };

    thread::sleep(Duration::from_millis(30));
    node.stop();
    let results = submitter.join().unwrap();

    let mut accepted = 0u64;
    for result in results {
        match result {
            Ok(handle) => {
                assert_eq!(handle.wait().unwrap(), TaskOutcome::Completed);
                accepted += 1;
            }
            Err(e) => assert!(matches!(e, ComputeError::ShuttingDown), "unexpected {}", e),
        }
    }
    assert!(accepted > 0);
    // Every accepted task reserved 5MB and handed back 1MB exactly once.
    assert_eq!(node.ledger().used(), 10 + 4 * accepted);
}

#[test]
fn zero_core_spec_falls_back_to_working_pool() {
    let node = Node::new(3, NodeSpec::new(0, 1024), &quiet_config(), &pool_config()).unwrap();
    assert_eq!(node.cores(), 2);
    assert_eq!(node.snapshot().cores, 2);

    let handle = node.execute(Task::compute_only(5)).unwrap();
    assert_eq!(handle.wait().unwrap(), TaskOutcome::Completed);
    node.stop();
}

#[test]
fn reclamation_loop_frees_memory() {
    let node = node(1024, &NodeConfig {
        reclaim_interval_ms: 20,
        reclaim_size_mb: 30,
        ..quiet_config()
    });
    node.ledger().reserve(100).unwrap();
    assert_eq!(node.ledger().used(), 110);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(node.ledger().used(), 10);
    node.stop();
}

#[test]
fn tuner_keeps_weight_in_range() {
    let node = node(1024, &NodeConfig {
        game_mode: true,
        game_term_ms: 20,
        max_weight: 4,
        ..quiet_config()
    });
    node.set_weight(99);

    thread::sleep(Duration::from_millis(200));
    let weight = node.weight();
    assert!((1..=4).contains(&weight), "weight {} out of range", weight);
    node.stop();
}

#[test]
fn snapshot_reports_the_telemetry_surface() {
    let node = node(2048, &quiet_config());
    node.set_weight(3);
    let m = node.snapshot();

    assert_eq!(m.id, 1);
    assert_eq!(m.cores, 2);
    assert_eq!(m.weight, 3);
    assert_eq!(m.qps, 1000);
    assert_eq!(m.memory_capacity_mb, 2048);
    assert!(m.block_rate >= 0.01);
    assert!(m.memory_utilization >= 0.01);
    assert!(node.status_line().starts_with("server[1]"));
    node.stop();
}

#[test]
fn random_spec_stays_in_bounds() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let spec = NodeSpec::random(&mut rng);
        assert!((1..=8).contains(&spec.cores));
        assert!((512..=10240).contains(&spec.memory_mb));
    }
}
