//! Integration tests for dispatching real simulated nodes: every task
//! routed through the dispatcher lands on, and completes on, a node.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use edgeplay_balancer::{Algorithm, Dispatcher};
use edgeplay_compute::{Node, NodeSpec, TaskOutcome};
use edgeplay_core::{NodeConfig, PoolConfig, Task};

fn cluster(n: usize, config: &NodeConfig) -> Vec<Arc<Node>> {
    let pool = PoolConfig {
        monitor_interval_ms: 20,
        ..PoolConfig::default()
    };
    (0..n)
        .map(|id| Arc::new(Node::new(id, NodeSpec::new(2, 2048), config, &pool).unwrap()))
        .collect()
}

fn quiet() -> NodeConfig {
    NodeConfig {
        default_qps: 1000,
        game_mode: false,
        reclaim_interval_ms: 60_000,
        ..NodeConfig::default()
    }
}

fn stop_all(nodes: &[Arc<Node>]) {
    for node in nodes {
        node.stop();
    }
}

#[test]
fn round_robin_spreads_tasks_evenly() {
    let nodes = cluster(3, &quiet());
    let dispatcher = Dispatcher::new(nodes.clone(), Algorithm::RoundRobin).unwrap();

    let handles: Vec<_> = (0..30)
        .map(|_| {
            dispatcher
                .select_one_server()
                .execute(Task::new(1, 10))
                .unwrap()
        })
        .collect();
    for h in handles {
        assert_eq!(h.wait().unwrap(), TaskOutcome::Completed);
    }

    assert_eq!(dispatcher.dispatch_counts(), vec![10, 10, 10]);
    for node in &nodes {
        assert_eq!(node.tasks_executed(), 10);
    }
    stop_all(&nodes);
}

#[test]
fn weighted_follows_node_weights() {
    let nodes = cluster(3, &quiet());
    nodes[0].set_weight(4);
    nodes[1].set_weight(2);
    nodes[2].set_weight(1);

    let dispatcher = Dispatcher::new(nodes.clone(), Algorithm::Weighted).unwrap();
    for _ in 0..7 {
        dispatcher.select_one_server();
    }
    assert_eq!(dispatcher.dispatch_counts(), vec![4, 2, 1]);
    stop_all(&nodes);
}

#[test]
fn tuned_weights_feed_the_next_round() {
    let config = NodeConfig {
        game_mode: true,
        game_term_ms: 10,
        max_weight: 4,
        ..quiet()
    };
    let nodes = cluster(2, &config);
    let dispatcher = Dispatcher::new(nodes.clone(), Algorithm::RoundRobin).unwrap();

    thread::sleep(Duration::from_millis(60));
    dispatcher.set_algorithm(Algorithm::Weighted);
    dispatcher.wait_for_rebuild();

    let round = dispatcher.weighted_order();
    assert!(!round.is_empty());
    assert!(round.len() <= 8);
    stop_all(&nodes);
}

#[test]
fn concurrent_clients_all_get_served() {
    let nodes = cluster(4, &quiet());
    let dispatcher = Arc::new(
        Dispatcher::with_seed(nodes.clone(), Algorithm::PowerOfTwoChoices, 3).unwrap(),
    );

    let clients: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                let handles: Vec<_> = (0..10)
                    .map(|_| {
                        dispatcher
                            .select_one_server()
                            .execute(Task::compute_only(1))
                            .unwrap()
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.wait())
                    .filter(|r| matches!(r, Ok(TaskOutcome::Completed)))
                    .count()
            })
        })
        .collect();
    let mut accepted = 0;
    for c in clients {
        accepted += c.join().unwrap();
    }

    assert_eq!(accepted, 40);
    assert_eq!(dispatcher.statistics().total, 40);
    stop_all(&nodes);
}
