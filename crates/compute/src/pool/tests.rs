use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use edgeplay_core::PoolConfig;

use crate::error::ComputeError;
use crate::pool::ThreadPool;

fn fast_config() -> PoolConfig {
    PoolConfig {
        monitor_interval_ms: 20,
        ..PoolConfig::default()
    }
}

#[test]
fn submit_returns_result() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    let handle = pool.submit(|| 21 * 2).unwrap();
    assert_eq!(handle.wait().unwrap(), 42);
    pool.join_all();
}

#[test]
fn invalid_thread_count_falls_back() {
    let pool = ThreadPool::new(0, &fast_config()).unwrap();
    assert_eq!(pool.thread_count(), 2);

    let pool = ThreadPool::new(10_000, &fast_config()).unwrap();
    assert_eq!(pool.thread_count(), 2);
}

#[test]
fn submit_after_shutdown_is_rejected() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    pool.join_all();
    assert!(pool.is_shutdown());

    let err = pool.submit(|| ()).unwrap_err();
    assert!(matches!(err, ComputeError::ShuttingDown));
}

#[test]
fn join_all_is_idempotent() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    pool.join_all();
    pool.join_all();
}

#[test]
fn concurrent_join_waits_for_the_drain() {
    let pool = Arc::new(ThreadPool::new(1, &fast_config()).unwrap());
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let ran = Arc::clone(&ran);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(10));
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    let first = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.join_all())
    };
    thread::sleep(Duration::from_millis(20));

    // The queue takes ~100ms to drain; this call must not return before it.
    pool.join_all();
    assert_eq!(ran.load(Ordering::SeqCst), 10);
    assert_eq!(pool.pending(), 0);
    first.join().unwrap();
}

#[test]
fn queued_work_drains_on_shutdown() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        let ran = Arc::clone(&ran);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(2));
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.join_all();

    assert_eq!(ran.load(Ordering::SeqCst), 20);
    assert_eq!(pool.pending(), 0);
}

#[test]
fn every_accepted_task_runs_once_under_concurrent_stop() {
    let pool = Arc::new(ThreadPool::new(4, &fast_config()).unwrap());
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..500).map(|_| AtomicUsize::new(0)).collect());
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let start = Arc::new(Barrier::new(2));

    let submitter = {
        let pool = Arc::clone(&pool);
        let runs = Arc::clone(&runs);
        let accepted = Arc::clone(&accepted);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for i in 0..500 {
                let runs = Arc::clone(&runs);
                if pool
                    .submit(move || {
                        runs[i].fetch_add(1, Ordering::SeqCst);
                    })
                    .is_ok()
                {
                    accepted.lock().unwrap().push(i);
                }
            }
        })
    };

    start.wait();
    thread::sleep(Duration::from_millis(1));
    pool.join_all();
    submitter.join().unwrap();

    let accepted = accepted.lock().unwrap();
    for (i, count) in runs.iter().enumerate() {
        let expected = usize::from(accepted.contains(&i));
        assert_eq!(count.load(Ordering::SeqCst), expected, "task {} ran wrong number of times", i);
    }
}

#[test]
fn dequeue_is_fifo_with_single_worker() {
    let pool = ThreadPool::new(1, &fast_config()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    // Hold the only worker so everything below queues up first.
    let gate = Arc::new(Barrier::new(2));
    {
        let gate = Arc::clone(&gate);
        pool.submit(move || {
            gate.wait();
        })
        .unwrap();
    }
    for i in 0..10 {
        let order = Arc::clone(&order);
        pool.submit(move || order.lock().unwrap().push(i)).unwrap();
    }
    gate.wait();
    pool.join_all();

    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn panicking_task_is_reported_not_propagated() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    let handle = pool.submit(|| -> u32 { panic!("boom") }).unwrap();

    match handle.wait() {
        Err(ComputeError::TaskPanicked(msg)) => assert!(msg.contains("boom")),
        other => panic!("expected TaskPanicked, got {:?}", other),
    }

    // The worker survives.
    assert_eq!(pool.submit(|| 7).unwrap().wait().unwrap(), 7);
}

#[test]
fn getters_have_defaults_before_first_tick() {
    let config = PoolConfig {
        monitor_interval_ms: 60_000,
        ..PoolConfig::default()
    };
    let pool = ThreadPool::new(2, &config).unwrap();

    assert_eq!(pool.current_speed(), 1.0);
    assert_eq!(pool.task_queue_size(), 1.0);
    assert_eq!(pool.load(), 0.0);
    assert_eq!(pool.block_rate(), 0.01);
    assert_eq!(pool.instant_load(), 0.0);

    // Shutdown wakes the monitor instead of waiting out the tick.
    pool.join_all();
}

#[test]
fn monitor_records_throughput() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    let handles: Vec<_> = (0..10).map(|_| pool.submit(|| ()).unwrap()).collect();
    for h in handles {
        h.wait().unwrap();
    }
    thread::sleep(Duration::from_millis(100));

    assert!(pool.current_speed() >= 1.0);
    assert!(pool.task_queue_size() >= 2.0);
    pool.join_all();
}

#[test]
fn average_task_time_sets_block_threshold() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    assert_eq!(pool.blocked_threshold(), Duration::from_millis(40));

    pool.set_avg_task_time(Duration::from_millis(200));
    assert_eq!(pool.avg_task_time(), Duration::from_millis(200));
    assert_eq!(pool.blocked_threshold(), Duration::from_millis(160));
}

#[test]
fn power_starts_from_thread_count() {
    let config = PoolConfig {
        monitor_interval_ms: 60_000,
        ..PoolConfig::default()
    };
    let pool = ThreadPool::new(4, &config).unwrap();
    let expected = 0.37 * 4.0 + 0.63 * 1.0;
    assert!((pool.power() - expected).abs() < 1e-9);
}

#[tokio::test]
async fn handle_can_be_awaited() {
    let pool = ThreadPool::new(2, &fast_config()).unwrap();
    let handle = pool.submit(|| "done").unwrap();
    assert_eq!(handle.await.unwrap(), "done");
}
