use std::sync::PoisonError;

use tracing::trace;

use crate::sync::lock;

use super::core::Shared;

/// Take jobs until shutdown has been requested and the queue is empty.
pub(super) fn run_worker(shared: &Shared) {
    loop {
        let (job, enqueued_at) = {
            let state = lock(&shared.queue);
            let mut state = shared
                .available
                .wait_while(state, |s| !s.shutdown && s.jobs.is_empty())
                .unwrap_or_else(PoisonError::into_inner);

            match (state.jobs.pop_front(), state.enqueued_at.pop_front()) {
                (Some(job), Some(enqueued_at)) => (job, enqueued_at),
                // Woken with nothing left: only happens once shut down.
                _ => return,
            }
        };

        shared
            .telemetry
            .record_dequeue(enqueued_at.elapsed(), shared.latency_ratio);
        job();
        shared.telemetry.record_completion();
    }
}

/// Sample telemetry once per tick; exit once shut down and drained.
pub(super) fn run_monitor(shared: &Shared) {
    loop {
        let state = lock(&shared.queue);
        if state.shutdown && state.jobs.is_empty() {
            return;
        }

        let (state, _) = if state.shutdown {
            // Draining: keep ticking until the workers empty the queue.
            shared.tick.wait_timeout(state, shared.monitor_interval)
        } else {
            shared
                .tick
                .wait_timeout_while(state, shared.monitor_interval, |s| !s.shutdown)
        }
        .unwrap_or_else(PoisonError::into_inner);

        if state.shutdown && state.jobs.is_empty() {
            return;
        }
        let queue_len = state.jobs.len();
        drop(state);

        shared.telemetry.sample(queue_len);
        trace!(queue_len, "pool telemetry sampled");
    }
}
