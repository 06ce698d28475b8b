use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::sync::lock;

#[derive(Debug)]
struct LimiterState {
    qps: u32,
    /// Slot handed to the most recent caller.
    last_slot: Option<Instant>,
    /// Earliest instant the next caller may pass.
    next_slot: Option<Instant>,
}

/// Paces callers to at most `qps` passes per second.
///
/// Each pass books the next free slot, spaced `1s / qps` apart, then sleeps
/// until its slot arrives. Idle time is not banked, so there are no bursts.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(qps: u32) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                qps: sanitize(qps),
                last_slot: None,
                next_slot: None,
            }),
        }
    }

    /// Block until the caller is admitted. Returns how long it waited.
    pub fn pass(&self) -> Duration {
        let slot = {
            let mut state = lock(&self.state);
            let now = Instant::now();
            let interval = Duration::from_secs(1) / state.qps;
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.last_slot = Some(slot);
            state.next_slot = Some(slot + interval);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        wait
    }

    /// Change the ceiling for subsequent passes.
    ///
    /// The slot already booked for the next caller is re-spaced from the
    /// last pass at the new interval.
    pub fn set_qps(&self, qps: u32) {
        let mut state = lock(&self.state);
        state.qps = sanitize(qps);
        let interval = Duration::from_secs(1) / state.qps;
        state.next_slot = state.last_slot.map(|last| last + interval);
    }

    pub fn qps(&self) -> u32 {
        lock(&self.state).qps
    }
}

fn sanitize(qps: u32) -> u32 {
    if qps == 0 {
        warn!("rate limit of 0 qps would block forever, using 1");
        1
    } else {
        qps
    }
}
