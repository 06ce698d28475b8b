use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Everything guarded in this crate is either a heuristic or is mutated
/// in a single step, so a poisoned value is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot stop flag that sleeping loops can wait on.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.
    pub fn trigger(&self) {
        *lock(&self.triggered) = true;
        self.condvar.notify_all();
    }

    /// Block until triggered; returns at once if it already was.
    pub fn wait(&self) {
        let guard = lock(&self.triggered);
        let _guard = self
            .condvar
            .wait_while(guard, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Sleep for `timeout` or until triggered. Returns whether the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = lock(&self.triggered);
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[test]
    fn wait_times_out_when_not_triggered() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn wait_returns_once_triggered() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.wait())
        };
        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();
        waiter.join().unwrap();

        // already triggered: no blocking
        signal.wait();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }

    #[test]
    fn trigger_wakes_waiter_early() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let start = Instant::now();
                let fired = signal.wait_timeout(Duration::from_secs(10));
                (fired, start.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();

        let (fired, elapsed) = waiter.join().unwrap();
        assert!(fired);
        assert!(elapsed < Duration::from_secs(5));
    }
}
