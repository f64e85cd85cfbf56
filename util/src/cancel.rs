//! Cooperative cancellation token
//!
//! A [`CancelToken`] is shared between a controlling thread and any number of worker threads. The
//! workers sleep through [`CancelToken::sleep`], which returns early as soon as the token is
//! cancelled, so cancelling never has to wait for a settle delay or a control tick to run out.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A clonable cancellation flag whose sleeps wake up on cancellation.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token, waking every thread sleeping on it.
    pub fn cancel(&self) {
        let (_, cvar) = &*self.inner;
        *self.flag() = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Sleep for the given duration or until the token is cancelled.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was (or already is)
    /// cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);

        !*guard
    }

    /// Sleep for a number of milliseconds, see [`CancelToken::sleep`].
    pub fn sleep_ms(&self, ms: u64) -> bool {
        self.sleep(Duration::from_millis(ms))
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_sleep_runs_to_completion() {
        let token = CancelToken::new();

        let start = Instant::now();
        assert!(token.sleep_ms(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancelToken::new();
        let remote = token.clone();

        let start = Instant::now();
        let jh = thread::spawn(move || remote.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert_eq!(jh.join().unwrap(), false);
        assert!(start.elapsed() < Duration::from_secs(5));

        // Once cancelled sleeps return immediately
        assert!(!token.sleep(Duration::from_secs(30)));
    }
}
