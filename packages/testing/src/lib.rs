#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing code that runs on background threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::time::{Duration, Instant};
use std::{env, fmt, mem, panic, thread};

/// How long a test wrapped in [`with_watchdog()`] may run before it is declared hung.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// How often [`wait_until()`] re-evaluates its predicate.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runs a test body on a separate thread and fails the test if it does not finish within
/// [`WATCHDOG_TIMEOUT`].
///
/// Tests that coordinate with worker threads can hang forever on a bug. This turns such a hang
/// into a test failure. Panics in the test body propagate to the caller unchanged.
///
/// Setting the `MUTATION_TESTING` environment variable to `1` disables the watchdog so that
/// mutation testing can detect hanging mutations with its own timeout.
///
/// # Panics
///
/// Panics if the test body does not finish in time.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let sum = with_watchdog(|| 2 + 2);
/// assert_eq!(sum, 4);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        let result = test_fn();

        // The receiver is gone if the watchdog already gave up.
        drop(tx.send(result));
    });

    match rx.recv_timeout(WATCHDOG_TIMEOUT) {
        Ok(result) => {
            test_thread
                .join()
                .expect("test thread completed after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {WATCHDOG_TIMEOUT:?}, assuming it is hung");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without producing a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Polls `predicate` until it returns `true` or `timeout` elapses.
///
/// Returns whether the predicate was satisfied. The predicate is always evaluated at least once
/// and once more after the deadline, so a condition that becomes true just in time is not missed.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::thread;
/// use std::time::Duration;
///
/// use testing::wait_until;
///
/// let flag = Arc::new(AtomicBool::new(false));
///
/// thread::spawn({
///     let flag = Arc::clone(&flag);
///     move || flag.store(true, Ordering::Relaxed)
/// });
///
/// assert!(wait_until(Duration::from_secs(5), || flag.load(Ordering::Relaxed)));
/// ```
#[cfg_attr(test, mutants::skip)] // Mutations produce hangs or flaky timing only.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if predicate() {
            return true;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return predicate();
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Thread-safe, ordered record of events observed during a test.
///
/// Clones share the same record, so one clone can be moved into a callback running on another
/// thread while the test inspects another.
///
/// # Example
///
/// ```rust
/// use std::thread;
///
/// use testing::EventLog;
///
/// let log = EventLog::new();
///
/// thread::spawn({
///     let log = log.clone();
///     move || log.push("worker")
/// })
/// .join()
/// .unwrap();
///
/// log.push("test");
/// assert_eq!(log.snapshot(), vec!["worker", "test"]);
/// ```
pub struct EventLog<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E> EventLog<E> {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends an event.
    pub fn push(&self, event: E) {
        self.lock().push(event);
    }

    /// The number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns every recorded event.
    #[must_use]
    pub fn take(&self) -> Vec<E> {
        mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<E>> {
        // A panicking recorder has already failed the test; the record itself stays usable.
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Clone> EventLog<E> {
    /// A copy of every recorded event, in recording order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.lock().clone()
    }

    /// How many recorded events are equal to `event`.
    #[must_use]
    pub fn count_of(&self, event: &E) -> usize
    where
        E: PartialEq,
    {
        self.lock().iter().filter(|recorded| *recorded == event).count()
    }
}

impl<E> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: fmt::Debug> fmt::Debug for EventLog<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &*self.lock())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn watchdog_returns_value() {
        assert_eq!(with_watchdog(|| "done"), "done");
    }

    #[test]
    #[should_panic]
    fn watchdog_propagates_panic() {
        with_watchdog(|| {
            assert_eq!(1 + 1, 3, "inner failure");
        });
    }

    #[test]
    fn wait_until_sees_condition_from_other_thread() {
        let counter = Arc::new(AtomicUsize::new(0));

        let incrementer = thread::spawn({
            let counter = Arc::clone(&counter);
            move || {
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        assert!(wait_until(Duration::from_secs(5), || {
            counter.load(Ordering::Relaxed) == 3
        }));

        incrementer.join().unwrap();
    }

    #[test]
    fn wait_until_gives_up() {
        assert!(!wait_until(Duration::from_millis(5), || false));
    }

    #[test]
    fn event_log_preserves_order_across_clones() {
        let log = EventLog::new();
        let other = log.clone();

        log.push(1);
        other.push(2);
        log.push(3);

        assert_eq!(other.snapshot(), vec![1, 2, 3]);
        assert_eq!(log.count_of(&2), 1);
        assert_eq!(log.len(), 3);

        assert_eq!(log.take(), vec![1, 2, 3]);
        assert!(other.is_empty());
    }
}
