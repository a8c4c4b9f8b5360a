use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use slot_pool::GrowablePool;
use tracing::{debug, error, info, trace, warn};

use crate::constants::ERR_POISONED_LOCK;
use crate::task::{CycleCallback, OneShot, TaskRecord, into_submission_order};
use crate::{Error, Result, WorkerBuilder};

/// A named background thread that runs a callback once per cycle and executes tasks dispatched
/// to it from other threads.
///
/// Each cycle holds the cycle lock while it runs the queued tasks and then the cycle callback,
/// and releases it before the next cycle starts. Cycles start `cycle_interval` apart; a cycle
/// that overruns its interval is followed immediately by the next one. Threads waiting for the
/// cycle lock get it before the worker starts another cycle, so a zero interval does not starve
/// them.
///
/// The handle is cheap to clone and every clone refers to the same worker. The worker keeps
/// running until [`destroy()`][Self::destroy] is called, even if every handle is dropped.
///
/// Operations behave differently when called from the worker thread itself, which already holds
/// the cycle lock: tasks run immediately, waits succeed at once and destroying the worker runs
/// the exit callback synchronously.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// use cycle_worker::Worker;
///
/// let worker = Worker::<AtomicU32>::builder("counter")
///     .cycle_interval(Duration::from_millis(1))
///     .on_cycle(|_, ticks| {
///         ticks.fetch_add(1, Ordering::Relaxed);
///     })
///     .build()
///     .unwrap();
///
/// let ticket = worker
///     .dispatch_task(|_, ticks| ticks.store(100, Ordering::Relaxed))
///     .unwrap();
///
/// assert!(worker.wait_for_cycle(ticket, Duration::from_secs(10)));
/// assert!(worker.state().load(Ordering::Relaxed) > 100);
///
/// assert!(worker.destroy());
/// assert!(!worker.is_alive());
/// ```
pub struct Worker<S = ()> {
    shared: Arc<WorkerShared<S>>,
}

struct WorkerShared<S> {
    name: String,
    cycle_interval: Duration,
    state: S,

    /// Held by the worker thread while it runs the init callback and for the body of every
    /// cycle. Never held while the worker sleeps.
    cycle_lock: Mutex<()>,

    /// Threads other than the worker that are blocked on `cycle_lock`. The worker does not
    /// start a cycle while this is nonzero.
    waiting_callers: AtomicUsize,

    /// Pairs with `wake` and `cycle_completed`. Only held for short checks, never while user
    /// code runs.
    signal: Mutex<()>,

    /// Notified at the end of every cycle and when the worker thread exits.
    cycle_completed: Condvar,

    /// Wakes the worker thread early when a destroy request arrives.
    wake: Condvar,

    /// Number of cycles in which the cycle callback ran. Only incremented under `cycle_lock`.
    cycle_count: AtomicU64,
    next_task_sequence: AtomicU64,

    paused: AtomicBool,

    /// Set once, by whichever destroy request comes first.
    kill_requested: AtomicBool,

    /// Set after the exit callback has run and the task queue has been destroyed.
    terminated: AtomicBool,

    tasks: GrowablePool<TaskRecord<S>>,
    on_exit: Mutex<Option<OneShot<S>>>,

    /// Taken by a destroy request from another thread, which joins it.
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: OnceLock<ThreadId>,
}

impl<S> Worker<S> {
    /// Creates a builder for a worker with the given name. The name is also given to the thread.
    pub fn builder(name: impl Into<String>) -> WorkerBuilder<S> {
        WorkerBuilder::new(name.into())
    }

    /// The name the worker was created with.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The time between the starts of two consecutive cycles.
    #[must_use]
    #[inline]
    pub fn cycle_interval(&self) -> Duration {
        self.shared.cycle_interval
    }

    /// The persistent state handed to every callback and task.
    #[must_use]
    #[inline]
    pub fn state(&self) -> &S {
        &self.shared.state
    }

    /// Number of cycles in which the cycle callback has completed. Paused cycles do not count.
    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.shared.cycle_count.load(Ordering::Acquire)
    }

    /// Whether cycles currently skip the cycle callback.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Whether the calling thread is the worker's own thread.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        self.shared
            .thread_id
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// Whether the worker thread is still running.
    ///
    /// After the worker destroys itself from its own thread, this stays `true` until the
    /// thread has returned from the worker loop. After a destroy request from another thread
    /// has returned, this is `false`.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared
            .thread
            .lock()
            .expect(ERR_POISONED_LOCK)
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Number of dispatched tasks waiting for the next cycle.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.len()
    }

    /// Whether two handles refer to the same worker.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Stops running the cycle callback until [`unpause()`][Self::unpause] is called.
    ///
    /// Cycles keep their pace while paused and dispatched tasks still run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Terminated`] if the worker has been destroyed.
    pub fn pause(&self) -> Result<()> {
        self.set_paused("pause", true)
    }

    /// Resumes running the cycle callback after [`pause()`][Self::pause].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Terminated`] if the worker has been destroyed.
    pub fn unpause(&self) -> Result<()> {
        self.set_paused("unpause", false)
    }

    fn set_paused(&self, operation: &'static str, paused: bool) -> Result<()> {
        if self.shared.kill_requested.load(Ordering::Acquire) {
            return Err(self.rejected(operation));
        }

        if self.is_worker_thread() {
            self.shared.paused.store(paused, Ordering::Release);
        } else {
            let _cycle = self.shared.lock_cycle_for_caller();
            self.shared.paused.store(paused, Ordering::Release);
        }

        debug!(worker = self.name(), paused, "worker pause state changed");

        Ok(())
    }

    /// Acquires the cycle lock, preventing the worker from starting or finishing a cycle until
    /// the returned guard is dropped.
    ///
    /// Operations that need the cycle lock, such as [`dispatch_task()`][Self::dispatch_task],
    /// must not be called from the same thread while the guard is held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReentrantLock`] when called from the worker thread, which already holds
    /// the lock whenever it runs user code.
    pub fn lock(&self) -> Result<CycleGuard<'_>> {
        if self.is_worker_thread() {
            return Err(Error::ReentrantLock {
                worker: self.name().to_string(),
            });
        }

        Ok(CycleGuard {
            _guard: self.shared.lock_cycle_for_caller(),
        })
    }

    /// Blocks until a cycle completes after the one `ticket` was issued in, or until `timeout`
    /// elapses. Returns whether such a cycle completed.
    ///
    /// Tickets are returned by [`dispatch_task()`][Self::dispatch_task]. A task dispatched from
    /// another thread has run once this returns `true` for its ticket. On the worker thread this
    /// returns `true` immediately because dispatched tasks run inline there.
    ///
    /// The wait does not need the cycle lock, so it returns within `timeout` even while a long
    /// cycle is running or the caller holds a [`CycleGuard`]. Paused cycles do not complete,
    /// so waiting on a paused worker times out even though queued tasks still run.
    pub fn wait_for_cycle(&self, ticket: u64, timeout: Duration) -> bool {
        if self.is_worker_thread() {
            return true;
        }

        let signal = self.shared.lock_signal();

        let (_signal, _) = self
            .shared
            .cycle_completed
            .wait_timeout_while(signal, timeout, |_| {
                self.cycle_count() <= ticket && !self.shared.terminated.load(Ordering::Acquire)
            })
            .unwrap_or_else(PoisonError::into_inner);

        self.cycle_count() > ticket
    }

    /// Requests the worker to terminate.
    ///
    /// From another thread, this wakes the worker and blocks until its thread has exited. The
    /// worker first runs the tasks already queued and then the exit callback, on its own thread.
    ///
    /// From the worker thread, this runs the exit callback synchronously and destroys the task
    /// queue. The thread exits when control returns to the worker loop.
    ///
    /// Returns `false` if the worker has already been destroyed or is being destroyed, or if
    /// its thread panicked.
    pub fn destroy(&self) -> bool {
        if self.is_worker_thread() {
            if self.shared.kill_requested.swap(true, Ordering::AcqRel) {
                warn!(worker = self.name(), "worker is already being destroyed");
                return false;
            }

            // The thread handle stays in place so is_alive() keeps tracking the thread until it
            // leaves the worker loop.
            self.finish();
            return true;
        }

        {
            let _cycle = self.shared.lock_cycle_for_caller();

            if self.shared.kill_requested.swap(true, Ordering::AcqRel) {
                warn!(worker = self.name(), "worker is already destroyed");
                return false;
            }
        }

        // The kill flag is set before the signal lock is taken, so a worker about to sleep
        // either sees the flag or is already waiting for this notification.
        {
            let _signal = self.shared.lock_signal();
            self.shared.wake.notify_all();
        }

        let Some(thread) = self.shared.thread.lock().expect(ERR_POISONED_LOCK).take() else {
            return false;
        };

        if thread.join().is_err() {
            error!(worker = self.name(), "worker thread panicked");
            return false;
        }

        true
    }

    /// Runs the exit callback and releases the task queue. Always called on the worker thread.
    fn finish(&self) {
        let on_exit = self.shared.on_exit.lock().expect(ERR_POISONED_LOCK).take();

        if let Some(on_exit) = on_exit {
            on_exit(self, &self.shared.state);
        }

        let dropped_tasks = self.shared.tasks.len();
        self.shared.tasks.destroy();
        self.shared.terminated.store(true, Ordering::Release);

        info!(
            worker = self.name(),
            cycles = self.cycle_count(),
            dropped_tasks,
            "worker terminated"
        );
    }

    fn rejected(&self, operation: &'static str) -> Error {
        warn!(
            worker = self.name(),
            operation, "operation rejected because the worker has terminated"
        );

        Error::Terminated {
            worker: self.name().to_string(),
        }
    }
}

impl<S: Default + Send + Sync + 'static> Worker<S> {
    pub(crate) fn start(builder: WorkerBuilder<S>) -> Result<Self> {
        let WorkerBuilder {
            name,
            cycle_interval,
            task_queue_node_capacity,
            state,
            on_init,
            on_cycle,
            on_exit,
        } = builder;

        let on_cycle =
            on_cycle.expect("cycle callback must be set using .on_cycle() before calling .build()");

        let tasks = GrowablePool::builder(format!("{name} tasks"))
            .node_capacity(task_queue_node_capacity.get())
            .build()?;

        let worker = Self {
            shared: Arc::new(WorkerShared {
                name,
                cycle_interval,
                state: state.unwrap_or_default(),
                cycle_lock: Mutex::new(()),
                waiting_callers: AtomicUsize::new(0),
                signal: Mutex::new(()),
                cycle_completed: Condvar::new(),
                wake: Condvar::new(),
                cycle_count: AtomicU64::new(0),
                next_task_sequence: AtomicU64::new(0),
                paused: AtomicBool::new(false),
                kill_requested: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                tasks,
                on_exit: Mutex::new(on_exit),
                thread: Mutex::new(None),
                thread_id: OnceLock::new(),
            }),
        };

        // The worker thread waits for this lock before running any callback, so the thread
        // handle is in place before user code can observe or destroy the worker.
        let cycle = lock_ignoring_poison(&worker.shared.cycle_lock);

        let thread_worker = worker.clone();
        let thread = thread::Builder::new()
            .name(worker.name().to_string())
            .spawn(move || thread_worker.run(on_init, on_cycle))
            .map_err(|source| Error::Spawn {
                worker: worker.name().to_string(),
                source,
            })?;

        *worker.shared.thread.lock().expect(ERR_POISONED_LOCK) = Some(thread);
        drop(cycle);

        info!(
            worker = worker.name(),
            cycle_interval = ?cycle_interval,
            "worker started"
        );

        Ok(worker)
    }

    /// Enqueues a task for the next cycle and returns a ticket for
    /// [`wait_for_cycle()`][Self::wait_for_cycle].
    ///
    /// Tasks run on the worker thread in the order they were dispatched, before the cycle
    /// callback. When called from the worker thread, the task runs immediately instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Terminated`] if the worker has been destroyed or a destroy request is
    /// pending. Returns [`Error::TaskQueue`] if the task queue cannot grow.
    pub fn dispatch_task(&self, task: impl FnOnce(&Self, &S) + Send + 'static) -> Result<u64> {
        if self.is_worker_thread() {
            if self.shared.terminated.load(Ordering::Acquire) {
                return Err(self.rejected("dispatch_task"));
            }

            task(self, &self.shared.state);
            return Ok(self.cycle_count());
        }

        let _cycle = self.shared.lock_cycle_for_caller();

        if self.shared.kill_requested.load(Ordering::Acquire) {
            return Err(self.rejected("dispatch_task"));
        }

        let sequence = self.shared.next_task_sequence.fetch_add(1, Ordering::Relaxed);

        self.shared.tasks.add_with(|_, record| {
            record.sequence = sequence;
            record.task = Some(Box::new(task));
        })?;

        Ok(self.cycle_count())
    }

    /// The worker loop. Takes the cycle lock for the init callback and for each cycle, and
    /// sleeps without it between cycles.
    #[cfg_attr(test, mutants::skip)] // Mutations here mostly produce hangs.
    fn run(self, on_init: Option<OneShot<S>>, mut on_cycle: CycleCallback<S>) {
        let shared = &*self.shared;

        shared
            .thread_id
            .set(thread::current().id())
            .expect("worker thread identity is only assigned by the worker thread");

        debug!(worker = self.name(), "worker thread running");

        if let Some(on_init) = on_init {
            let _cycle = shared.lock_cycle_for_worker();
            on_init(&self, &shared.state);
        }

        let mut next_cycle = Some(Instant::now());

        while !shared.terminated.load(Ordering::Acquire) {
            shared.wait_for_next_cycle(next_cycle);

            let cycle = shared.lock_cycle_for_worker();

            // An interval too long to represent means the worker only wakes up to terminate.
            next_cycle = Instant::now().checked_add(shared.cycle_interval);

            let keep_running = self.run_cycle(&mut on_cycle);
            drop(cycle);

            shared.notify_cycle_completed();

            if !keep_running {
                break;
            }
        }

        // Wakes waiters whose cycle will now never come.
        shared.notify_cycle_completed();
    }

    /// Runs one cycle with the cycle lock held. Returns `false` once the worker has terminated.
    fn run_cycle(&self, on_cycle: &mut CycleCallback<S>) -> bool {
        let shared = &*self.shared;

        self.run_tasks();

        if shared.terminated.load(Ordering::Acquire) {
            return false;
        }

        if shared.kill_requested.load(Ordering::Acquire) {
            self.finish();
            return false;
        }

        if shared.paused.load(Ordering::Acquire) {
            return true;
        }

        on_cycle(self, &shared.state);

        if shared.terminated.load(Ordering::Acquire) {
            return false;
        }

        let count = shared
            .cycle_count
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);

        trace!(worker = self.name(), count, "cycle completed");

        true
    }

    /// Runs every queued task in submission order and leaves the queue empty.
    fn run_tasks(&self) {
        let mut taken = Vec::new();

        // The queue lock is released before any task runs, so tasks may dispatch further tasks.
        let drained = self.shared.tasks.iterate(|_, record| {
            if let Some(task) = record.take() {
                taken.push(task);
            }
        });

        if drained.is_err() || taken.is_empty() {
            return;
        }

        if self.shared.tasks.clear().is_err() {
            return;
        }

        for task in into_submission_order(taken) {
            // A task may have destroyed the worker. The remaining tasks are dropped unrun.
            if self.shared.terminated.load(Ordering::Acquire) {
                break;
            }

            task(self, &self.shared.state);
        }
    }
}

impl<S> WorkerShared<S> {
    /// Acquires the cycle lock on behalf of a thread other than the worker. The worker lets
    /// such callers go first before it starts another cycle.
    fn lock_cycle_for_caller(&self) -> MutexGuard<'_, ()> {
        self.waiting_callers.fetch_add(1, Ordering::AcqRel);
        let cycle = lock_ignoring_poison(&self.cycle_lock);
        self.waiting_callers.fetch_sub(1, Ordering::AcqRel);

        cycle
    }

    /// Acquires the cycle lock on the worker thread, after every waiting caller has had it.
    #[cfg_attr(test, mutants::skip)] // Mutations here only affect fairness.
    fn lock_cycle_for_worker(&self) -> MutexGuard<'_, ()> {
        while self.waiting_callers.load(Ordering::Acquire) != 0 {
            thread::yield_now();
        }

        lock_ignoring_poison(&self.cycle_lock)
    }

    fn lock_signal(&self) -> MutexGuard<'_, ()> {
        lock_ignoring_poison(&self.signal)
    }

    fn notify_cycle_completed(&self) {
        let _signal = self.lock_signal();
        self.cycle_completed.notify_all();
    }

    /// Sleeps until `deadline` passes or a destroy request arrives. Without a deadline, only a
    /// destroy request ends the wait. Returns at once if the deadline has already passed.
    fn wait_for_next_cycle(&self, deadline: Option<Instant>) {
        let mut signal = self.lock_signal();

        while !self.kill_requested.load(Ordering::Acquire) {
            let Some(deadline) = deadline else {
                signal = self
                    .wake
                    .wait(signal)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                break;
            }

            signal = self
                .wake
                .wait_timeout(signal, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// The worker's data-free mutexes only order threads, so a panic in a callback that held one
/// leaves nothing behind that needs repair.
fn lock_ignoring_poison(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S> Clone for Worker<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for Worker<S> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.shared.name)
            .field("cycle_interval", &self.shared.cycle_interval)
            .field("cycle_count", &self.cycle_count())
            .field("paused", &self.is_paused())
            .field(
                "kill_requested",
                &self.shared.kill_requested.load(Ordering::Relaxed),
            )
            .field(
                "terminated",
                &self.shared.terminated.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Holds the cycle lock of a [`Worker`]; see [`Worker::lock()`].
#[must_use = "the cycle lock is released as soon as the guard is dropped"]
pub struct CycleGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl fmt::Debug for CycleGuard<'_> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::mpsc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use testing::{WATCHDOG_TIMEOUT, with_watchdog};

    use super::*;

    assert_impl_all!(Worker<()>: Send, Sync, Clone, fmt::Debug);
    assert_impl_all!(Worker<AtomicUsize>: Send, Sync);
    assert_not_impl_any!(CycleGuard<'static>: Send);

    const FAST: Duration = Duration::from_millis(1);

    fn fast_worker(name: &str) -> Worker<AtomicUsize> {
        Worker::<AtomicUsize>::builder(name)
            .cycle_interval(FAST)
            .on_cycle(|_, cycles| {
                cycles.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap()
    }

    #[test]
    fn task_queue_is_named_after_worker() {
        let worker = fast_worker("named");

        assert_eq!(worker.name(), "named");
        assert_eq!(worker.shared.tasks.name(), "named tasks");

        assert!(worker.destroy());
    }

    #[test]
    fn initial_state_is_handed_to_callbacks() {
        with_watchdog(|| {
            let (tx, rx) = mpsc::channel();

            let worker = Worker::<String>::builder("stateful")
                .state("seed".to_string())
                .on_init(move |_, state| tx.send(state.clone()).unwrap())
                .on_cycle(|_, _| {})
                .build()
                .unwrap();

            assert_eq!(rx.recv().unwrap(), "seed");
            assert_eq!(worker.state(), "seed");

            assert!(worker.destroy());
        });
    }

    #[test]
    fn callbacks_run_on_worker_thread() {
        with_watchdog(|| {
            let (tx, rx) = mpsc::channel();

            let worker = Worker::<()>::builder("identity")
                .cycle_interval(FAST)
                .on_init(move |worker, ()| tx.send(worker.is_worker_thread()).unwrap())
                .on_cycle(|_, ()| {})
                .build()
                .unwrap();

            assert!(rx.recv().unwrap());
            assert!(!worker.is_worker_thread());

            assert!(worker.destroy());
        });
    }

    #[test]
    fn lock_from_worker_thread_is_rejected() {
        with_watchdog(|| {
            let (tx, rx) = mpsc::channel();

            let worker = Worker::<()>::builder("reentrant")
                .on_init(move |worker, ()| {
                    tx.send(matches!(worker.lock(), Err(Error::ReentrantLock { .. })))
                        .unwrap();
                })
                .on_cycle(|_, ()| {})
                .build()
                .unwrap();

            assert!(rx.recv().unwrap());

            assert!(worker.destroy());
        });
    }

    #[test]
    fn lock_holds_back_cycles() {
        with_watchdog(|| {
            let worker = fast_worker("held");

            let guard = worker.lock().unwrap();
            let before = worker.state().load(Ordering::Relaxed);
            thread::sleep(Duration::from_millis(20));
            assert_eq!(worker.state().load(Ordering::Relaxed), before);
            drop(guard);

            let ticket = worker.cycle_count();
            assert!(worker.wait_for_cycle(ticket, WATCHDOG_TIMEOUT));

            assert!(worker.destroy());
        });
    }

    #[test]
    fn tasks_dispatched_from_worker_thread_run_inline() {
        with_watchdog(|| {
            let (tx, rx) = mpsc::channel();

            let worker = Worker::<AtomicUsize>::builder("inline")
                .on_init(move |worker, value| {
                    worker
                        .dispatch_task(|_, value| value.store(5, Ordering::Relaxed))
                        .unwrap();

                    // The task has already run and the wait needs no cycle.
                    let observed = value.load(Ordering::Relaxed);
                    tx.send((observed, worker.wait_for_cycle(u64::MAX, Duration::ZERO)))
                        .unwrap();
                })
                .on_cycle(|_, _| {})
                .build()
                .unwrap();

            assert_eq!(rx.recv().unwrap(), (5, true));
            assert_eq!(worker.pending_tasks(), 0);

            assert!(worker.destroy());
        });
    }

    #[test]
    fn destroy_from_cycle_callback_runs_exit_synchronously() {
        with_watchdog(|| {
            let exits = Arc::new(AtomicUsize::new(0));

            let worker = Worker::<()>::builder("self destructing")
                .cycle_interval(FAST)
                .on_cycle(|worker, ()| {
                    assert!(worker.destroy());
                    assert!(!worker.destroy());
                })
                .on_exit({
                    let exits = Arc::clone(&exits);
                    move |_, ()| {
                        exits.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .build()
                .unwrap();

            assert!(!worker.wait_for_cycle(0, WATCHDOG_TIMEOUT));
            assert!(testing::wait_until(WATCHDOG_TIMEOUT, || !worker.is_alive()));

            assert_eq!(exits.load(Ordering::Relaxed), 1);
            assert_eq!(worker.cycle_count(), 0);
            assert!(!worker.destroy());
            assert!(matches!(
                worker.dispatch_task(|_, ()| {}),
                Err(Error::Terminated { .. })
            ));
        });
    }

    #[test]
    fn pause_after_destroy_is_rejected() {
        let worker = fast_worker("gone");
        assert!(worker.destroy());

        assert!(matches!(worker.pause(), Err(Error::Terminated { .. })));
        assert!(matches!(worker.unpause(), Err(Error::Terminated { .. })));
    }

    #[test]
    fn clones_share_the_worker() {
        let worker = fast_worker("shared");
        let clone = worker.clone();
        let other = fast_worker("other");

        assert!(worker.ptr_eq(&clone));
        assert!(!worker.ptr_eq(&other));

        assert!(clone.destroy());
        assert!(!worker.is_alive());
        assert!(other.is_alive());

        assert!(other.destroy());
    }

    #[test]
    fn zero_interval_worker_is_destroyed_from_another_thread() {
        with_watchdog(|| {
            let worker = Worker::<AtomicUsize>::builder("back to back")
                .cycle_interval(Duration::ZERO)
                .on_cycle(|_, cycles| {
                    cycles.fetch_add(1, Ordering::Relaxed);
                })
                .build()
                .unwrap();

            assert!(testing::wait_until(WATCHDOG_TIMEOUT, || {
                worker.state().load(Ordering::Relaxed) > 10
            }));

            let remote = worker.clone();
            let destroyer = thread::spawn(move || remote.destroy());

            assert!(destroyer.join().unwrap());
            assert!(!worker.is_alive());
        });
    }

    #[test]
    fn wait_for_cycle_times_out_while_guard_is_held() {
        with_watchdog(|| {
            let worker = fast_worker("guarded wait");

            let guard = worker.lock().unwrap();
            let ticket = worker.cycle_count();

            assert!(!worker.wait_for_cycle(ticket, Duration::from_millis(20)));
            drop(guard);

            assert!(worker.wait_for_cycle(ticket, WATCHDOG_TIMEOUT));
            assert!(worker.destroy());
        });
    }

    #[test]
    fn wait_for_cycle_times_out_during_long_cycle() {
        with_watchdog(|| {
            let (tx, rx) = mpsc::channel();

            let worker = Worker::<()>::builder("slow cycle")
                .cycle_interval(FAST)
                .on_cycle(move |_, ()| {
                    // Only the first send succeeds; later cycles find the receiver gone.
                    _ = tx.send(());
                    thread::sleep(Duration::from_millis(500));
                })
                .build()
                .unwrap();

            rx.recv().unwrap();
            drop(rx);

            let started = Instant::now();
            assert!(!worker.wait_for_cycle(u64::MAX, Duration::from_millis(20)));
            assert!(started.elapsed() < Duration::from_millis(400));

            assert!(worker.destroy());
        });
    }

    #[test]
    fn destroy_after_panicking_cycle_reports_failure() {
        with_watchdog(|| {
            let worker = Worker::<()>::builder("panicking")
                .cycle_interval(FAST)
                .on_cycle(|_, ()| panic!("cycle callback failed"))
                .build()
                .unwrap();

            assert!(testing::wait_until(WATCHDOG_TIMEOUT, || !worker.is_alive()));

            assert!(!worker.wait_for_cycle(0, Duration::from_millis(10)));
            assert!(!worker.destroy());
            assert!(!worker.destroy());
        });
    }

    #[test]
    fn self_destroyed_worker_is_alive_until_loop_exits() {
        with_watchdog(|| {
            let (tx, rx) = mpsc::channel();

            let worker = Worker::<()>::builder("self destructing alive")
                .cycle_interval(FAST)
                .on_cycle(move |worker, ()| {
                    assert!(worker.destroy());
                    tx.send(worker.is_alive()).unwrap();
                })
                .build()
                .unwrap();

            assert!(rx.recv().unwrap());
            assert!(testing::wait_until(WATCHDOG_TIMEOUT, || !worker.is_alive()));
        });
    }
}
