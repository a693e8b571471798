//! Delayed, fire-and-forget callbacks
//!
//! Two schedulers share one deadline queue:
//!
//! - [`TimerThread`] runs callbacks on a dedicated background thread against
//!   the wall clock.
//! - [`ManualScheduler`] keeps a virtual clock that only moves when told to,
//!   which makes timing behaviour reproducible in tests and replays.
//!
//! Nothing here cancels a timer. Callers invalidate stale callbacks
//! themselves (the classifier compares press generations), so a handle can
//! simply be dropped.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A callback run once its deadline passes. It receives the time it fired.
pub type Task = Box<dyn FnOnce(Instant) + Send + 'static>;

/// Identifies a scheduled callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    id: u64,
    deadline: Instant,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Something that can run a task at or after a deadline
pub trait Scheduler: Send + Sync {
    /// Current time as seen by this scheduler
    fn now(&self) -> Instant;

    /// Run `task` once `deadline` has passed
    fn schedule_at(&self, deadline: Instant, task: Task) -> TimerHandle;

    /// Run `task` after `delay` from now
    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle {
        self.schedule_at(self.now() + delay, task)
    }
}

struct Entry {
    deadline: Instant,
    id: u64,
    task: Task,
}

// Reversed so the max-heap yields the earliest deadline first; ids break
// ties in scheduling order.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for Entry {}

#[derive(Default)]
struct TimerQueue {
    heap: BinaryHeap<Entry>,
    next_id: u64,
}

impl TimerQueue {
    fn push(&mut self, deadline: Instant, task: Task) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Entry { deadline, id, task });
        TimerHandle { id, deadline }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    fn pop_due(&mut self, now: Instant) -> Option<Entry> {
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => self.heap.pop(),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

struct Shared {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

/// Wall-clock scheduler backed by one background thread
pub struct TimerThread {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    /// Start the timer thread
    pub fn spawn() -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TimerQueue::default()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("keypulse-timer".to_string())
                .spawn(move || run_timer_loop(&shared))?
        };

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Number of callbacks waiting for their deadline
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Stop the thread. Callbacks that have not fired yet are dropped.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        {
            // Taking the lock orders this store before the worker's next wait
            let _queue = self.shared.queue.lock();
            self.shared.shutdown.store(true, AtomicOrdering::Release);
            self.shared.wakeup.notify_all();
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                // Shut down from one of our own callbacks; the loop exits on its own
                return;
            }
            if worker.join().is_err() {
                log::error!("timer thread panicked");
            }
        }

        // Pending tasks may hold handles back to this scheduler
        let stale = std::mem::take(&mut self.shared.queue.lock().heap);
        drop(stale);
    }
}

impl Scheduler for TimerThread {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_at(&self, deadline: Instant, task: Task) -> TimerHandle {
        let handle = self.shared.queue.lock().push(deadline, task);
        self.shared.wakeup.notify_one();
        handle
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer_loop(shared: &Shared) {
    let mut queue = shared.queue.lock();
    loop {
        if shared.shutdown.load(AtomicOrdering::Acquire) {
            break;
        }

        let now = Instant::now();
        if let Some(entry) = queue.pop_due(now) {
            // Tasks may schedule more work, so the queue must be free
            MutexGuard::unlocked(&mut queue, || (entry.task)(now));
            continue;
        }

        match queue.next_deadline() {
            Some(deadline) => {
                shared.wakeup.wait_until(&mut queue, deadline);
            }
            None => shared.wakeup.wait(&mut queue),
        }
    }
    log::debug!("timer thread stopped with {} pending callback(s)", queue.len());
}

/// Scheduler driven by a virtual clock
///
/// Time starts at construction and only moves through [`advance`] or
/// [`advance_to`], which run every callback that falls due along the way in
/// deadline order. Each callback sees the clock set to its own deadline.
///
/// [`advance`]: ManualScheduler::advance
/// [`advance_to`]: ManualScheduler::advance_to
pub struct ManualScheduler {
    origin: Instant,
    now: Mutex<Instant>,
    queue: Mutex<TimerQueue>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            now: Mutex::new(origin),
            queue: Mutex::new(TimerQueue::default()),
        }
    }

    /// The instant the virtual clock started at
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Instant `ms` milliseconds after the origin
    pub fn at_ms(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }

    /// Milliseconds between the origin and `instant`
    pub fn elapsed_ms(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.origin).as_millis() as u64
    }

    /// Number of callbacks not yet fired
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Move the clock forward by `delay`, running due callbacks
    pub fn advance(&self, delay: Duration) -> usize {
        let target = self.now() + delay;
        self.advance_to(target)
    }

    /// Move the clock to `target`, running every callback due by then.
    ///
    /// Returns the number of callbacks run. The clock never moves backwards.
    pub fn advance_to(&self, target: Instant) -> usize {
        let mut ran = 0;
        loop {
            let entry = self.queue.lock().pop_due(target);
            let Some(entry) = entry else {
                break;
            };

            let fired_at = {
                let mut now = self.now.lock();
                if entry.deadline > *now {
                    *now = entry.deadline;
                }
                *now
            };
            (entry.task)(fired_at);
            ran += 1;
        }

        let mut now = self.now.lock();
        if target > *now {
            *now = target;
        }
        ran
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn schedule_at(&self, deadline: Instant, task: Task) -> TimerHandle {
        self.queue.lock().push(deadline, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl Fn(u64) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: u64| -> Task {
            let log = log_clone.clone();
            Box::new(move |_| log.lock().push(tag))
        };
        (log, make)
    }

    #[test]
    fn manual_runs_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule_at(scheduler.at_ms(300), task(3));
        scheduler.schedule_at(scheduler.at_ms(100), task(1));
        scheduler.schedule_at(scheduler.at_ms(200), task(2));

        assert_eq!(scheduler.advance_to(scheduler.at_ms(250)), 2);
        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn manual_equal_deadlines_keep_schedule_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        for tag in 0..5 {
            scheduler.schedule_at(scheduler.at_ms(50), task(tag));
        }
        scheduler.advance_to(scheduler.at_ms(50));

        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn manual_callback_sees_its_deadline() {
        let scheduler = Arc::new(ManualScheduler::new());
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = seen.clone();
        scheduler.schedule_after(
            Duration::from_millis(120),
            Box::new(move |fired_at| *seen_clone.lock() = Some(fired_at)),
        );
        scheduler.advance(Duration::from_secs(1));

        assert_eq!(*seen.lock(), Some(scheduler.at_ms(120)));
        assert_eq!(scheduler.now(), scheduler.at_ms(1000));
    }

    #[test]
    fn manual_runs_tasks_scheduled_by_tasks() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (log, task) = recorder();

        let inner = scheduler.clone();
        let follow_up = task(2);
        scheduler.schedule_at(
            scheduler.at_ms(10),
            Box::new(move |fired_at| {
                inner.schedule_at(fired_at + Duration::from_millis(10), follow_up);
            }),
        );

        scheduler.advance_to(scheduler.at_ms(15));
        assert!(log.lock().is_empty());
        scheduler.advance_to(scheduler.at_ms(20));
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn manual_clock_never_moves_backwards() {
        let scheduler = ManualScheduler::new();
        scheduler.advance_to(scheduler.at_ms(100));
        scheduler.advance_to(scheduler.at_ms(40));
        assert_eq!(scheduler.now(), scheduler.at_ms(100));
    }

    #[test]
    fn handles_carry_deadline() {
        let scheduler = ManualScheduler::new();
        let a = scheduler.schedule_at(scheduler.at_ms(5), Box::new(|_| {}));
        let b = scheduler.schedule_at(scheduler.at_ms(5), Box::new(|_| {}));
        assert_eq!(a.deadline(), scheduler.at_ms(5));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn timer_thread_fires_after_delay() {
        let timer = TimerThread::spawn().expect("spawn timer");
        let (tx, rx) = mpsc::channel();

        let start = Instant::now();
        timer.schedule_after(
            Duration::from_millis(20),
            Box::new(move |fired_at| {
                let _ = tx.send(fired_at);
            }),
        );

        let fired_at = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("timer did not fire");
        assert!(fired_at.duration_since(start) >= Duration::from_millis(20));
        timer.shutdown();
    }

    #[test]
    fn timer_thread_orders_many_timers() {
        let timer = TimerThread::spawn().expect("spawn timer");
        let (tx, rx) = mpsc::channel();
        let base = Instant::now();

        for tag in [3u64, 1, 2] {
            let tx = tx.clone();
            timer.schedule_at(
                base + Duration::from_millis(10 * tag),
                Box::new(move |_| {
                    let _ = tx.send(tag);
                }),
            );
        }

        let order: Vec<u64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).expect("timer"))
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn timer_thread_shutdown_drops_pending() {
        let timer = TimerThread::spawn().expect("spawn timer");
        timer.schedule_after(Duration::from_secs(60), Box::new(|_| {}));
        assert_eq!(timer.pending(), 1);
        timer.shutdown();
        // A second shutdown is harmless
        timer.shutdown();
    }
}
