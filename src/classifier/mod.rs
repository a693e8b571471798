//! Press classification
//!
//! Turns press/release transitions into single, double and long press
//! actions. Decisions that need to wait (is this press going to be held?
//! is a second press coming?) are scheduled as confirmations on a
//! [`Scheduler`]. Every confirmation carries the generation of the press
//! instance it was scheduled for and does nothing if the key has moved on
//! to a newer instance by the time it fires.
//!
//! Each key's state sits behind its own lock, so events and confirmations
//! for one key are applied one at a time while different keys proceed
//! independently.

mod action;
mod state;
mod thresholds;

pub use action::{Action, ActionKind, Phase};
pub use state::{KeyCell, KeyState, KeyStateStore};
pub use thresholds::{Thresholds, DEFAULT_DOUBLE_WINDOW_MS, DEFAULT_LONG_WINDOW_MS};

use crate::keyboard::{KeyId, RawEvent, Transition};
use crate::scheduler::{Scheduler, Task};
use crate::sink::ActionSink;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of handling a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Second press inside the double window; a double was emitted
    Double { generation: u64 },
    /// A new press instance began and a long press confirmation is pending
    Started { generation: u64 },
}

/// Result of handling a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// No press was in progress for this key
    Ignored,
    /// A single press confirmation is pending
    Pending { generation: u64, held: Duration },
}

/// Result of handling any raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Press(PressOutcome),
    Release(ReleaseOutcome),
}

/// Classifies raw key transitions into actions
pub struct Classifier {
    thresholds: Thresholds,
    store: KeyStateStore,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn ActionSink>,
}

impl Classifier {
    pub fn new(
        thresholds: Thresholds,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn ActionSink>,
    ) -> Self {
        Self {
            thresholds,
            store: KeyStateStore::new(),
            scheduler,
            sink,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Per-key state, for display and inspection
    pub fn store(&self) -> &KeyStateStore {
        &self.store
    }

    /// Dispatch a raw event to [`on_press`](Self::on_press) or
    /// [`on_release`](Self::on_release)
    pub fn handle(&self, event: &RawEvent) -> EventOutcome {
        match event.transition {
            Transition::Press => EventOutcome::Press(self.on_press(&event.key, event.time)),
            Transition::Release => EventOutcome::Release(self.on_release(&event.key, event.time)),
        }
    }

    /// Handle a key going down at `t`
    pub fn on_press(&self, key: &KeyId, t: Instant) -> PressOutcome {
        let (cell, created) = self.store.get_or_insert(key);
        if created {
            self.sink.key_seen(key);
        }

        let mut state = cell.lock();
        state.press_start = Some(t);
        state.is_held = true;

        let is_double = state
            .last_press_time
            .is_some_and(|last| t.saturating_duration_since(last) < self.thresholds.double_window);

        if is_double {
            state.last_press_time = None;
            state.suppress_single = true;
            // Also retires the previous instance's pending long confirmation
            let generation = state.advance_generation();

            log::info!("double press: {}", key);
            self.sink.emit(Action::on(key.clone(), ActionKind::Double, t));
            return PressOutcome::Double { generation };
        }

        state.last_press_time = Some(t);
        state.suppress_single = false;
        let generation = state.advance_generation();

        self.scheduler.schedule_at(
            t + self.thresholds.long_window,
            confirm_long(cell.clone(), key.clone(), generation, self.sink.clone()),
        );
        log::trace!("press {} started generation {}", key, generation);

        PressOutcome::Started { generation }
    }

    /// Handle a key coming up at `t`
    pub fn on_release(&self, key: &KeyId, t: Instant) -> ReleaseOutcome {
        let Some(cell) = self.store.get(key) else {
            log::debug!("release of {} without a prior press", key);
            return ReleaseOutcome::Ignored;
        };

        let mut state = cell.lock();
        if !state.is_held {
            log::debug!("release of {} while not held", key);
            return ReleaseOutcome::Ignored;
        }

        state.is_held = false;
        let held = state.held_for(t);
        let generation = state.generation;

        self.scheduler.schedule_at(
            t + self.thresholds.double_window,
            confirm_single(
                cell.clone(),
                key.clone(),
                generation,
                held,
                self.thresholds.long_window,
                self.sink.clone(),
            ),
        );

        ReleaseOutcome::Pending { generation, held }
    }
}

/// Fires `long_window` after a press: a long press if still held
fn confirm_long(cell: KeyCell, key: KeyId, generation: u64, sink: Arc<dyn ActionSink>) -> Task {
    Box::new(move |fired_at| {
        let mut state = cell.lock();
        if !state.is_current(generation) {
            log::trace!("stale long confirmation for {} ({})", key, generation);
            return;
        }
        if state.is_held {
            state.suppress_single = true;
            log::info!("long press: {}", key);
            sink.emit(Action::on(key, ActionKind::Long, fired_at));
        }
    })
}

/// Fires `double_window` after a release: a single press unless the
/// instance was superseded, already resolved, or held too long
fn confirm_single(
    cell: KeyCell,
    key: KeyId,
    generation: u64,
    held: Duration,
    long_window: Duration,
    sink: Arc<dyn ActionSink>,
) -> Task {
    Box::new(move |fired_at| {
        let state = cell.lock();
        if !state.is_current(generation) {
            log::trace!("stale single confirmation for {} ({})", key, generation);
            return;
        }
        if !state.suppress_single && held < long_window {
            log::info!("single press: {}", key);
            sink.emit(Action::on(key, ActionKind::Single, fired_at));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<KeyId>>,
        actions: Mutex<Vec<Action>>,
    }

    impl ActionSink for RecordingSink {
        fn key_seen(&self, key: &KeyId) {
            self.seen.lock().push(key.clone());
        }

        fn emit(&self, action: Action) {
            self.actions.lock().push(action);
        }
    }

    fn setup() -> (Arc<ManualScheduler>, Arc<RecordingSink>, Classifier) {
        let scheduler = Arc::new(ManualScheduler::new());
        let sink = Arc::new(RecordingSink::default());
        let classifier = Classifier::new(Thresholds::default(), scheduler.clone(), sink.clone());
        (scheduler, sink, classifier)
    }

    fn kinds(sink: &RecordingSink) -> Vec<ActionKind> {
        sink.actions.lock().iter().map(|a| a.kind).collect()
    }

    #[test]
    fn press_starts_new_generation() {
        let (scheduler, _sink, classifier) = setup();
        let key = KeyId::from("A");

        let outcome = classifier.on_press(&key, scheduler.at_ms(0));
        assert_eq!(outcome, PressOutcome::Started { generation: 1 });

        let state = classifier.store().snapshot(&key).expect("state");
        assert!(state.is_held);
        assert!(!state.suppress_single);
        assert_eq!(state.last_press_time, Some(scheduler.at_ms(0)));
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn release_reports_held_duration() {
        let (scheduler, _sink, classifier) = setup();
        let key = KeyId::from("A");

        classifier.on_press(&key, scheduler.at_ms(0));
        let outcome = classifier.on_release(&key, scheduler.at_ms(80));
        assert_eq!(
            outcome,
            ReleaseOutcome::Pending {
                generation: 1,
                held: Duration::from_millis(80)
            }
        );
    }

    #[test]
    fn release_without_press_is_ignored() {
        let (scheduler, sink, classifier) = setup();
        let outcome = classifier.on_release(&KeyId::from("Z"), scheduler.at_ms(10));

        assert_eq!(outcome, ReleaseOutcome::Ignored);
        assert!(classifier.store().is_empty());
        assert!(sink.seen.lock().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn duplicate_release_is_ignored() {
        let (scheduler, sink, classifier) = setup();
        let key = KeyId::from("A");

        classifier.on_press(&key, scheduler.at_ms(0));
        classifier.on_release(&key, scheduler.at_ms(30));
        assert_eq!(
            classifier.on_release(&key, scheduler.at_ms(40)),
            ReleaseOutcome::Ignored
        );

        scheduler.advance_to(scheduler.at_ms(1000));
        assert_eq!(kinds(&sink), vec![ActionKind::Single]);
    }

    #[test]
    fn key_seen_reported_once() {
        let (scheduler, sink, classifier) = setup();
        let key = KeyId::from("A");

        classifier.on_press(&key, scheduler.at_ms(0));
        classifier.on_release(&key, scheduler.at_ms(10));
        classifier.on_press(&key, scheduler.at_ms(400));

        assert_eq!(*sink.seen.lock(), vec![key]);
    }

    #[test]
    fn double_marks_instance_resolved() {
        let (scheduler, sink, classifier) = setup();
        let key = KeyId::from("A");

        classifier.on_press(&key, scheduler.at_ms(0));
        classifier.on_release(&key, scheduler.at_ms(50));
        let outcome = classifier.on_press(&key, scheduler.at_ms(100));
        assert_eq!(outcome, PressOutcome::Double { generation: 2 });

        let state = classifier.store().snapshot(&key).expect("state");
        assert_eq!(state.last_press_time, None);
        assert!(state.suppress_single);
        assert!(state.is_held);

        let actions = sink.actions.lock().clone();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Double);
        assert_eq!(actions[0].phase, Phase::On);
        assert_eq!(actions[0].time, scheduler.at_ms(100));
    }

    #[test]
    fn stale_long_confirmation_is_noop() {
        let (scheduler, sink, classifier) = setup();
        let key = KeyId::from("A");

        // Double press, then hold the second press past the long window
        classifier.on_press(&key, scheduler.at_ms(0));
        classifier.on_release(&key, scheduler.at_ms(20));
        classifier.on_press(&key, scheduler.at_ms(60));
        scheduler.advance_to(scheduler.at_ms(2000));

        assert_eq!(kinds(&sink), vec![ActionKind::Double]);
    }

    #[test]
    fn long_hold_then_release_has_no_single() {
        let (scheduler, sink, classifier) = setup();
        let key = KeyId::from("A");

        classifier.on_press(&key, scheduler.at_ms(0));
        scheduler.advance_to(scheduler.at_ms(500));
        assert!(classifier.store().snapshot(&key).expect("state").suppress_single);

        classifier.on_release(&key, scheduler.at_ms(600));
        scheduler.advance_to(scheduler.at_ms(2000));

        assert_eq!(kinds(&sink), vec![ActionKind::Long]);
        assert_eq!(sink.actions.lock()[0].time, scheduler.at_ms(500));
    }

    #[test]
    fn handle_dispatches_by_transition() {
        let (scheduler, _sink, classifier) = setup();

        let press = RawEvent::press("A", scheduler.at_ms(0));
        let release = RawEvent::release("A", scheduler.at_ms(10));

        assert!(matches!(
            classifier.handle(&press),
            EventOutcome::Press(PressOutcome::Started { .. })
        ));
        assert!(matches!(
            classifier.handle(&release),
            EventOutcome::Release(ReleaseOutcome::Pending { .. })
        ));
    }

    #[test]
    fn same_instant_events_are_separate_instances() {
        let scheduler = Arc::new(ManualScheduler::new());
        let sink = Arc::new(RecordingSink::default());
        let thresholds = Thresholds::new(Duration::ZERO, Duration::from_millis(500));
        let classifier = Classifier::new(thresholds, scheduler.clone(), sink.clone());
        let key = KeyId::from("A");
        let t = scheduler.at_ms(0);

        assert_eq!(classifier.on_press(&key, t), PressOutcome::Started { generation: 1 });
        assert_eq!(
            classifier.on_release(&key, t),
            ReleaseOutcome::Pending {
                generation: 1,
                held: Duration::ZERO
            }
        );
        assert_eq!(classifier.on_press(&key, t), PressOutcome::Started { generation: 2 });

        scheduler.advance_to(scheduler.at_ms(2000));
        assert_eq!(kinds(&sink), vec![ActionKind::Long]);
        assert_eq!(sink.actions.lock()[0].time, scheduler.at_ms(500));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(sink.seen.lock().len(), 1);
    }
}
