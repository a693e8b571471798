//! Dashboard state

use crate::classifier::{Action, ActionKind, Phase, Thresholds};
use crate::config::Config;
use crate::keyboard::KeyId;
use crate::ui::ThemeColors;
use chrono::{DateTime, Local};
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

/// Dashboard running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Running,
    Quitting,
}

/// One emitted action as shown in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub key: KeyId,
    pub kind: ActionKind,
    pub phase: Phase,
    pub wall: DateTime<Local>,
}

impl LogEntry {
    pub fn clock(&self) -> String {
        self.wall.format("%H:%M:%S%.3f").to_string()
    }
}

/// Live view of what the classifier is doing
pub struct Dashboard {
    pub state: AppState,
    pub colors: ThemeColors,
    thresholds: Thresholds,
    capacity: usize,
    recent: VecDeque<LogEntry>,
    counts: [u64; 3],
    held: Vec<KeyId>,
    lit: BTreeSet<(KeyId, ActionKind)>,
    start_time: Instant,
    status_message: Option<String>,
    status_time: Option<Instant>,
}

fn slot(kind: ActionKind) -> usize {
    match kind {
        ActionKind::Single => 0,
        ActionKind::Double => 1,
        ActionKind::Long => 2,
    }
}

impl Dashboard {
    pub fn new(config: &Config) -> Self {
        Self {
            state: AppState::Running,
            colors: ThemeColors::from_theme(config.ui.theme),
            thresholds: config.thresholds(),
            capacity: config.ui.action_log_len.max(1),
            recent: VecDeque::new(),
            counts: [0; 3],
            held: Vec::new(),
            lit: BTreeSet::new(),
            start_time: Instant::now(),
            status_message: None,
            status_time: None,
        }
    }

    /// Fold an action edge into the view
    pub fn record(&mut self, action: &Action) {
        let pulse = (action.key.clone(), action.kind);
        match action.phase {
            Phase::On => {
                self.counts[slot(action.kind)] += 1;
                self.lit.insert(pulse);
            }
            Phase::Off => {
                self.lit.remove(&pulse);
            }
        }

        if self.recent.len() == self.capacity {
            self.recent.pop_back();
        }
        self.recent.push_front(LogEntry {
            key: action.key.clone(),
            kind: action.kind,
            phase: action.phase,
            wall: Local::now(),
        });
    }

    /// Replace the set of keys currently held down
    pub fn set_held(&mut self, held: Vec<KeyId>) {
        self.held = held;
    }

    pub fn held(&self) -> &[KeyId] {
        &self.held
    }

    /// Pulses that are ON right now
    pub fn lit(&self) -> impl Iterator<Item = &(KeyId, ActionKind)> {
        self.lit.iter()
    }

    /// Most recent first
    pub fn recent(&self) -> &VecDeque<LogEntry> {
        &self.recent
    }

    pub fn count(&self, kind: ActionKind) -> u64 {
        self.counts[slot(kind)]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Clear the log and counters
    pub fn reset(&mut self) {
        self.recent.clear();
        self.counts = [0; 3];
        self.set_status("Counters reset".to_string());
    }

    pub fn quit(&mut self) {
        self.state = AppState::Quitting;
    }

    pub fn set_status(&mut self, message: String) {
        self.status_message = Some(message);
        self.status_time = Some(Instant::now());
    }

    /// Get status message if still valid (within 3 seconds)
    pub fn get_status(&self) -> Option<&str> {
        match (&self.status_message, self.status_time) {
            (Some(msg), Some(time)) if time.elapsed().as_secs() < 3 => Some(msg),
            _ => None,
        }
    }

    /// Get elapsed time formatted
    pub fn elapsed_formatted(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}
