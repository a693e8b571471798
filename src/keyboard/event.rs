//! Raw key transition events and the polling fallback listener

use super::KeyId;
use device_query::{DeviceQuery, DeviceState};
use std::sync::mpsc;
use std::time::Instant;

/// Physical key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Key went down
    Press,
    /// Key came up
    Release,
}

/// A key transition with the time it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub key: KeyId,
    pub transition: Transition,
    pub time: Instant,
}

impl RawEvent {
    pub fn new(key: KeyId, transition: Transition, time: Instant) -> Self {
        Self {
            key,
            transition,
            time,
        }
    }

    pub fn press(key: impl Into<KeyId>, time: Instant) -> Self {
        Self::new(key.into(), Transition::Press, time)
    }

    pub fn release(key: impl Into<KeyId>, time: Instant) -> Self {
        Self::new(key.into(), Transition::Release, time)
    }
}

/// Keyboard listener that polls for key state changes.
///
/// Used where raw device access is unavailable. It diffs the set of held
/// keys between polls, so transitions shorter than the poll interval are
/// lost.
pub struct KeyboardListener {
    device_state: DeviceState,
    last_keys: Vec<device_query::Keycode>,
    event_tx: mpsc::Sender<RawEvent>,
}

impl KeyboardListener {
    pub fn new(event_tx: mpsc::Sender<RawEvent>) -> Self {
        Self {
            device_state: DeviceState::new(),
            last_keys: Vec::new(),
            event_tx,
        }
    }

    /// Poll for keyboard state changes.
    /// Returns the number of events generated.
    pub fn poll(&mut self) -> usize {
        let now = Instant::now();
        let current_keys = self.device_state.get_keys();
        let mut event_count = 0;

        for key in &current_keys {
            if !self.last_keys.contains(key) {
                let event = RawEvent::new(KeyId::from_keycode(*key), Transition::Press, now);
                let _ = self.event_tx.send(event);
                event_count += 1;
            }
        }

        for key in &self.last_keys {
            if !current_keys.contains(key) {
                let event = RawEvent::new(KeyId::from_keycode(*key), Transition::Release, now);
                let _ = self.event_tx.send(event);
                event_count += 1;
            }
        }

        self.last_keys = current_keys;
        event_count
    }
}
