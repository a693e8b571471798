//! Per-key classification state
//!
//! Each key gets its own lock, so operations on one key never contend with
//! another key. The outer map lock is only held long enough to find or
//! create a key's cell.

use crate::keyboard::KeyId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of a single key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    /// Time of the most recent unconsumed press, for double press detection
    pub last_press_time: Option<Instant>,
    /// Start of the current press instance
    pub press_start: Option<Instant>,
    /// Whether the current press instance is still held down
    pub is_held: bool,
    /// Set once the current instance resolved as long or double
    pub suppress_single: bool,
    /// Incremented on every press; stale confirmations compare against it
    pub generation: u64,
}

impl KeyState {
    /// Start a new press instance and return its generation
    pub fn advance_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Whether `generation` still names the current press instance
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Time since the current press instance started
    pub fn held_for(&self, now: Instant) -> Duration {
        self.press_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }
}

/// Shared handle to one key's state
pub type KeyCell = Arc<Mutex<KeyState>>;

/// Map from key identifier to its state, created on demand
#[derive(Debug, Default)]
pub struct KeyStateStore {
    keys: RwLock<HashMap<KeyId, KeyCell>>,
}

impl KeyStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cell for a key if it has been seen before
    pub fn get(&self, key: &KeyId) -> Option<KeyCell> {
        self.keys.read().get(key).cloned()
    }

    /// Get the cell for a key, creating it if needed.
    ///
    /// The second value is `true` when the cell was created by this call.
    pub fn get_or_insert(&self, key: &KeyId) -> (KeyCell, bool) {
        if let Some(cell) = self.get(key) {
            return (cell, false);
        }

        let mut keys = self.keys.write();
        // Another thread may have inserted it between the two locks
        if let Some(cell) = keys.get(key) {
            return (cell.clone(), false);
        }
        let cell = KeyCell::default();
        keys.insert(key.clone(), cell.clone());
        (cell, true)
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Keys whose current press instance is still held, sorted by name
    pub fn held_keys(&self) -> Vec<KeyId> {
        let mut held: Vec<KeyId> = self
            .keys
            .read()
            .iter()
            .filter(|(_, cell)| cell.lock().is_held)
            .map(|(key, _)| key.clone())
            .collect();
        held.sort();
        held
    }

    /// Copy of a key's current state
    pub fn snapshot(&self, key: &KeyId) -> Option<KeyState> {
        self.get(key).map(|cell| cell.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_creates_once() {
        let store = KeyStateStore::new();
        let key = KeyId::from("A");

        let (first, created) = store.get_or_insert(&key);
        assert!(created);
        let (second, created) = store.get_or_insert(&key);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_key_has_no_state() {
        let store = KeyStateStore::new();
        assert!(store.get(&KeyId::from("B")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn generation_advances_per_press() {
        let mut state = KeyState::default();
        let g1 = state.advance_generation();
        let g2 = state.advance_generation();
        assert_eq!(g2, g1 + 1);
        assert!(state.is_current(g2));
        assert!(!state.is_current(g1));
    }

    #[test]
    fn held_keys_lists_only_held() {
        let store = KeyStateStore::new();
        let (a, _) = store.get_or_insert(&KeyId::from("A"));
        let (_b, _) = store.get_or_insert(&KeyId::from("B"));
        a.lock().is_held = true;

        assert_eq!(store.held_keys(), vec![KeyId::from("A")]);
    }

    #[test]
    fn held_for_measures_from_press_start() {
        let start = Instant::now();
        let mut state = KeyState::default();
        assert_eq!(state.held_for(start), Duration::ZERO);

        state.press_start = Some(start);
        assert_eq!(
            state.held_for(start + Duration::from_millis(40)),
            Duration::from_millis(40)
        );
    }
}
