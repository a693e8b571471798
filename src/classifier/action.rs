//! Semantic actions produced by the classifier

use crate::keyboard::KeyId;
use std::fmt;
use std::time::Instant;

/// What kind of press was recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Single,
    Double,
    Long,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[Self::Single, Self::Double, Self::Long]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pulse edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    On,
    Off,
}

impl Phase {
    /// Payload used on the wire for this edge
    pub fn payload(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

/// A classified press, emitted once and consumed by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub key: KeyId,
    pub kind: ActionKind,
    pub phase: Phase,
    pub time: Instant,
}

impl Action {
    pub fn new(key: KeyId, kind: ActionKind, phase: Phase, time: Instant) -> Self {
        Self {
            key,
            kind,
            phase,
            time,
        }
    }

    pub fn on(key: KeyId, kind: ActionKind, time: Instant) -> Self {
        Self::new(key, kind, Phase::On, time)
    }

    /// The matching "off" edge of this action at `time`
    pub fn to_off(&self, time: Instant) -> Self {
        Self::new(self.key.clone(), self.kind, Phase::Off, time)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.key, self.kind, self.phase.payload())
    }
}
