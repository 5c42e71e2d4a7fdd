use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the controller is in its flat / in-position / cooldown cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Flat,
    InPosition,
    Cooldown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Flat => f.write_str("Flat"),
            Phase::InPosition => f.write_str("InPosition"),
            Phase::Cooldown => f.write_str("Cooldown"),
        }
    }
}

/// Process-lifetime state of one controller; never persisted
///
/// A deadline is present exactly when the phase is `Cooldown`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    instrument: String,
    phase: Phase,
    cooldown_deadline: Option<DateTime<Utc>>,
}

impl ControllerState {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            phase: Phase::Flat,
            cooldown_deadline: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cooldown_deadline(&self) -> Option<DateTime<Utc>> {
        self.cooldown_deadline
    }

    /// Time left until the cooldown ends, None when not cooling down or already due
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.cooldown_deadline
            .filter(|deadline| now < *deadline)
            .map(|deadline| deadline - now)
    }

    pub(crate) fn enter_flat(&mut self) {
        self.phase = Phase::Flat;
        self.cooldown_deadline = None;
    }

    pub(crate) fn enter_in_position(&mut self) {
        self.phase = Phase::InPosition;
        self.cooldown_deadline = None;
    }

    pub(crate) fn enter_cooldown(&mut self, deadline: DateTime<Utc>) {
        self.phase = Phase::Cooldown;
        self.cooldown_deadline = Some(deadline);
    }
}
