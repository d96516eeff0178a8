use chrono::{DateTime, Duration, Utc};

use super::state::ObservationState;

pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Derives the observer-inactivity reminder from the session state.
///
/// Rating engagement dismisses the reminder without moving
/// `last_interaction_time`, so the monitor remembers which interaction time the
/// dismissal applied to. Once an observer command moves that time the
/// dismissal no longer matches and staleness is judged afresh.
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    threshold: Duration,
    dismissed_for: Option<DateTime<Utc>>,
    reminder_active: bool,
}

impl IdleMonitor {
    pub fn new(threshold_secs: u64) -> Self {
        Self {
            // chrono durations top out at i64::MAX milliseconds.
            threshold: Duration::seconds(threshold_secs.min(i64::MAX as u64 / 1_000) as i64),
            dismissed_for: None,
            reminder_active: false,
        }
    }

    pub fn reminder_active(&self) -> bool {
        self.reminder_active
    }

    /// Pure staleness check against `now`.
    pub fn evaluate(&self, state: &ObservationState, now: DateTime<Utc>) -> bool {
        if !state.is_session_active {
            return false;
        }
        if self.dismissed_for == Some(state.last_interaction_time) {
            return false;
        }
        now - state.last_interaction_time > self.threshold
    }

    /// Recomputes the flag. Returns `Some(active)` only when it flipped.
    pub fn poll(&mut self, state: &ObservationState, now: DateTime<Utc>) -> Option<bool> {
        let active = self.evaluate(state, now);
        if active == self.reminder_active {
            return None;
        }
        self.reminder_active = active;
        Some(active)
    }

    /// Returns true when a visible reminder was cleared.
    pub fn dismiss(&mut self, state: &ObservationState) -> bool {
        self.dismissed_for = Some(state.last_interaction_time);
        std::mem::replace(&mut self.reminder_active, false)
    }

    pub fn clear(&mut self) {
        self.dismissed_for = None;
        self.reminder_active = false;
    }
}

impl Default for IdleMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_THRESHOLD_SECS)
    }
}
