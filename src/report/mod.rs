//! Post-session report.
//!
//! `ObservationReport` is a read-only projection of an ended session. It
//! copies durations and counts straight out of the state, so nothing is
//! re-derived or adjusted after the fact. `export` turns a report into the
//! plain-text document observers copy or download.

pub mod export;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{LogEntry, TeachingAction, TeachingMode};
use crate::observation::{ObservationState, SessionPhase};

pub use export::{format_duration, render_text, write_report};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeDuration {
    pub mode: TeachingMode,
    pub secs: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionCount {
    pub action: TeachingAction,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservationReport {
    pub subject: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_secs: u64,
    pub mode_durations: Vec<ModeDuration>,
    pub action_counts: Vec<ActionCount>,
    /// Newest first, same order as the live log.
    pub events: Vec<LogEntry>,
}

impl ObservationReport {
    /// Returns `None` unless the session has ended.
    pub fn from_state(state: &ObservationState) -> Option<Self> {
        if state.phase() != SessionPhase::Ended {
            return None;
        }
        let started_at = state.start_time?;
        let ended_at = state.end_time?;

        // Wall clock can step backwards between start and stop.
        let total_secs = (ended_at - started_at).num_seconds().max(0) as u64;

        Some(Self {
            subject: state.subject.clone().unwrap_or_default(),
            started_at,
            ended_at,
            total_secs,
            mode_durations: state
                .mode_durations
                .iter()
                .map(|(mode, secs)| ModeDuration { mode, secs })
                .collect(),
            action_counts: state
                .action_counts
                .iter()
                .map(|(action, count)| ActionCount { action, count })
                .collect(),
            events: state.logs.iter().cloned().collect(),
        })
    }

    pub fn mode_secs(&self, mode: TeachingMode) -> u64 {
        self.mode_durations
            .iter()
            .find(|entry| entry.mode == mode)
            .map(|entry| entry.secs)
            .unwrap_or(0)
    }

    pub fn action_count(&self, action: TeachingAction) -> u64 {
        self.action_counts
            .iter()
            .find(|entry| entry.action == action)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }
}
