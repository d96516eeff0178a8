use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{EngagementLevel, LogEntry, LogEntryType, TeachingAction, TeachingMode};

pub const SESSION_START_LABEL: &str = "開始觀課";
pub const NOTE_LABEL: &str = "質性筆記";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Ended,
}

/// Observer input accepted by the session state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    StartSession { subject: String },
    StopSession,
    ToggleMode { mode: TeachingMode },
    RecordAction { action: TeachingAction },
    RecordEngagement { level: EngagementLevel },
    RecordNote { text: String },
    AccrueTick,
    Reset,
}

/// What a command did to the state. Precondition violations come back as `Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Applied,
    SessionStarted,
    SessionEnded,
    ReminderDismissed,
    Reset,
}

/// Counter over a fixed universe of keys. There is no way to add or remove a
/// key after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tally<K: Ord>(BTreeMap<K, u64>);

impl<K: Ord + Copy> Tally<K> {
    fn zeroed(keys: &[K]) -> Self {
        Self(keys.iter().map(|key| (*key, 0)).collect())
    }

    pub fn get(&self, key: K) -> u64 {
        self.0.get(&key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        self.0.iter().map(|(key, value)| (*key, *value))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.0.keys().copied()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    fn increment(&mut self, key: K) {
        if let Some(count) = self.0.get_mut(&key) {
            *count = count.saturating_add(1);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservationState {
    pub is_session_active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub subject: Option<String>,
    pub current_mode: Option<TeachingMode>,
    pub mode_durations: Tally<TeachingMode>,
    pub action_counts: Tally<TeachingAction>,
    /// Newest first.
    pub logs: VecDeque<LogEntry>,
    /// Moved by observer commands only; ticks and engagement ratings leave it alone.
    pub last_interaction_time: DateTime<Utc>,
}

impl ObservationState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            is_session_active: false,
            start_time: None,
            end_time: None,
            subject: None,
            current_mode: None,
            mode_durations: Tally::zeroed(&TeachingMode::ALL),
            action_counts: Tally::zeroed(&TeachingAction::ALL),
            logs: VecDeque::new(),
            last_interaction_time: now,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.is_session_active, self.end_time) {
            (true, _) => SessionPhase::Active,
            (false, Some(_)) => SessionPhase::Ended,
            (false, None) => SessionPhase::Idle,
        }
    }

    pub fn apply(&mut self, command: &Command, now: DateTime<Utc>) -> Outcome {
        match command {
            Command::StartSession { subject } => self.begin_session(subject, now),
            Command::StopSession => self.stop_session(now),
            Command::ToggleMode { mode } => self.toggle_mode(*mode, now),
            Command::RecordAction { action } => self.record_action(*action, now),
            Command::RecordEngagement { level } => self.record_engagement(*level, now),
            Command::RecordNote { text } => self.record_note(text, now),
            Command::AccrueTick => self.accrue_tick(),
            Command::Reset => self.reset(now),
        }
    }

    pub fn begin_session(&mut self, subject: &str, now: DateTime<Utc>) -> Outcome {
        // An ended session has to be reset before a new one can start.
        if self.phase() != SessionPhase::Idle {
            return Outcome::Ignored;
        }

        self.is_session_active = true;
        self.start_time = Some(now);
        self.end_time = None;
        self.subject = Some(subject.to_string());
        self.last_interaction_time = now;
        self.push_log(LogEntry::new(
            LogEntryType::Note,
            SESSION_START_LABEL,
            Some(subject.to_string()),
            now,
        ));
        Outcome::SessionStarted
    }

    pub fn stop_session(&mut self, now: DateTime<Utc>) -> Outcome {
        if !self.is_session_active {
            return Outcome::Ignored;
        }

        self.is_session_active = false;
        self.end_time = Some(now);
        self.current_mode = None;
        self.last_interaction_time = now;
        Outcome::SessionEnded
    }

    /// Selecting the current mode again clears it. Switching straight from one
    /// mode to another only logs the switch, never an end entry for the old mode.
    pub fn toggle_mode(&mut self, mode: TeachingMode, now: DateTime<Utc>) -> Outcome {
        if !self.is_session_active {
            return Outcome::Ignored;
        }

        let name = if self.current_mode == Some(mode) {
            self.current_mode = None;
            format!("結束 {}", mode.label())
        } else {
            self.current_mode = Some(mode);
            format!("切換至 {}", mode.label())
        };

        self.last_interaction_time = now;
        self.push_log(LogEntry::new(LogEntryType::Mode, name, None, now));
        Outcome::Applied
    }

    pub fn record_action(&mut self, action: TeachingAction, now: DateTime<Utc>) -> Outcome {
        if !self.is_session_active {
            return Outcome::Ignored;
        }

        self.action_counts.increment(action);
        self.last_interaction_time = now;
        self.push_log(LogEntry::new(LogEntryType::Action, action.label(), None, now));
        Outcome::Applied
    }

    pub fn record_engagement(&mut self, level: EngagementLevel, now: DateTime<Utc>) -> Outcome {
        if !self.is_session_active {
            return Outcome::Ignored;
        }

        self.push_log(LogEntry::new(
            LogEntryType::Engagement,
            format!("專注度: {}", level.tier_label()),
            Some(level.as_str().to_string()),
            now,
        ));
        Outcome::ReminderDismissed
    }

    pub fn record_note(&mut self, text: &str, now: DateTime<Utc>) -> Outcome {
        let text = text.trim();
        if !self.is_session_active || text.is_empty() {
            return Outcome::Ignored;
        }

        self.last_interaction_time = now;
        self.push_log(LogEntry::new(
            LogEntryType::Note,
            NOTE_LABEL,
            Some(text.to_string()),
            now,
        ));
        Outcome::Applied
    }

    pub fn accrue_tick(&mut self) -> Outcome {
        match (self.is_session_active, self.current_mode) {
            (true, Some(mode)) => {
                self.mode_durations.increment(mode);
                Outcome::Applied
            }
            _ => Outcome::Ignored,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) -> Outcome {
        *self = Self::new(now);
        Outcome::Reset
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.logs.push_front(entry);
    }
}

/// Non-mutating form of [`ObservationState::apply`].
pub fn reduce(
    state: &ObservationState,
    command: &Command,
    now: DateTime<Utc>,
) -> (ObservationState, Outcome) {
    let mut next = state.clone();
    let outcome = next.apply(command, now);
    (next, outcome)
}
