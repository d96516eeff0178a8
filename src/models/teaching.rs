use std::{fmt, str::FromStr};

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Mutually exclusive teaching activity that accrues time while selected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TeachingMode {
    Lecture,
    GroupDiscussion,
    HandsOn,
    DigitalTools,
    TeacherFeedback,
    TeacherPatrol,
}

impl TeachingMode {
    pub const ALL: [TeachingMode; 6] = [
        TeachingMode::Lecture,
        TeachingMode::GroupDiscussion,
        TeachingMode::HandsOn,
        TeachingMode::DigitalTools,
        TeachingMode::TeacherFeedback,
        TeachingMode::TeacherPatrol,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            TeachingMode::Lecture => "lecture",
            TeachingMode::GroupDiscussion => "group-discussion",
            TeachingMode::HandsOn => "hands-on",
            TeachingMode::DigitalTools => "digital-tools",
            TeachingMode::TeacherFeedback => "teacher-feedback",
            TeachingMode::TeacherPatrol => "teacher-patrol",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TeachingMode::Lecture => "講述教學",
            TeachingMode::GroupDiscussion => "小組討論",
            TeachingMode::HandsOn => "實作/演算",
            TeachingMode::DigitalTools => "數位運用",
            TeachingMode::TeacherFeedback => "教師回饋",
            TeachingMode::TeacherPatrol => "教師巡視",
        }
    }
}

/// Discrete, countable teaching behaviour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TeachingAction {
    PositiveReinforcement,
    Correction,
    OpenQuestion,
    ClosedQuestion,
    Circulating,
}

impl TeachingAction {
    pub const ALL: [TeachingAction; 5] = [
        TeachingAction::PositiveReinforcement,
        TeachingAction::Correction,
        TeachingAction::OpenQuestion,
        TeachingAction::ClosedQuestion,
        TeachingAction::Circulating,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            TeachingAction::PositiveReinforcement => "positive-reinforcement",
            TeachingAction::Correction => "correction",
            TeachingAction::OpenQuestion => "open-question",
            TeachingAction::ClosedQuestion => "closed-question",
            TeachingAction::Circulating => "circulating",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TeachingAction::PositiveReinforcement => "正向鼓勵",
            TeachingAction::Correction => "糾正規範",
            TeachingAction::OpenQuestion => "開放提問",
            TeachingAction::ClosedQuestion => "封閉提問",
            TeachingAction::Circulating => "巡視走動",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::High => "high",
            EngagementLevel::Medium => "medium",
            EngagementLevel::Low => "low",
        }
    }

    /// Localized tier name shown in the log stream.
    pub fn tier_label(&self) -> &'static str {
        match self {
            EngagementLevel::High => "高",
            EngagementLevel::Medium => "中",
            EngagementLevel::Low => "低",
        }
    }
}

// Console input accepts either the slug or the display label.

impl FromStr for TeachingMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        TeachingMode::ALL
            .into_iter()
            .find(|mode| mode.slug().eq_ignore_ascii_case(value) || mode.label() == value)
            .ok_or_else(|| anyhow!("unknown teaching mode '{value}'"))
    }
}

impl FromStr for TeachingAction {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        TeachingAction::ALL
            .into_iter()
            .find(|action| action.slug().eq_ignore_ascii_case(value) || action.label() == value)
            .ok_or_else(|| anyhow!("unknown teaching action '{value}'"))
    }
}

impl FromStr for EngagementLevel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "高" => Ok(EngagementLevel::High),
            "medium" | "mid" | "中" => Ok(EngagementLevel::Medium),
            "low" | "低" => Ok(EngagementLevel::Low),
            other => Err(anyhow!("unknown engagement level '{other}'")),
        }
    }
}

impl fmt::Display for TeachingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for TeachingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
