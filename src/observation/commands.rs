//! Console front end: turns typed lines into controller commands.

use std::fmt::Write as _;

use anyhow::{anyhow, bail, Result};

use crate::models::{EngagementLevel, TeachingAction, TeachingMode};
use crate::report::format_duration;
use crate::settings::ObserverSettings;

use super::{controller::ObservationSnapshot, state::Command};

pub const HELP: &str = "\
commands:
  start [subject]        begin observing (defaults to the configured subject)
  default <subject>      change the configured subject
  stop                   end the session and show the report
  mode <mode>            toggle a teaching mode
  action <action>        tally a teaching action
  engage <high|medium|low>
  note <text>            add a qualitative note
  reset confirm          discard everything and return to idle
  status | report | export | subjects | help | quit";

/// A parsed console line. Everything that is not a state-machine command is
/// handled by the console itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Observe(Command),
    Status,
    Report,
    Export,
    Subjects,
    SetDefaultSubject(String),
    Help,
    Quit,
}

pub fn parse_line(line: &str, settings: &ObserverSettings) -> Result<Option<ConsoleInput>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "start" => {
            let subject = if rest.is_empty() {
                settings.default_subject.as_str()
            } else {
                known_subject(rest, settings)?
            };
            ConsoleInput::Observe(Command::StartSession {
                subject: subject.to_string(),
            })
        }
        "default" => ConsoleInput::SetDefaultSubject(
            known_subject(required(rest, "subject")?, settings)?.to_string(),
        ),
        "stop" => ConsoleInput::Observe(Command::StopSession),
        "mode" => ConsoleInput::Observe(Command::ToggleMode {
            mode: required(rest, "mode")?.parse::<TeachingMode>()?,
        }),
        "action" => ConsoleInput::Observe(Command::RecordAction {
            action: required(rest, "action")?.parse::<TeachingAction>()?,
        }),
        "engage" => ConsoleInput::Observe(Command::RecordEngagement {
            level: required(rest, "engagement level")?.parse::<EngagementLevel>()?,
        }),
        // Blank notes are passed through; the state machine ignores them.
        "note" => ConsoleInput::Observe(Command::RecordNote {
            text: rest.to_string(),
        }),
        "reset" => {
            if rest != "confirm" {
                bail!("reset discards the whole session; type `reset confirm` to proceed");
            }
            ConsoleInput::Observe(Command::Reset)
        }
        "status" => ConsoleInput::Status,
        "report" => ConsoleInput::Report,
        "export" => ConsoleInput::Export,
        "subjects" => ConsoleInput::Subjects,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        other => return Err(anyhow!("unknown command '{other}' (try `help`)")),
    };

    Ok(Some(input))
}

fn known_subject<'a>(subject: &'a str, settings: &ObserverSettings) -> Result<&'a str> {
    if !settings.subjects.iter().any(|known| known == subject) {
        bail!(
            "unknown subject '{subject}' (one of: {})",
            settings.subjects.join(" ")
        );
    }
    Ok(subject)
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.is_empty() {
        bail!("missing {what}");
    }
    Ok(value)
}

/// Compact view of a snapshot for the console.
pub fn format_status(snapshot: &ObservationSnapshot) -> String {
    let state = &snapshot.state;
    let mut text = String::new();

    let _ = write!(text, "[{:?}]", snapshot.phase);
    if let Some(subject) = &state.subject {
        let _ = write!(text, " {subject}");
    }
    match state.current_mode {
        Some(mode) => {
            let _ = write!(text, " | now: {}", mode.label());
        }
        None => text.push_str(" | now: -"),
    }
    if snapshot.reminder_active {
        text.push_str(" | !! check in");
    }
    text.push('\n');

    let modes: Vec<String> = state
        .mode_durations
        .iter()
        .map(|(mode, secs)| format!("{} {}", mode.label(), format_duration(secs)))
        .collect();
    let _ = writeln!(text, "  modes:   {}", modes.join(" | "));

    let actions: Vec<String> = state
        .action_counts
        .iter()
        .map(|(action, count)| format!("{} {}", action.label(), count))
        .collect();
    let _ = writeln!(text, "  actions: {}", actions.join(" | "));

    if let Some(entry) = state.logs.front() {
        let _ = write!(
            text,
            "  latest:  {} [{}] {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.kind.as_str(),
            entry.name
        );
        if let Some(value) = &entry.value {
            let _ = write!(text, " >> {value}");
        }
        text.push('\n');
    }

    text
}
