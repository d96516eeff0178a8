pub mod models;
pub mod observation;
pub mod report;
pub mod settings;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};

use observation::{
    commands::{format_status, parse_line, ConsoleInput, HELP},
    ObserverEvent, SessionController,
};
use report::{render_text, write_report};
use settings::{ObserverSettings, SettingsStore};

pub(crate) struct AppState {
    pub(crate) controller: SessionController,
    pub(crate) settings: SettingsStore,
}

pub fn run() -> Result<()> {
    let debug_mode = std::env::var("CHRONOS_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    info!("Chronos observer starting up...");

    let settings_store = SettingsStore::new(SettingsStore::default_path())?;
    let settings = settings_store.get();
    let state = AppState {
        controller: SessionController::new(&settings),
        settings: settings_store,
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(console_loop(state))
}

async fn console_loop(state: AppState) -> Result<()> {
    let printer = spawn_event_printer(&state.controller);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{HELP}");
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let settings = state.settings.get();
        match parse_line(&line, &settings) {
            Ok(None) => continue,
            Ok(Some(ConsoleInput::Quit)) => break,
            Ok(Some(input)) => handle_input(&state, &settings, input).await,
            Err(err) => println!("{err}"),
        }
    }

    state.controller.shutdown().await;
    printer.abort();
    info!("Chronos observer shutting down");
    Ok(())
}

async fn handle_input(state: &AppState, settings: &ObserverSettings, input: ConsoleInput) {
    let controller = &state.controller;

    match input {
        ConsoleInput::Observe(command) => {
            let snapshot = controller.dispatch(command).await;
            print!("{}", format_status(&snapshot));
        }
        ConsoleInput::Status => {
            print!("{}", format_status(&controller.get_snapshot().await));
        }
        ConsoleInput::Report => match controller.report().await {
            Some(report) => print!("{}", render_text(&report)),
            None => println!("no report yet: stop the session first"),
        },
        ConsoleInput::Export => match controller.report().await {
            Some(report) => match write_report(&report, &settings.report_dir) {
                Ok(path) => println!("saved {}", path.display()),
                Err(err) => {
                    error!("Report export failed: {err:#}");
                    println!("export failed: {err:#}");
                }
            },
            None => println!("no report yet: stop the session first"),
        },
        ConsoleInput::Subjects => println!("{}", settings.subjects.join(" ")),
        ConsoleInput::SetDefaultSubject(subject) => {
            let updated = ObserverSettings {
                default_subject: subject,
                ..settings.clone()
            };
            match state.settings.update(updated) {
                Ok(()) => {
                    let subject = state.settings.get().default_subject;
                    println!("default subject is now {subject}");
                }
                Err(err) => {
                    error!("Saving settings failed: {err:#}");
                    println!("could not save settings: {err:#}");
                }
            }
        }
        ConsoleInput::Help => println!("{HELP}"),
        ConsoleInput::Quit => {}
    }
}

fn spawn_event_printer(controller: &SessionController) -> JoinHandle<()> {
    let mut events = controller.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ObserverEvent::ReminderChanged { active: true }) => {
                    println!("!! no observer input for a while: rate engagement to check in");
                }
                Ok(ObserverEvent::SessionEnded { report }) => {
                    println!("--- MISSION COMPLETE ---");
                    print!("{}", render_text(&report));
                    println!("(`export` to save, `reset confirm` for a new session)");
                }
                Ok(ObserverEvent::ReminderChanged { active: false })
                | Ok(ObserverEvent::StateChanged(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event printer lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
