use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex, Notify},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{report::ObservationReport, settings::ObserverSettings};

use super::{
    idle::IdleMonitor,
    state::{Command, ObservationState, Outcome, SessionPhase},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Source of "now" for every command and tick.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationSnapshot {
    pub state: ObservationState,
    pub phase: SessionPhase,
    pub reminder_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ObserverEvent {
    StateChanged(ObservationSnapshot),
    ReminderChanged { active: bool },
    SessionEnded { report: ObservationReport },
}

struct Session {
    observation: ObservationState,
    idle: IdleMonitor,
}

impl Session {
    fn snapshot(&self) -> ObservationSnapshot {
        ObservationSnapshot {
            phase: self.observation.phase(),
            reminder_active: self.idle.reminder_active(),
            state: self.observation.clone(),
        }
    }
}

/// Everything the ticker and idle tasks share with the controller. Commands,
/// ticks and idle polls all go through the one `session` lock.
struct Shared {
    session: Mutex<Session>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ObserverEvent>,
    mode_changed: Notify,
}

impl Shared {
    fn emit(&self, event: ObserverEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn accrue_tick(&self) -> Outcome {
        let snapshot = {
            let mut session = self.session.lock().await;
            if session.observation.accrue_tick() == Outcome::Ignored {
                return Outcome::Ignored;
            }
            session.snapshot()
        };
        self.emit(ObserverEvent::StateChanged(snapshot));
        Outcome::Applied
    }

    async fn poll_idle(&self) -> bool {
        let now = self.clock.now();
        let (flipped, active) = {
            let mut guard = self.session.lock().await;
            let Session { observation, idle } = &mut *guard;
            (idle.poll(observation, now), idle.reminder_active())
        };

        match flipped {
            Some(active) => {
                info!("Idle reminder {}", if active { "raised" } else { "cleared" });
                self.emit(ObserverEvent::ReminderChanged { active });
            }
            None => debug!("Idle poll: reminder_active={active}"),
        }
        active
    }
}

struct Schedules {
    cancel_token: CancellationToken,
    ticker: JoinHandle<()>,
    idle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
    schedules: Arc<Mutex<Option<Schedules>>>,
    tick_interval: Duration,
    idle_poll_interval: Duration,
}

impl SessionController {
    pub fn new(settings: &ObserverSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &ObserverSettings, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Session {
            observation: ObservationState::new(clock.now()),
            idle: IdleMonitor::new(settings.idle_threshold_secs),
        };

        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                clock,
                events,
                mode_changed: Notify::new(),
            }),
            schedules: Arc::new(Mutex::new(None)),
            tick_interval: settings.tick_interval(),
            idle_poll_interval: settings.idle_poll_interval(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.shared.events.subscribe()
    }

    pub async fn get_snapshot(&self) -> ObservationSnapshot {
        self.shared.session.lock().await.snapshot()
    }

    pub async fn report(&self) -> Option<ObservationReport> {
        let session = self.shared.session.lock().await;
        ObservationReport::from_state(&session.observation)
    }

    /// Applies one observer command. Precondition violations leave the state
    /// untouched and emit nothing.
    ///
    /// The schedules lock is held for the whole call so the ticker and idle
    /// tasks always match the phase the command left behind.
    pub async fn dispatch(&self, command: Command) -> ObservationSnapshot {
        let mut schedules = self.schedules.lock().await;
        let now = self.shared.clock.now();

        let (outcome, snapshot, reminder_cleared, mode_changed, report) = {
            let mut guard = self.shared.session.lock().await;
            let Session { observation, idle } = &mut *guard;

            let mode_before = observation.current_mode;
            let outcome = observation.apply(&command, now);
            let reminder_cleared = match outcome {
                Outcome::ReminderDismissed => idle.dismiss(observation),
                Outcome::SessionStarted | Outcome::Reset => {
                    let was_active = idle.reminder_active();
                    idle.clear();
                    was_active
                }
                Outcome::SessionEnded => idle.poll(observation, now) == Some(false),
                Outcome::Applied | Outcome::Ignored => false,
            };
            let mode_changed = observation.current_mode != mode_before;
            let report = match outcome {
                Outcome::SessionEnded => ObservationReport::from_state(observation),
                _ => None,
            };

            (outcome, guard.snapshot(), reminder_cleared, mode_changed, report)
        };

        match outcome {
            Outcome::Ignored => {
                debug!("Ignored {command:?} in phase {:?}", snapshot.phase);
                return snapshot;
            }
            Outcome::SessionStarted => {
                info!(
                    "Observation started (subject={})",
                    snapshot.state.subject.as_deref().unwrap_or_default()
                );
                self.spawn_schedules(&mut schedules);
            }
            Outcome::SessionEnded => {
                info!("Observation ended after {} log entries", snapshot.state.logs.len());
                cancel_schedules(&mut schedules).await;
            }
            Outcome::Reset => {
                info!("Observation state reset");
                cancel_schedules(&mut schedules).await;
            }
            Outcome::Applied | Outcome::ReminderDismissed => {
                if mode_changed {
                    // Re-phase the ticker so a mode gets a full period before its first second.
                    self.shared.mode_changed.notify_one();
                }
            }
        }
        drop(schedules);

        if reminder_cleared {
            self.shared.emit(ObserverEvent::ReminderChanged { active: false });
        }
        self.shared.emit(ObserverEvent::StateChanged(snapshot.clone()));
        if let Some(report) = report {
            self.shared.emit(ObserverEvent::SessionEnded { report });
        }

        snapshot
    }

    /// One second of accrual. Driven by the ticker task; public so a host
    /// with its own scheduler can drive it instead.
    pub async fn accrue_tick(&self) -> Outcome {
        self.shared.accrue_tick().await
    }

    /// Recomputes the idle reminder and returns the current flag.
    pub async fn poll_idle(&self) -> bool {
        self.shared.poll_idle().await
    }

    pub async fn shutdown(&self) {
        cancel_schedules(&mut *self.schedules.lock().await).await;
    }

    fn spawn_schedules(&self, slot: &mut Option<Schedules>) {
        if let Some(previous) = slot.take() {
            previous.cancel_token.cancel();
            previous.ticker.abort();
            previous.idle.abort();
        }

        let cancel_token = CancellationToken::new();
        let ticker = tokio::spawn(ticker_loop(
            self.shared.clone(),
            self.tick_interval,
            cancel_token.clone(),
        ));
        let idle = tokio::spawn(idle_loop(
            self.shared.clone(),
            self.idle_poll_interval,
            cancel_token.clone(),
        ));

        *slot = Some(Schedules {
            cancel_token,
            ticker,
            idle,
        });
    }
}

async fn cancel_schedules(slot: &mut Option<Schedules>) {
    let Some(schedules) = slot.take() else {
        return;
    };
    schedules.cancel_token.cancel();

    for (name, handle) in [("ticker", schedules.ticker), ("idle monitor", schedules.idle)] {
        if let Err(err) = handle
            .await
            .with_context(|| format!("{name} task failed to join"))
        {
            error!("{err:#}");
        }
    }
}

async fn ticker_loop(shared: Arc<Shared>, period: Duration, cancel_token: CancellationToken) {
    // Burst keeps the per-mode seconds honest if the runtime stalls.
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                shared.accrue_tick().await;
            }
            _ = shared.mode_changed.notified() => {
                interval.reset();
            }
            _ = cancel_token.cancelled() => {
                debug!("ticker shutting down");
                break;
            }
        }
    }
}

async fn idle_loop(shared: Arc<Shared>, period: Duration, cancel_token: CancellationToken) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                shared.poll_idle().await;
            }
            _ = cancel_token.cancelled() => {
                debug!("idle monitor shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngagementLevel, TeachingAction, TeachingMode};
    use std::sync::Mutex as StdMutex;

    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(secs: i64) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(instant(secs))))
        }

        fn set(&self, secs: i64) {
            *self.0.lock().unwrap() = instant(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn instant(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    // Background schedules effectively off; tests drive ticks and polls by hand.
    fn controller(clock: Arc<ManualClock>) -> SessionController {
        let settings = ObserverSettings {
            tick_interval_ms: 3_600_000,
            idle_poll_interval_secs: 3_600,
            ..ObserverSettings::default()
        };
        SessionController::with_clock(&settings, clock)
    }

    fn drain(rx: &mut broadcast::Receiver<ObserverEvent>) -> Vec<ObserverEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn start(subject: &str) -> Command {
        Command::StartSession {
            subject: subject.into(),
        }
    }

    #[tokio::test]
    async fn commands_use_injected_clock() {
        let clock = ManualClock::at(0);
        let controller = controller(clock.clone());

        clock.set(12);
        let snapshot = controller.dispatch(start("Math")).await;
        assert_eq!(snapshot.phase, SessionPhase::Active);
        assert_eq!(snapshot.state.start_time, Some(instant(12)));
        assert_eq!(snapshot.state.logs[0].timestamp, instant(12));

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn manual_ticks_accrue_only_for_current_mode() {
        let controller = controller(ManualClock::at(0));
        assert_eq!(controller.accrue_tick().await, Outcome::Ignored);

        controller.dispatch(start("Math")).await;
        assert_eq!(controller.accrue_tick().await, Outcome::Ignored);

        controller
            .dispatch(Command::ToggleMode {
                mode: TeachingMode::Lecture,
            })
            .await;
        for _ in 0..10 {
            assert_eq!(controller.accrue_tick().await, Outcome::Applied);
        }

        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.mode_durations.get(TeachingMode::Lecture), 10);
        assert_eq!(snapshot.state.mode_durations.total(), 10);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn ignored_commands_emit_nothing() {
        let controller = controller(ManualClock::at(0));
        let mut rx = controller.subscribe();

        controller.dispatch(Command::StopSession).await;
        controller
            .dispatch(Command::RecordAction {
                action: TeachingAction::Correction,
            })
            .await;

        assert!(drain(&mut rx).is_empty());
        assert!(controller.report().await.is_none());
    }

    #[tokio::test]
    async fn stopping_emits_state_then_report() {
        let clock = ManualClock::at(0);
        let controller = controller(clock.clone());
        controller.dispatch(start("英文")).await;
        controller
            .dispatch(Command::RecordAction {
                action: TeachingAction::OpenQuestion,
            })
            .await;

        let mut rx = controller.subscribe();
        clock.set(90);
        let snapshot = controller.dispatch(Command::StopSession).await;
        assert_eq!(snapshot.phase, SessionPhase::Ended);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ObserverEvent::StateChanged(_)));
        match &events[1] {
            ObserverEvent::SessionEnded { report } => {
                assert_eq!(report.subject, "英文");
                assert_eq!(report.total_secs, 90);
                assert_eq!(report.action_count(TeachingAction::OpenQuestion), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn engagement_dismisses_reminder_until_next_staleness() {
        let clock = ManualClock::at(0);
        let controller = controller(clock.clone());
        controller.dispatch(start("Math")).await;
        let mut rx = controller.subscribe();

        clock.set(310);
        assert!(controller.poll_idle().await);

        clock.set(311);
        let snapshot = controller
            .dispatch(Command::RecordEngagement {
                level: EngagementLevel::High,
            })
            .await;
        assert!(!snapshot.reminder_active);
        assert_eq!(snapshot.state.last_interaction_time, instant(0));

        clock.set(320);
        assert!(!controller.poll_idle().await);

        let reminders: Vec<bool> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                ObserverEvent::ReminderChanged { active } => Some(active),
                _ => None,
            })
            .collect();
        assert_eq!(reminders, [true, false]);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn reset_returns_to_idle_and_clears_reminder() {
        let clock = ManualClock::at(0);
        let controller = controller(clock.clone());
        controller.dispatch(start("Math")).await;
        clock.set(400);
        assert!(controller.poll_idle().await);

        let snapshot = controller.dispatch(Command::Reset).await;
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert!(!snapshot.reminder_active);
        assert!(snapshot.state.logs.is_empty());
        assert_eq!(snapshot.state.last_interaction_time, instant(400));

        let again = controller.dispatch(Command::Reset).await;
        assert_eq!(again.state, snapshot.state);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_task_accrues_every_second_while_active() {
        let controller =
            SessionController::with_clock(&ObserverSettings::default(), ManualClock::at(0));
        controller.dispatch(start("Math")).await;
        controller
            .dispatch(Command::ToggleMode {
                mode: TeachingMode::HandsOn,
            })
            .await;

        time::sleep(Duration::from_millis(3_500)).await;
        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.mode_durations.get(TeachingMode::HandsOn), 3);

        controller.dispatch(Command::StopSession).await;
        time::sleep(Duration::from_secs(5)).await;
        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.mode_durations.get(TeachingMode::HandsOn), 3);
        assert!(controller.schedules.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mode_toggle_restarts_the_tick_period() {
        let controller =
            SessionController::with_clock(&ObserverSettings::default(), ManualClock::at(0));
        let lecture = Command::ToggleMode {
            mode: TeachingMode::Lecture,
        };
        controller.dispatch(start("Math")).await;

        // On at 0.9 s, off at 1.1 s: the session's 1 s boundary falls inside.
        time::sleep(Duration::from_millis(900)).await;
        controller.dispatch(lecture.clone()).await;
        time::sleep(Duration::from_millis(200)).await;
        controller.dispatch(lecture.clone()).await;

        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.mode_durations.get(TeachingMode::Lecture), 0);

        controller.dispatch(lecture).await;
        time::sleep(Duration::from_millis(2_500)).await;
        let snapshot = controller.get_snapshot().await;
        assert_eq!(snapshot.state.mode_durations.get(TeachingMode::Lecture), 2);

        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_task_raises_reminder_on_its_own() {
        let clock = ManualClock::at(0);
        let controller = SessionController::with_clock(&ObserverSettings::default(), clock.clone());
        controller.dispatch(start("Math")).await;
        let mut rx = controller.subscribe();

        time::sleep(Duration::from_secs(11)).await;
        assert!(!controller.get_snapshot().await.reminder_active);

        clock.set(301);
        time::sleep(Duration::from_secs(10)).await;

        let raised = drain(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, ObserverEvent::ReminderChanged { active: true }))
            .count();
        assert_eq!(raised, 1);
        assert!(controller.get_snapshot().await.reminder_active);

        controller.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_start_and_reset_keep_schedules_in_step() {
        let controller = controller(ManualClock::at(0));

        for _ in 0..2_000 {
            controller.dispatch(start("Math")).await;
            controller.dispatch(Command::StopSession).await;

            let resetting = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.dispatch(Command::Reset).await })
            };
            let starting = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.dispatch(start("Math")).await })
            };
            resetting.await.unwrap();
            starting.await.unwrap();

            let phase = controller.get_snapshot().await.phase;
            let scheduled = controller.schedules.lock().await.is_some();
            assert_eq!(phase == SessionPhase::Active, scheduled, "phase {phase:?}");

            controller.dispatch(Command::Reset).await;
        }
    }
}
