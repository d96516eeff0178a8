pub mod commands;
pub mod controller;
pub mod idle;
pub mod state;

pub use controller::{Clock, ObservationSnapshot, ObserverEvent, SessionController, SystemClock};
pub use idle::IdleMonitor;
pub use state::{reduce, Command, ObservationState, Outcome, SessionPhase, Tally};
