pub mod log_entry;
pub mod teaching;

pub use log_entry::{LogEntry, LogEntryType};
pub use teaching::{EngagementLevel, TeachingAction, TeachingMode};
