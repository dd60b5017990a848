pub mod abort;
pub mod classify;
pub mod config;
pub mod error;
pub mod record;
pub mod runner;
pub mod schedule;
pub mod session;
pub mod staircase;

#[cfg(test)]
pub(crate) mod testutil;

pub use abort::AbortFlag;
pub use classify::classify;
pub use config::{RawCondition, TaskConfig};
pub use error::TaskError;
pub use record::{JsonLinesSink, MemorySink, RecordSink};
pub use runner::{drive, Tick, TrialRunner};
pub use schedule::{parse_conditions, require_conditions, TrialSchedule};
pub use session::{Session, SessionEvent};
pub use staircase::SsdController;
