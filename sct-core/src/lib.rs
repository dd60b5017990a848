pub mod input;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use input::{InputChannel, QueuedInput};
pub use phase::{Phase, TaskPhase};
pub use stimulus::{CueKind, Feedback, Stimulus, VisualState};
pub use trial::{
    Direction, KeyClass, KeyPress, ParseSpecError, TrialKind, TrialOutcome, TrialRecord,
    TrialSpec, TrialState,
};
