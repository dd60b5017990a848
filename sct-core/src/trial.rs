use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Direction of the primary cue (which way the plane points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

/// Whether a trial is a plain go trial or may present the change cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialKind {
    Go,
    Interrupt,
}

/// Immutable per-trial input from the condition schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub direction: Direction,
    pub kind: TrialKind,
}

impl TrialSpec {
    pub fn new(direction: Direction, kind: TrialKind) -> Self {
        Self { direction, kind }
    }

    pub fn is_interrupt(&self) -> bool {
        self.kind == TrialKind::Interrupt
    }
}

/// Malformed condition text. Carries the field and the offending value so
/// the schedule can point at the exact condition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSpecError {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for ParseSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized {} value {:?}", self.field, self.value)
    }
}

impl std::error::Error for ParseSpecError {}

impl FromStr for Direction {
    type Err = ParseSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(ParseSpecError {
                field: "direction",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for TrialKind {
    type Err = ParseSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "go" => Ok(TrialKind::Go),
            "stop" | "interrupt" => Ok(TrialKind::Interrupt),
            _ => Err(ParseSpecError {
                field: "trial kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Resolved response classes. Left/Right map the directional keys,
/// Change is the designated interrupt key (down arrow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyClass {
    Left,
    Right,
    Change,
}

impl KeyClass {
    pub fn matches(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (KeyClass::Left, Direction::Left) | (KeyClass::Right, Direction::Right)
        )
    }
}

/// One resolved key action. `rt` is the action timestamp relative to the
/// input channel's origin, not the moment the poll observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: KeyClass,
    pub rt: Duration,
}

/// Where the session currently is within one trial's presentation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Fixation,
    Stimulus,
    Feedback,
    Iti,
}

/// Exactly one of these is produced per trial by the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub responded: bool,
    pub key: Option<KeyClass>,
    pub rt: Option<Duration>,
    pub cue_shown: bool,
    pub correct: bool,
}

impl TrialOutcome {
    pub fn timed_out() -> Self {
        Self {
            responded: false,
            key: None,
            rt: None,
            cue_shown: false,
            correct: false,
        }
    }
}

/// Flat persisted row, one per completed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub phase: String,
    pub block: Option<usize>,
    pub direction: Direction,
    pub kind: TrialKind,
    /// Controller delay in effect for this trial, seconds. 0.0 on go trials.
    pub delay_used: f64,
    pub responded: bool,
    pub response: Option<KeyClass>,
    /// Reaction time in seconds; None iff no response.
    pub rt: Option<f64>,
    pub cue_shown: bool,
    pub correct: bool,
}
