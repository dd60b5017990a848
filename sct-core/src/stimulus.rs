use crate::trial::Direction;

/// Render-cacheable visual elements.
pub trait Stimulus: Clone + Send + Sync + std::fmt::Debug {
    fn cache_id(&self) -> usize;
}

/// The task's fixed cue set. Ids index the renderer's static pixmap cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    Fixation,
    Plane(Direction),
    FuelGauge,
    TriggerMark,
}

impl Stimulus for CueKind {
    fn cache_id(&self) -> usize {
        match self {
            CueKind::Fixation => 0,
            CueKind::Plane(Direction::Left) => 1,
            CueKind::Plane(Direction::Right) => 2,
            CueKind::FuelGauge => 3,
            CueKind::TriggerMark => 4,
        }
    }
}

impl CueKind {
    pub const CACHE_SLOTS: usize = 5;
}

/// Per-trial feedback shown during practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Correct,
    Incorrect,
    Timeout,
}

impl Feedback {
    pub fn label(&self) -> &'static str {
        match self {
            Feedback::Correct => "Correct!",
            Feedback::Incorrect => "Incorrect",
            Feedback::Timeout => "Respond faster!",
        }
    }
}

/// Snapshot of everything currently visible. The session owns it, the
/// renderer polls it each frame; committing a frame is the display's
/// concern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualState {
    pub fixation: bool,
    pub primary: Option<Direction>,
    pub secondary_cue: bool,
    pub trigger_mark: bool,
    pub feedback: Option<Feedback>,
    pub message: Option<String>,
}

impl VisualState {
    /// Clears every stimulus element. Messages and feedback are cleared
    /// too; a trial must not leave anything on screen behind it.
    pub fn clear(&mut self) {
        *self = VisualState::default();
    }

    pub fn is_blank(&self) -> bool {
        *self == VisualState::default()
    }
}
