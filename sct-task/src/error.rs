use thiserror::Error;

/// Task-level failures. A response timeout is deliberately not here: it
/// is a normal trial outcome, never an error.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No usable trial conditions for a phase. The session degrades by
    /// running zero trials; callers that surface this treat it as a
    /// warning, not a session failure.
    #[error("no trial conditions available: {0}")]
    MissingInput(String),

    /// Malformed condition text. Raised before any stimulus is shown so
    /// the offending entry can be fixed rather than silently defaulted.
    #[error("invalid trial condition at index {index}: {detail}")]
    InvalidTrialSpec { index: usize, detail: String },

    /// User-initiated cancellation; the only error that unwinds a whole
    /// session.
    #[error("session aborted")]
    AbortRequested,

    #[error("record sink I/O: {0}")]
    Sink(#[from] std::io::Error),

    #[error("record encoding: {0}")]
    Encode(#[from] serde_json::Error),
}
