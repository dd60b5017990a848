use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One condition-list entry as it appears in configuration. Parsed into
/// a typed `TrialSpec` at session start; malformed entries fail fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCondition {
    pub direction: String,
    pub kind: String,
}

impl RawCondition {
    pub fn new(direction: &str, kind: &str) -> Self {
        Self {
            direction: direction.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Task parameters. Durations are seconds. Defaults are the stop-change
/// task's standard constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Response deadline per trial.
    pub max_response_time: f64,
    /// Per-trial feedback display time (practice only).
    pub feedback_duration: f64,
    /// Fixation cross duration, drawn uniformly from this span.
    pub fixation_span: (f64, f64),
    /// Inter-trial interval, drawn uniformly from this span.
    pub iti_span: (f64, f64),
    /// Blank pause before each block starts.
    pub prepare_block: f64,

    pub initial_ssd: f64,
    pub ssd_increment: f64,
    pub ssd_decrement: f64,
    /// Optional upper clamp on the delay. The reference procedure has
    /// none; when set, the delay is clamped after each increment.
    pub ssd_ceiling: Option<f64>,

    /// Shuffled repetitions of the condition list during practice.
    /// 0 skips practice entirely.
    pub practice_reps: usize,
    pub main_blocks: usize,
    /// Shuffled repetitions of the condition list per main block.
    pub block_reps: usize,

    pub conditions: Vec<RawCondition>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_response_time: 1.25,
            feedback_duration: 0.5,
            fixation_span: (0.25, 0.25),
            iti_span: (0.5, 1.0),
            prepare_block: 2.0,
            initial_ssd: 0.2,
            ssd_increment: 0.05,
            ssd_decrement: 0.05,
            ssd_ceiling: None,
            practice_reps: 4,
            main_blocks: 4,
            block_reps: 2,
            conditions: Self::default_conditions(),
        }
    }
}

impl TaskConfig {
    /// Per direction: three go trials and one interrupt trial, keeping
    /// interrupt trials the minority of each repetition.
    pub fn default_conditions() -> Vec<RawCondition> {
        let mut conditions = Vec::with_capacity(8);
        for direction in ["left", "right"] {
            for _ in 0..3 {
                conditions.push(RawCondition::new(direction, "go"));
            }
            conditions.push(RawCondition::new(direction, "stop"));
        }
        conditions
    }

    pub fn load(path: &Path) -> Result<Self, TaskError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs_f64(self.max_response_time)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs_f64(self.initial_ssd)
    }

    pub fn delay_increment(&self) -> Duration {
        Duration::from_secs_f64(self.ssd_increment)
    }

    pub fn delay_decrement(&self) -> Duration {
        Duration::from_secs_f64(self.ssd_decrement)
    }

    pub fn delay_ceiling(&self) -> Option<Duration> {
        self.ssd_ceiling.map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_parameters() {
        let config = TaskConfig::default();
        assert_eq!(config.max_response_time, 1.25);
        assert_eq!(config.initial_ssd, 0.2);
        assert_eq!(config.ssd_increment, 0.05);
        assert_eq!(config.ssd_decrement, 0.05);
        assert!(config.ssd_ceiling.is_none());
        assert_eq!(config.practice_reps, 4);
        assert_eq!(config.main_blocks, 4);
        assert_eq!(config.block_reps, 2);
        assert_eq!(config.conditions.len(), 8);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: TaskConfig =
            serde_json::from_str(r#"{"initial_ssd": 0.3, "main_blocks": 2}"#).unwrap();
        assert_eq!(config.initial_ssd, 0.3);
        assert_eq!(config.main_blocks, 2);
        assert_eq!(config.max_response_time, 1.25);
        assert_eq!(config.deadline(), Duration::from_millis(1250));
    }
}
