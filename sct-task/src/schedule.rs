use crate::config::RawCondition;
use crate::error::TaskError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sct_core::TrialSpec;
use tracing::warn;

/// Parses condition text into typed specs, failing fast on the first
/// malformed entry with its index.
pub fn parse_conditions(raw: &[RawCondition]) -> Result<Vec<TrialSpec>, TaskError> {
    raw.iter()
        .enumerate()
        .map(|(index, condition)| {
            let direction = condition
                .direction
                .parse()
                .map_err(|e: sct_core::ParseSpecError| TaskError::InvalidTrialSpec {
                    index,
                    detail: e.to_string(),
                })?;
            let kind = condition
                .kind
                .parse()
                .map_err(|e: sct_core::ParseSpecError| TaskError::InvalidTrialSpec {
                    index,
                    detail: e.to_string(),
                })?;
            Ok(TrialSpec::new(direction, kind))
        })
        .collect()
}

/// Checks that a phase has conditions to draw from. The caller decides
/// what empty means; the session logs it and runs the phase with zero
/// trials rather than failing.
pub fn require_conditions(specs: &[TrialSpec], phase: &str) -> Result<(), TaskError> {
    if specs.is_empty() {
        Err(TaskError::MissingInput(phase.to_string()))
    } else {
        Ok(())
    }
}

/// Deterministic, seed-restartable trial sequence: `reps` independently
/// shuffled passes over the condition list. An empty list yields an
/// empty sequence (the phase then runs zero trials).
#[derive(Debug, Clone)]
pub struct TrialSchedule {
    base: Vec<TrialSpec>,
    reps: usize,
    seed: u64,
    rng: StdRng,
    current: Vec<TrialSpec>,
    next_index: usize,
    reps_done: usize,
}

impl TrialSchedule {
    pub fn new(base: Vec<TrialSpec>, reps: usize, seed: u64) -> Self {
        if base.is_empty() && reps > 0 {
            warn!("empty condition list; schedule will produce no trials");
        }
        let mut schedule = Self {
            base,
            reps,
            seed,
            rng: StdRng::seed_from_u64(seed),
            current: Vec::new(),
            next_index: 0,
            reps_done: 0,
        };
        schedule.reshuffle();
        schedule
    }

    /// Total number of trials this schedule will produce.
    pub fn total(&self) -> usize {
        self.base.len() * self.reps
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Rewinds to the first trial of the first repetition, reproducing
    /// the exact same order.
    pub fn restart(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.next_index = 0;
        self.reps_done = 0;
        self.reshuffle();
    }

    fn reshuffle(&mut self) {
        self.current = self.base.clone();
        self.current.shuffle(&mut self.rng);
        self.next_index = 0;
    }
}

impl Iterator for TrialSchedule {
    type Item = TrialSpec;

    fn next(&mut self) -> Option<TrialSpec> {
        if self.base.is_empty() || self.reps_done >= self.reps {
            return None;
        }
        if self.next_index >= self.current.len() {
            self.reps_done += 1;
            if self.reps_done >= self.reps {
                return None;
            }
            self.reshuffle();
        }
        let spec = self.current[self.next_index];
        self.next_index += 1;
        Some(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sct_core::{Direction, TrialKind};

    fn base() -> Vec<TrialSpec> {
        vec![
            TrialSpec::new(Direction::Left, TrialKind::Go),
            TrialSpec::new(Direction::Right, TrialKind::Go),
            TrialSpec::new(Direction::Left, TrialKind::Interrupt),
            TrialSpec::new(Direction::Right, TrialKind::Interrupt),
        ]
    }

    #[test]
    fn parse_accepts_well_formed_conditions() {
        let raw = vec![
            RawCondition::new("left", "go"),
            RawCondition::new("Right", "stop"),
        ];
        let specs = parse_conditions(&raw).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].kind, TrialKind::Interrupt);
    }

    #[test]
    fn parse_reports_the_offending_index() {
        let raw = vec![
            RawCondition::new("left", "go"),
            RawCondition::new("sideways", "go"),
        ];
        match parse_conditions(&raw) {
            Err(TaskError::InvalidTrialSpec { index, detail }) => {
                assert_eq!(index, 1);
                assert!(detail.contains("sideways"));
            }
            other => panic!("expected InvalidTrialSpec, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn same_seed_reproduces_the_same_order() {
        let a: Vec<_> = TrialSchedule::new(base(), 3, 99).collect();
        let b: Vec<_> = TrialSchedule::new(base(), 3, 99).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn each_repetition_is_a_permutation_of_the_base_list() {
        let trials: Vec<_> = TrialSchedule::new(base(), 3, 7).collect();
        for rep in trials.chunks(4) {
            let mut sorted: Vec<_> = rep.iter().map(|s| format!("{:?}", s)).collect();
            sorted.sort();
            let mut expected: Vec<_> = base().iter().map(|s| format!("{:?}", s)).collect();
            expected.sort();
            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn restart_rewinds_to_an_identical_sequence() {
        let mut schedule = TrialSchedule::new(base(), 2, 42);
        let first: Vec<_> = schedule.by_ref().take(5).collect();
        schedule.restart();
        let again: Vec<_> = schedule.by_ref().take(5).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn empty_base_yields_no_trials() {
        let mut schedule = TrialSchedule::new(Vec::new(), 4, 1);
        assert!(schedule.is_empty());
        assert_eq!(schedule.next(), None);
    }

    #[test]
    fn require_conditions_flags_an_empty_list() {
        assert!(require_conditions(&base(), "practice").is_ok());
        match require_conditions(&[], "practice") {
            Err(TaskError::MissingInput(phase)) => assert_eq!(phase, "practice"),
            _ => panic!("expected MissingInput"),
        }
    }
}
