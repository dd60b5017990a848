use crate::config::TaskConfig;
use std::time::Duration;
use tracing::debug;

/// 1-up/1-down tracker over the stop-signal delay. Successful
/// interruption raises the delay, failure lowers it toward the zero
/// floor, converging on the delay where interruption succeeds about
/// half the time. One instance per phase; instances never share state.
#[derive(Debug, Clone)]
pub struct SsdController {
    delay: Duration,
    increment: Duration,
    decrement: Duration,
    ceiling: Option<Duration>,
}

impl SsdController {
    pub fn new(
        initial: Duration,
        increment: Duration,
        decrement: Duration,
        ceiling: Option<Duration>,
    ) -> Self {
        Self {
            delay: initial,
            increment,
            decrement,
            ceiling,
        }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self::new(
            config.initial_delay(),
            config.delay_increment(),
            config.delay_decrement(),
            config.delay_ceiling(),
        )
    }

    /// Delay to use for the next interrupt trial. The value persisted
    /// with a trial must be read before `update` runs for that trial.
    pub fn current(&self) -> Duration {
        self.delay
    }

    /// Applies the post-trial update. Call exactly once per interrupt
    /// trial, after that trial's outcome is final; go trials never reach
    /// here.
    pub fn update(&mut self, interruption_succeeded: bool) {
        let before = self.delay;
        if interruption_succeeded {
            self.delay += self.increment;
            if let Some(ceiling) = self.ceiling {
                self.delay = self.delay.min(ceiling);
            }
        } else {
            self.delay = self.delay.saturating_sub(self.decrement);
        }
        debug!(
            succeeded = interruption_succeeded,
            before_s = before.as_secs_f64(),
            after_s = self.delay.as_secs_f64(),
            "staircase step"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn success_raises_and_failure_lowers() {
        let mut ssd = SsdController::new(secs(0.2), secs(0.05), secs(0.05), None);
        ssd.update(true);
        assert_eq!(ssd.current(), secs(0.25));
        ssd.update(false);
        assert_eq!(ssd.current(), secs(0.2));
    }

    #[test]
    fn delay_never_goes_below_zero() {
        let mut ssd = SsdController::new(secs(0.2), secs(0.05), secs(0.3), None);
        ssd.update(false);
        assert_eq!(ssd.current(), Duration::ZERO);
        ssd.update(false);
        assert_eq!(ssd.current(), Duration::ZERO);
    }

    #[test]
    fn trajectory_is_reproducible_from_outcome_sequence() {
        // [correct, incorrect, correct] from 0.2 with 0.05 steps.
        let mut ssd = SsdController::new(secs(0.2), secs(0.05), secs(0.05), None);
        let mut used = Vec::new();
        for succeeded in [true, false, true] {
            used.push(ssd.current());
            ssd.update(succeeded);
        }
        assert_eq!(used, vec![secs(0.2), secs(0.25), secs(0.2)]);
        assert_eq!(ssd.current(), secs(0.25));
    }

    #[test]
    fn long_failure_run_stays_clamped_then_recovers() {
        let mut ssd = SsdController::new(secs(0.1), secs(0.05), secs(0.05), None);
        for _ in 0..10 {
            ssd.update(false);
        }
        assert_eq!(ssd.current(), Duration::ZERO);
        ssd.update(true);
        assert_eq!(ssd.current(), secs(0.05));
    }

    #[test]
    fn ceiling_clamps_increments_when_configured() {
        let mut ssd = SsdController::new(secs(0.2), secs(0.1), secs(0.05), Some(secs(0.25)));
        ssd.update(true);
        assert_eq!(ssd.current(), secs(0.25));
        ssd.update(true);
        assert_eq!(ssd.current(), secs(0.25));
    }
}
