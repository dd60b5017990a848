use crate::abort::AbortFlag;
use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::record::RecordSink;
use crate::runner::{Tick, TrialRunner};
use crate::schedule::{parse_conditions, require_conditions, TrialSchedule};
use crate::staircase::SsdController;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sct_core::{
    Feedback, InputChannel, KeyClass, Phase, QueuedInput, TaskPhase, TrialKind, TrialOutcome,
    TrialRecord, TrialSpec, TrialState, VisualState,
};
use sct_timing::Timer;
use std::time::Duration;
use tracing::{debug, info, warn};

const CALIBRATION_FRAMES: usize = 120;

/// Events surfaced to the driving loop. Mostly informational; `Aborted`
/// and `SessionComplete` tell the shell to tear the window down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    CalibrationComplete,
    TrialComplete,
    BlockComplete,
    PhaseComplete,
    Aborted,
    SessionComplete,
}

/// Where the session is within one trial's presentation flow.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TrialFlow {
    Idle,
    PrepareBlock { until_ns: u64 },
    Fixation { until_ns: u64, spec: TrialSpec },
    Stimulus,
    Feedback { until_ns: u64 },
    Iti { until_ns: u64 },
}

/// What the next space press does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    StartCalibration,
    AfterPracticeSummary,
    StartBlock,
    AfterBlockSummary,
    ExitDebrief,
}

#[derive(Debug, Clone, Default)]
struct PhaseStats {
    go_rts_s: Vec<f64>,
    go_total: usize,
    go_omissions: usize,
    stop_total: usize,
    stop_failures: usize,
}

impl PhaseStats {
    fn reset(&mut self) {
        *self = PhaseStats::default();
    }

    fn any_trials(&self) -> bool {
        self.go_total + self.stop_total > 0
    }

    fn mean_go_rt_ms(&self) -> f64 {
        if self.go_rts_s.is_empty() {
            0.0
        } else {
            self.go_rts_s.iter().sum::<f64>() / self.go_rts_s.len() as f64 * 1000.0
        }
    }

    fn stop_failure_rate(&self) -> f64 {
        if self.stop_total > 0 {
            self.stop_failures as f64 / self.stop_total as f64
        } else {
            0.0
        }
    }
}

/// Phase and trial orchestration: welcome → calibration → practice →
/// main blocks → debrief. Owns the display model, the input channel,
/// one staircase controller per trial-bearing phase, and incremental
/// persistence. Driven by `update` once per frame (or per poll tick).
pub struct Session<T, I, S>
where
    T: Timer<Timestamp = u64>,
    I: InputChannel,
    S: RecordSink,
{
    phase: TaskPhase,
    config: TaskConfig,
    timer: T,
    input: I,
    sink: S,
    rng: StdRng,
    abort: AbortFlag,

    conditions: Vec<TrialSpec>,
    schedule: Option<TrialSchedule>,
    practice_ssd: SsdController,
    main_ssd: SsdController,

    flow: TrialFlow,
    runner: Option<TrialRunner>,
    gate: Option<Gate>,
    visuals: VisualState,

    block: usize,
    trial_index: usize,
    phase_trial_number: usize,
    records: Vec<TrialRecord>,
    stats: PhaseStats,

    calibrated: bool,
    safe_margin_ns: u64,
    done: bool,
    complete_notified: bool,
}

impl<T, I, S> Session<T, I, S>
where
    T: Timer<Timestamp = u64>,
    I: InputChannel,
    S: RecordSink,
{
    /// Parses the condition list up front: a malformed condition fails
    /// here, before any stimulus is shown.
    pub fn new(
        config: TaskConfig,
        timer: T,
        input: I,
        sink: S,
        seed: u64,
        abort: AbortFlag,
    ) -> Result<Self, TaskError> {
        let conditions = parse_conditions(&config.conditions)?;
        let practice_ssd = SsdController::from_config(&config);
        let main_ssd = SsdController::from_config(&config);
        let mut visuals = VisualState::default();
        visuals.message = Some(Self::instructions(config.practice_reps > 0));

        Ok(Self {
            phase: TaskPhase::default(),
            config,
            timer,
            input,
            sink,
            rng: StdRng::seed_from_u64(seed),
            abort,
            conditions,
            schedule: None,
            practice_ssd,
            main_ssd,
            flow: TrialFlow::Idle,
            runner: None,
            gate: Some(Gate::StartCalibration),
            visuals,
            block: 0,
            trial_index: 0,
            phase_trial_number: 0,
            records: Vec::new(),
            stats: PhaseStats::default(),
            calibrated: false,
            safe_margin_ns: 0,
            done: false,
            complete_notified: false,
        })
    }

    fn instructions(with_practice: bool) -> String {
        let tail = if with_practice {
            "We'll do practice first (with feedback).\n\nPress SPACE to begin practice."
        } else {
            "No practice. We'll go straight to the main task.\n\nPress SPACE to begin."
        };
        format!(
            "Stop-Change Task\n\nOn each trial:\n - Plane points LEFT or RIGHT => press that arrow.\n - If the fuel gauge appears => press DOWN arrow instead.\n\n{}",
            tail
        )
    }

    /// One cooperative tick. Abort is checked first, before any state
    /// advances.
    pub fn update(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.done {
            if !self.complete_notified {
                self.complete_notified = true;
                events.push(SessionEvent::SessionComplete);
            }
            return events;
        }
        if self.abort.is_raised() {
            self.do_abort(&mut events);
            return events;
        }

        let now = self.timer.now();

        if self.phase.requires_calibration() {
            if !self.calibrated && self.timer.frame_count() >= CALIBRATION_FRAMES {
                self.apply_calibration();
                events.push(SessionEvent::CalibrationComplete);
                self.enter_practice(now);
            }
            return events;
        }

        match self.flow {
            TrialFlow::Idle => {}
            TrialFlow::PrepareBlock { until_ns } if now >= until_ns => {
                self.start_next_trial(now, &mut events);
            }
            TrialFlow::Fixation { until_ns, spec } if now >= until_ns => {
                self.begin_stimulus(now, spec);
            }
            TrialFlow::Stimulus => self.tick_runner(now, &mut events),
            TrialFlow::Feedback { until_ns } if now >= until_ns => {
                self.visuals.feedback = None;
                self.flow = TrialFlow::Iti {
                    until_ns: now + self.draw_span_ns(self.config.iti_span),
                };
            }
            TrialFlow::Iti { until_ns } if now >= until_ns => {
                self.start_next_trial(now, &mut events);
            }
            _ => {}
        }

        events
    }

    /// Space advances whatever gate is armed; ignored elsewhere.
    pub fn handle_space(&mut self) {
        let Some(gate) = self.gate.take() else {
            return;
        };
        let now = self.timer.now();
        match gate {
            Gate::StartCalibration => {
                self.advance_phase();
                self.visuals.clear();
                self.visuals.message = Some("Calibrating...".to_string());
            }
            Gate::AfterPracticeSummary => self.enter_main(),
            Gate::StartBlock => {
                self.visuals.clear();
                let seed = self.rng.random::<u64>();
                self.schedule = Some(TrialSchedule::new(
                    self.conditions.clone(),
                    self.config.block_reps,
                    seed,
                ));
                self.stats.reset();
                self.phase_trial_number = 0;
                self.flow = TrialFlow::PrepareBlock {
                    until_ns: now + self.secs_ns(self.config.prepare_block),
                };
                info!(block = self.block, "block started");
            }
            Gate::AfterBlockSummary => {
                if self.block < self.config.main_blocks {
                    self.block += 1;
                    self.block_prelude();
                } else {
                    self.enter_debrief();
                }
            }
            Gate::ExitDebrief => {
                self.done = true;
            }
        }
    }

    fn advance_phase(&mut self) -> bool {
        if let Some(next) = self.phase.next() {
            debug!(from = ?self.phase, to = ?next, "phase advance");
            self.phase = next;
            true
        } else {
            false
        }
    }

    fn apply_calibration(&mut self) {
        let stats = self.timer.calibration_stats();
        self.safe_margin_ns = (stats.jitter_ns * 3.0) as u64;
        self.calibrated = true;
        info!(
            frame_ms = stats.average_frame_time_ns / 1_000_000.0,
            fps = stats.effective_fps,
            jitter_ms = stats.jitter_ns / 1_000_000.0,
            safe_margin_ns = self.safe_margin_ns,
            "display calibrated"
        );
    }

    fn enter_practice(&mut self, now: u64) {
        self.advance_phase();
        if let Err(e) = require_conditions(&self.conditions, "practice") {
            warn!(error = %e, "practice runs zero trials");
            self.enter_main();
            return;
        }
        if self.config.practice_reps == 0 {
            self.enter_main();
            return;
        }
        let seed = self.rng.random::<u64>();
        self.schedule = Some(TrialSchedule::new(
            self.conditions.clone(),
            self.config.practice_reps,
            seed,
        ));
        self.stats.reset();
        self.phase_trial_number = 0;
        self.visuals.clear();
        self.flow = TrialFlow::PrepareBlock {
            until_ns: now + self.secs_ns(self.config.prepare_block),
        };
        info!("practice started");
    }

    fn enter_main(&mut self) {
        self.advance_phase();
        if let Err(e) = require_conditions(&self.conditions, "main") {
            warn!(error = %e, "main blocks run zero trials");
        }
        self.block = 1;
        self.block_prelude();
    }

    fn block_prelude(&mut self) {
        self.flow = TrialFlow::Idle;
        self.visuals.clear();
        self.visuals.message = Some(format!(
            "Prepare for Block {}. Press SPACE to continue.",
            self.block
        ));
        self.gate = Some(Gate::StartBlock);
    }

    fn enter_debrief(&mut self) {
        self.advance_phase();
        self.flow = TrialFlow::Idle;
        if let Err(e) = self.sink.finish(&self.records) {
            warn!(error = %e, "session dump failed");
        }
        self.visuals.clear();
        self.visuals.message = Some("Done!\nPress SPACE to exit.".to_string());
        self.gate = Some(Gate::ExitDebrief);
        info!(trials = self.records.len(), "session complete");
    }

    fn start_next_trial(&mut self, now: u64, events: &mut Vec<SessionEvent>) {
        let next = self.schedule.as_mut().and_then(|s| s.next());
        match next {
            Some(spec) => {
                let fixation = self.draw_span_ns(self.config.fixation_span);
                self.visuals.clear();
                self.visuals.fixation = true;
                self.flow = TrialFlow::Fixation {
                    until_ns: now + fixation,
                    spec,
                };
            }
            None => self.end_of_run(events),
        }
    }

    fn end_of_run(&mut self, events: &mut Vec<SessionEvent>) {
        self.flow = TrialFlow::Idle;
        if self.phase.is_practice() {
            events.push(SessionEvent::PhaseComplete);
            if self.stats.any_trials() {
                self.visuals.clear();
                self.visuals.message = Some(format!(
                    "Practice done!\n\nMean GO RT = {:.1} ms\nGO omissions = {}\nSTOP failures = {} (p={:.2})\n\nPress SPACE to continue.",
                    self.stats.mean_go_rt_ms(),
                    self.stats.go_omissions,
                    self.stats.stop_failures,
                    self.stats.stop_failure_rate(),
                ));
                self.gate = Some(Gate::AfterPracticeSummary);
            } else {
                self.enter_main();
            }
        } else {
            events.push(SessionEvent::BlockComplete);
            self.visuals.clear();
            self.visuals.message = Some(format!(
                "Block {} finished!\n\nMean GO RT: {:.1} ms\nGO omissions: {}\nSTOP failures: {} (p={:.2})\n\nPress SPACE to continue.",
                self.block,
                self.stats.mean_go_rt_ms(),
                self.stats.go_omissions,
                self.stats.stop_failures,
                self.stats.stop_failure_rate(),
            ));
            self.gate = Some(Gate::AfterBlockSummary);
            if self.block >= self.config.main_blocks {
                events.push(SessionEvent::PhaseComplete);
            }
        }
    }

    fn begin_stimulus(&mut self, now: u64, spec: TrialSpec) {
        self.visuals.fixation = false;
        self.visuals.primary = Some(spec.direction);
        self.visuals.trigger_mark = true;
        self.visuals.secondary_cue = false;
        self.input.reset(now);

        // The controller is read exactly once per trial, here; the
        // matching update happens after the outcome is final.
        let delay = if spec.is_interrupt() {
            self.controller().current()
        } else {
            Duration::ZERO
        };
        debug!(
            trial = self.trial_index,
            ?spec,
            delay_s = delay.as_secs_f64(),
            "stimulus onset"
        );
        self.runner = Some(TrialRunner::new(spec, self.config.deadline(), delay, now));
        self.flow = TrialFlow::Stimulus;
    }

    fn tick_runner(&mut self, now: u64, events: &mut Vec<SessionEvent>) {
        let key = self.input.poll();
        let abort = self.abort.clone();
        let tick = match self.runner.as_mut() {
            Some(runner) => runner.tick(now, key, &abort),
            None => return,
        };
        match tick {
            Tick::Pending => {}
            Tick::CueTriggered => {
                self.visuals.secondary_cue = true;
            }
            Tick::Resolved(outcome) => {
                if let Some(runner) = self.runner.take() {
                    self.finish_trial(&runner, outcome, now, events);
                }
            }
            Tick::Aborted => {
                self.runner = None;
                self.do_abort(events);
            }
        }
    }

    fn finish_trial(
        &mut self,
        runner: &TrialRunner,
        outcome: TrialOutcome,
        now: u64,
        events: &mut Vec<SessionEvent>,
    ) {
        // Stimuli come down before anything else happens.
        self.visuals.clear();

        let spec = *runner.spec();
        let delay_used = if spec.is_interrupt() {
            runner.delay().as_secs_f64()
        } else {
            0.0
        };

        // Outcome is final here; only now may the staircase move.
        if spec.is_interrupt() {
            self.controller_mut().update(outcome.correct);
        }

        match spec.kind {
            TrialKind::Go => {
                self.stats.go_total += 1;
                if let Some(rt) = outcome.rt {
                    self.stats.go_rts_s.push(rt.as_secs_f64());
                } else {
                    self.stats.go_omissions += 1;
                    self.stats.go_rts_s.push(self.config.max_response_time);
                }
            }
            TrialKind::Interrupt => {
                self.stats.stop_total += 1;
                if outcome.responded && !outcome.correct {
                    self.stats.stop_failures += 1;
                }
            }
        }

        let record = TrialRecord {
            trial: self.trial_index,
            phase: self.phase.record_label().to_string(),
            block: if self.phase.is_main() {
                Some(self.block)
            } else {
                None
            },
            direction: spec.direction,
            kind: spec.kind,
            delay_used,
            responded: outcome.responded,
            response: outcome.key,
            rt: outcome.rt.map(|d| d.as_secs_f64()),
            cue_shown: outcome.cue_shown,
            correct: outcome.correct,
        };
        if let Err(e) = self.sink.append(&record) {
            warn!(trial = record.trial, error = %e, "record append failed");
        }
        self.records.push(record);
        self.trial_index += 1;
        self.phase_trial_number += 1;
        events.push(SessionEvent::TrialComplete);

        if self.phase.is_practice() {
            self.visuals.feedback = Some(if outcome.correct {
                Feedback::Correct
            } else if outcome.responded {
                Feedback::Incorrect
            } else {
                Feedback::Timeout
            });
            self.flow = TrialFlow::Feedback {
                until_ns: now + self.secs_ns(self.config.feedback_duration),
            };
        } else {
            self.flow = TrialFlow::Iti {
                until_ns: now + self.draw_span_ns(self.config.iti_span),
            };
        }
    }

    fn do_abort(&mut self, events: &mut Vec<SessionEvent>) {
        if self.done {
            return;
        }
        warn!(
            completed = self.records.len(),
            "abort requested; flushing completed trials"
        );
        self.runner = None;
        self.flow = TrialFlow::Idle;
        self.gate = None;
        self.visuals.clear();
        if let Err(e) = self.sink.finish(&self.records) {
            warn!(error = %e, "flush on abort failed");
        }
        self.done = true;
        self.complete_notified = true;
        events.push(SessionEvent::Aborted);
    }

    fn controller(&self) -> &SsdController {
        if self.phase.is_practice() {
            &self.practice_ssd
        } else {
            &self.main_ssd
        }
    }

    fn controller_mut(&mut self) -> &mut SsdController {
        if self.phase.is_practice() {
            &mut self.practice_ssd
        } else {
            &mut self.main_ssd
        }
    }

    fn secs_ns(&self, s: f64) -> u64 {
        Duration::from_secs_f64(s).as_nanos() as u64
    }

    fn draw_span_ns(&mut self, (lo, hi): (f64, f64)) -> u64 {
        let s = if hi > lo {
            self.rng.random_range(lo..hi)
        } else {
            lo
        };
        Duration::from_secs_f64(s).as_nanos() as u64
    }

    // --- queries for the shell and renderer ---

    pub fn phase(&self) -> &TaskPhase {
        &self.phase
    }

    pub fn visuals(&self) -> &VisualState {
        &self.visuals
    }

    pub fn trial_state(&self) -> Option<TrialState> {
        match self.flow {
            TrialFlow::Fixation { .. } => Some(TrialState::Fixation),
            TrialFlow::Stimulus => Some(TrialState::Stimulus),
            TrialFlow::Feedback { .. } => Some(TrialState::Feedback),
            TrialFlow::Iti { .. } => Some(TrialState::Iti),
            _ => None,
        }
    }

    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        match (&self.flow, &self.schedule) {
            (TrialFlow::Idle | TrialFlow::PrepareBlock { .. }, _) | (_, None) => None,
            (_, Some(schedule)) => Some((self.phase_trial_number + 1, schedule.total())),
        }
    }

    pub fn is_awaiting_space(&self) -> bool {
        self.gate.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

impl<T, S> Session<T, QueuedInput, S>
where
    T: Timer<Timestamp = u64>,
    S: RecordSink,
{
    /// Stamp a response at the current clock reading and queue it for
    /// the next poll tick.
    pub fn push_key(&mut self, key: KeyClass) {
        let now = self.timer.now();
        self.input.push_at(key, now);
    }
}
