//! One full run of a single exercise.
//!
//! A time-based exercise is one `ExerciseTimer` run; a repetition-based
//! exercise is a `RepSetTracker`. Callers above this level (single runs and
//! workouts) don't need to know which.

use crate::clock::TickHandle;
use crate::config::TimerSettings;
use crate::effects::{Cue, Effect};
use crate::reps::{RepSetTracker, TrackerOutcome};
use crate::timer::{ExerciseTimer, TickOutcome, TimedRun};
use crate::{ExerciseSpec, Result, RunConfig, TickMode, TimerPhase, TimerState};
use std::time::Duration;

/// Outcome of an occurrence tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccurrenceOutcome {
    Pending,
    Completed,
}

#[derive(Debug)]
enum Driver {
    Timed(ExerciseTimer),
    Reps(RepSetTracker),
}

/// A running exercise occurrence
#[derive(Debug)]
pub struct Occurrence {
    spec: ExerciseSpec,
    config: RunConfig,
    driver: Driver,
}

impl Occurrence {
    /// Start an occurrence; the `Start` cue is pushed now, or when the
    /// pre-countdown ends
    pub fn begin(
        spec: &ExerciseSpec,
        config: RunConfig,
        settings: &TimerSettings,
        pre_countdown_seconds: u32,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) -> Result<Self> {
        config.validate()?;

        let driver = match config {
            RunConfig::Timed { target_seconds } => {
                let mut timer = ExerciseTimer::new(settings.intervals);
                timer.start(
                    TimedRun {
                        target_seconds: f64::from(target_seconds),
                        pre_countdown_seconds,
                        mode: TickMode::WholeSeconds,
                        interval_seconds: settings.interval_cue_seconds,
                    },
                    now,
                )?;
                if pre_countdown_seconds == 0 {
                    effects.push(start_cue(spec));
                }
                tracing::info!("Started {} for {}s", spec.id, target_seconds);
                Driver::Timed(timer)
            }
            RunConfig::Reps(plan) => Driver::Reps(RepSetTracker::start(
                spec.id.clone(),
                plan,
                pre_countdown_seconds,
                settings.intervals,
                now,
                effects,
            )?),
        };

        Ok(Self {
            spec: spec.clone(),
            config,
            driver,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn spec(&self) -> &ExerciseSpec {
        &self.spec
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Logged duration for a completed occurrence
    pub fn effective_seconds(&self) -> u32 {
        self.config.effective_seconds()
    }

    /// Seconds of actual work so far (countdown and rest excluded)
    pub fn worked_seconds(&self) -> f64 {
        match &self.driver {
            Driver::Timed(timer) => match timer.phase() {
                TimerPhase::Running | TimerPhase::Completed => timer.elapsed(),
                _ => 0.0,
            },
            Driver::Reps(tracker) => tracker.worked_seconds(),
        }
    }

    pub fn tick_schedule(&self) -> Option<(TickHandle, Duration)> {
        match &self.driver {
            Driver::Timed(timer) => timer.tick_schedule(),
            Driver::Reps(tracker) => tracker.tick_schedule(),
        }
    }

    /// Clock instant the work ended, once completed on schedule
    pub fn boundary(&self) -> Option<u64> {
        match &self.driver {
            Driver::Timed(timer) => timer.boundary(),
            Driver::Reps(tracker) => tracker.boundary(),
        }
    }

    pub fn owns(&self, handle: TickHandle) -> bool {
        match &self.driver {
            Driver::Timed(timer) => timer.owns(handle),
            Driver::Reps(tracker) => tracker.owns(handle),
        }
    }

    pub fn state(&self) -> TimerState {
        let mut state = match &self.driver {
            Driver::Timed(timer) => timer.state(),
            Driver::Reps(tracker) => tracker.state(),
        };
        state.exercise_id = Some(self.spec.id.clone());
        state
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn tick(
        &mut self,
        handle: TickHandle,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) -> OccurrenceOutcome {
        match &mut self.driver {
            Driver::Timed(timer) => match timer.tick(handle, now, effects) {
                TickOutcome::Started => {
                    effects.push(start_cue(&self.spec));
                    // The run began where the countdown ended; a late
                    // sample may already be past its target
                    let Some((next, _)) = timer.tick_schedule() else {
                        return OccurrenceOutcome::Pending;
                    };
                    match timer.tick(next, now, effects) {
                        TickOutcome::Finished => OccurrenceOutcome::Completed,
                        _ => OccurrenceOutcome::Pending,
                    }
                }
                TickOutcome::Finished => OccurrenceOutcome::Completed,
                TickOutcome::Noop | TickOutcome::Progress | TickOutcome::HoldElapsed => {
                    OccurrenceOutcome::Pending
                }
            },
            Driver::Reps(tracker) => match tracker.tick(handle, now, effects) {
                TrackerOutcome::Completed => OccurrenceOutcome::Completed,
                TrackerOutcome::Pending => OccurrenceOutcome::Pending,
            },
        }
    }

    /// Mark the occurrence complete without waiting for the target
    pub fn finish(&mut self) {
        match &mut self.driver {
            Driver::Timed(timer) => timer.finish(),
            Driver::Reps(tracker) => tracker.finish(),
        }
    }

    pub fn cancel(&mut self) -> bool {
        match &mut self.driver {
            Driver::Timed(timer) => timer.cancel(),
            Driver::Reps(tracker) => tracker.cancel(),
        }
    }
}

fn start_cue(spec: &ExerciseSpec) -> Effect {
    Effect::Cue(Cue::Start {
        exercise_id: spec.id.clone(),
        announcement: None,
    })
}
