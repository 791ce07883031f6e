//! The exposed timing controller.
//!
//! `Session` owns whatever is currently running (a single exercise or a
//! workout) and is effect-free: every command returns the effects the
//! transition requested, to be executed after the new state is in place.
//! It is the only place that asks for the wake lock, once per non-idle
//! period.

use crate::catalog::ExerciseCatalog;
use crate::clock::TickHandle;
use crate::config::TimerSettings;
use crate::effects::{Cue, Effect};
use crate::occurrence::{Occurrence, OccurrenceOutcome};
use crate::timer::{ExerciseTimer, TickOutcome};
use crate::workout::{WorkoutRun, WorkoutSequencer};
use crate::{
    ActivityEntry, ActivityKind, ActivityOutcome, Result, RunConfig, StepOverrides, TimerState,
    Workout,
};
use chrono::Utc;
use std::time::Duration;

enum Active {
    Idle,
    Single(Occurrence),
    /// Completed single run kept on display
    SingleHold {
        occurrence: Occurrence,
        timer: ExerciseTimer,
    },
    Workout(WorkoutSequencer),
}

/// Timing controller for single runs and workouts
pub struct Session {
    catalog: Box<dyn ExerciseCatalog>,
    settings: TimerSettings,
    active: Active,
    wake_lock_requested: bool,
}

impl Session {
    pub fn new(catalog: impl ExerciseCatalog + 'static, settings: TimerSettings) -> Self {
        Self {
            catalog: Box::new(catalog),
            settings,
            active: Active::Idle,
            wake_lock_requested: false,
        }
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &dyn ExerciseCatalog {
        self.catalog.as_ref()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_idle(&self) -> bool {
        matches!(self.active, Active::Idle)
    }

    pub fn timer_state(&self) -> TimerState {
        match &self.active {
            Active::Idle => TimerState::idle(),
            Active::Single(occurrence) | Active::SingleHold { occurrence, .. } => {
                occurrence.state()
            }
            Active::Workout(sequencer) => sequencer.state(),
        }
    }

    pub fn workout_run(&self) -> Option<&WorkoutRun> {
        match &self.active {
            Active::Workout(sequencer) => Some(sequencer.run()),
            _ => None,
        }
    }

    /// The live tick handle and how often to deliver it
    pub fn tick_schedule(&self) -> Option<(TickHandle, Duration)> {
        match &self.active {
            Active::Idle => None,
            Active::Single(occurrence) => occurrence.tick_schedule(),
            Active::SingleHold { timer, .. } => timer.tick_schedule(),
            Active::Workout(sequencer) => sequencer.tick_schedule(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a single exercise, silently replacing anything active
    ///
    /// On error nothing changes.
    pub fn start(
        &mut self,
        exercise_id: &str,
        override_duration: Option<u32>,
        now: Option<u64>,
    ) -> Result<Vec<Effect>> {
        let spec = self.catalog.resolve(exercise_id)?;
        let overrides = StepOverrides {
            duration_seconds: override_duration,
            ..Default::default()
        };
        let config = RunConfig::resolve(spec, &overrides, self.settings.set_rest_seconds)?;

        let mut started = Vec::new();
        let occurrence = Occurrence::begin(
            spec,
            config,
            &self.settings,
            self.settings.pre_countdown_seconds,
            now,
            &mut started,
        )?;

        self.cancel_active();
        self.active = Active::Single(occurrence);

        let mut effects = Vec::new();
        self.request_wake_lock(&mut effects);
        effects.append(&mut started);
        Ok(effects)
    }

    /// Start a workout, silently replacing anything active
    ///
    /// On error (empty workout, unknown exercise, invalid step) nothing
    /// changes and no effects are produced.
    pub fn start_workout(
        &mut self,
        workout: impl Into<Workout>,
        now: Option<u64>,
    ) -> Result<Vec<Effect>> {
        let mut started = Vec::new();
        let sequencer = WorkoutSequencer::start(
            workout.into(),
            self.catalog.as_ref(),
            &self.settings,
            now,
            &mut started,
        )?;

        self.cancel_active();
        self.active = Active::Workout(sequencer);

        let mut effects = Vec::new();
        self.request_wake_lock(&mut effects);
        effects.append(&mut started);
        Ok(effects)
    }

    /// Route a tick to whatever owns the handle
    pub fn tick(&mut self, handle: TickHandle, now: Option<u64>) -> Vec<Effect> {
        let mut effects = Vec::new();
        match &mut self.active {
            Active::Idle => {}
            Active::Single(occurrence) => {
                if occurrence.tick(handle, now, &mut effects) == OccurrenceOutcome::Completed {
                    self.complete_single(now, &mut effects);
                }
            }
            Active::SingleHold { timer, .. } => {
                if timer.tick(handle, now, &mut effects) == TickOutcome::HoldElapsed {
                    self.go_idle(&mut effects);
                }
            }
            Active::Workout(sequencer) => {
                sequencer.tick(handle, now, &mut effects);
                if sequencer.is_done() {
                    self.go_idle(&mut effects);
                }
            }
        }
        effects
    }

    /// Stop the current run
    ///
    /// With `is_completion` the current occurrence is treated as naturally
    /// completed. Otherwise this is a manual stop: the work done so far is
    /// recorded (if any) and the session returns to idle. Does nothing when
    /// idle or already showing a completed run.
    pub fn stop(&mut self, is_completion: bool, now: Option<u64>) -> Vec<Effect> {
        let mut effects = Vec::new();
        match &mut self.active {
            Active::Idle | Active::SingleHold { .. } => {
                tracing::debug!("Nothing to stop");
            }
            Active::Workout(sequencer) if sequencer.is_finished() => {
                tracing::debug!("Workout already finished");
            }
            Active::Single(occurrence) => {
                if is_completion {
                    occurrence.finish();
                    self.complete_single(now, &mut effects);
                } else {
                    let worked = rounded(occurrence.worked_seconds());
                    if worked > 0 {
                        let spec = occurrence.spec();
                        effects.push(Effect::Record(single_entry(
                            &spec.id,
                            &spec.name,
                            worked,
                            ActivityOutcome::ManualStop,
                        )));
                    }
                    tracing::info!("Stopped {} after {}s", occurrence.spec().id, worked);
                    self.go_idle(&mut effects);
                }
            }
            Active::Workout(sequencer) => {
                if is_completion {
                    sequencer.complete_current(now, &mut effects);
                    if sequencer.is_done() {
                        self.go_idle(&mut effects);
                    }
                } else {
                    let worked = rounded(sequencer.worked_seconds());
                    if worked > 0 {
                        effects.push(Effect::Record(
                            sequencer.entry(worked, ActivityOutcome::ManualStop),
                        ));
                    }
                    tracing::info!("Stopped workout {} after {}s", sequencer.run().workout_id, worked);
                    self.go_idle(&mut effects);
                }
            }
        }
        effects
    }

    /// Cancel everything without recording
    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.go_idle(&mut effects);
        effects
    }

    fn complete_single(&mut self, now: Option<u64>, effects: &mut Vec<Effect>) {
        let occurrence = match std::mem::replace(&mut self.active, Active::Idle) {
            Active::Single(occurrence) => occurrence,
            other => {
                self.active = other;
                return;
            }
        };

        let spec = occurrence.spec();
        effects.push(Effect::Cue(Cue::Completion {
            subject_id: spec.id.clone(),
        }));
        effects.push(Effect::Record(single_entry(
            &spec.id,
            &spec.name,
            occurrence.effective_seconds(),
            ActivityOutcome::Completed,
        )));
        tracing::info!("Completed {} ({}s)", spec.id, occurrence.effective_seconds());

        let hold = self.settings.display_hold;
        if hold.is_zero() {
            self.go_idle(effects);
            return;
        }
        // The hold starts when the run ended, which a late sample may be past
        let mut timer = ExerciseTimer::new(self.settings.intervals);
        let handle = timer.hold(hold.as_secs_f64(), occurrence.boundary().or(now));
        if timer.tick(handle, now, effects) == TickOutcome::HoldElapsed {
            self.go_idle(effects);
            return;
        }
        self.active = Active::SingleHold { occurrence, timer };
    }

    fn request_wake_lock(&mut self, effects: &mut Vec<Effect>) {
        if !self.wake_lock_requested {
            self.wake_lock_requested = true;
            effects.push(Effect::AcquireWakeLock);
        }
    }

    fn cancel_active(&mut self) {
        match std::mem::replace(&mut self.active, Active::Idle) {
            Active::Idle => {}
            Active::Single(mut occurrence) => {
                occurrence.cancel();
            }
            Active::SingleHold { mut timer, .. } => {
                timer.cancel();
            }
            Active::Workout(mut sequencer) => {
                sequencer.cancel();
            }
        }
    }

    fn go_idle(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_active();
        if self.wake_lock_requested {
            self.wake_lock_requested = false;
            effects.push(Effect::ReleaseWakeLock);
        }
    }
}

fn rounded(seconds: f64) -> u32 {
    seconds.max(0.0).round() as u32
}

fn single_entry(id: &str, name: &str, seconds: u32, outcome: ActivityOutcome) -> ActivityEntry {
    ActivityEntry {
        subject_id: id.to_string(),
        subject_name: name.to_string(),
        duration_seconds: seconds,
        completed_at: Utc::now(),
        kind: ActivityKind::Single,
        outcome,
        session_id: None,
        notes: None,
    }
}
