//! Workout sequencing.
//!
//! A `WorkoutSequencer` runs the steps of a workout in order: each step is
//! one `Occurrence`, separated by inter-exercise rest. After the last step
//! it emits the completion cue and a single workout activity entry, then
//! keeps the completed display up for the configured hold.
//!
//! ## Stage Transitions
//!
//! ```text
//! Exercising(i) -> Resting -> Exercising(i + 1)
//! Exercising(i) -> Exercising(i + 1)        (rest of 0)
//! Exercising(last) -> Holding -> Done
//! ```

use crate::catalog::ExerciseCatalog;
use crate::clock::TickHandle;
use crate::config::TimerSettings;
use crate::effects::{Announcement, Cue, Effect};
use crate::occurrence::{Occurrence, OccurrenceOutcome};
use crate::timer::{ExerciseTimer, TickOutcome};
use crate::{
    ActivityEntry, ActivityKind, ActivityOutcome, Error, ExerciseSpec, Result, RunConfig,
    TimerState, Workout, WorkoutStep,
};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Read-only progress of a running workout
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkoutRun {
    pub workout_id: String,
    pub workout_name: String,
    /// Steps in execution order
    pub steps: Vec<WorkoutStep>,
    pub current_index: usize,
    pub is_resting: bool,
    /// Exercise coming up after the current rest
    pub next_exercise_id: Option<String>,
    pub session_id: Uuid,
}

/// A step with everything resolved before the workout starts
#[derive(Clone, Debug)]
struct PlannedStep {
    spec: ExerciseSpec,
    config: RunConfig,
    rest_seconds: u32,
}

#[derive(Debug)]
enum Stage {
    Exercising(Occurrence),
    Resting,
    /// Display hold after the final step; keeps its completed occurrence
    Holding(Occurrence),
    Done,
}

/// Runs the steps of one workout
#[derive(Debug)]
pub struct WorkoutSequencer {
    run: WorkoutRun,
    plan: Vec<PlannedStep>,
    settings: TimerSettings,
    stage: Stage,
    /// Rest and display-hold timer
    timer: ExerciseTimer,
    completed_steps: usize,
    completed_seconds: u32,
}

impl WorkoutSequencer {
    /// Resolve every step and start the first one
    ///
    /// Nothing is started (and no effects are pushed) if the workout is
    /// empty or any step fails to resolve.
    pub fn start(
        workout: Workout,
        catalog: &dyn ExerciseCatalog,
        settings: &TimerSettings,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) -> Result<Self> {
        if workout.steps.is_empty() {
            return Err(Error::EmptyWorkout);
        }

        let mut steps = workout.steps;
        steps.sort_by_key(|step| step.order);

        let plan = steps
            .iter()
            .map(|step| {
                let spec = catalog.resolve(&step.exercise_id)?;
                let config =
                    RunConfig::resolve(spec, &step.overrides, settings.set_rest_seconds)?;
                Ok(PlannedStep {
                    spec: spec.clone(),
                    config,
                    rest_seconds: step.rest_seconds.unwrap_or(settings.default_rest_seconds),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut started = Vec::new();
        let first = Occurrence::begin(
            &plan[0].spec,
            plan[0].config,
            settings,
            settings.pre_countdown_seconds,
            now,
            &mut started,
        )?;
        effects.append(&mut started);

        let run = WorkoutRun {
            workout_id: workout.id,
            workout_name: workout.name,
            steps,
            current_index: 0,
            is_resting: false,
            next_exercise_id: None,
            session_id: Uuid::new_v4(),
        };
        tracing::info!(
            "Started workout {} ({} steps, session {})",
            run.workout_id,
            plan.len(),
            run.session_id
        );

        Ok(Self {
            run,
            plan,
            settings: *settings,
            stage: Stage::Exercising(first),
            timer: ExerciseTimer::new(settings.intervals),
            completed_steps: 0,
            completed_seconds: 0,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn run(&self) -> &WorkoutRun {
        &self.run
    }

    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    /// True once the final step has completed
    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Holding(_) | Stage::Done)
    }

    /// Sum of resolved effective seconds over all steps
    pub fn planned_seconds(&self) -> u32 {
        self.plan
            .iter()
            .fold(0u32, |total, step| total.saturating_add(step.config.effective_seconds()))
    }

    /// Completed steps' effective seconds plus the current step's work
    pub fn worked_seconds(&self) -> f64 {
        let current = match &self.stage {
            Stage::Exercising(occurrence) => occurrence.worked_seconds(),
            _ => 0.0,
        };
        f64::from(self.completed_seconds) + current
    }

    /// Fraction of steps completed
    pub fn progress(&self) -> f64 {
        if self.is_finished() {
            return 1.0;
        }
        self.completed_steps as f64 / self.plan.len() as f64
    }

    pub fn state(&self) -> TimerState {
        match &self.stage {
            Stage::Exercising(occurrence) | Stage::Holding(occurrence) => occurrence.state(),
            Stage::Resting => {
                let mut state = self.timer.state();
                state.exercise_id = self.run.next_exercise_id.clone();
                state
            }
            Stage::Done => TimerState::idle(),
        }
    }

    pub fn tick_schedule(&self) -> Option<(TickHandle, Duration)> {
        match &self.stage {
            Stage::Exercising(occurrence) => occurrence.tick_schedule(),
            Stage::Resting | Stage::Holding(_) => self.timer.tick_schedule(),
            Stage::Done => None,
        }
    }

    pub fn owns(&self, handle: TickHandle) -> bool {
        match &self.stage {
            Stage::Exercising(occurrence) => occurrence.owns(handle),
            Stage::Resting | Stage::Holding(_) => self.timer.owns(handle),
            Stage::Done => false,
        }
    }

    /// Activity entry for the workout as it stands now
    pub fn entry(&self, duration_seconds: u32, outcome: ActivityOutcome) -> ActivityEntry {
        ActivityEntry {
            subject_id: self.run.workout_id.clone(),
            subject_name: self.run.workout_name.clone(),
            duration_seconds,
            completed_at: Utc::now(),
            kind: ActivityKind::Workout,
            outcome,
            session_id: Some(self.run.session_id),
            notes: None,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn tick(&mut self, handle: TickHandle, now: Option<u64>, effects: &mut Vec<Effect>) {
        let mut handle = handle;
        // Each new stage is anchored at the previous one's end, so the same
        // sample is replayed until it lands inside a stage
        while self.advance(handle, now, effects) {
            match self.tick_schedule() {
                Some((next, _)) => handle = next,
                None => return,
            }
        }
    }

    /// Tick the current stage; true if it moved on
    fn advance(&mut self, handle: TickHandle, now: Option<u64>, effects: &mut Vec<Effect>) -> bool {
        match &mut self.stage {
            Stage::Exercising(occurrence) => {
                if occurrence.tick(handle, now, effects) == OccurrenceOutcome::Completed {
                    self.on_occurrence_completed(now, effects);
                    return true;
                }
            }
            Stage::Resting => {
                if self.timer.tick(handle, now, effects) == TickOutcome::Finished {
                    self.on_rest_finished(now, effects);
                    return true;
                }
            }
            Stage::Holding(_) => {
                if self.timer.tick(handle, now, effects) == TickOutcome::HoldElapsed {
                    tracing::debug!("Workout {} display hold elapsed", self.run.workout_id);
                    self.stage = Stage::Done;
                    return true;
                }
            }
            Stage::Done => {}
        }
        false
    }

    /// User-declared completion of the current step
    ///
    /// During an inter-exercise rest this skips the rest. Returns false if
    /// the workout has already finished.
    pub fn complete_current(&mut self, now: Option<u64>, effects: &mut Vec<Effect>) -> bool {
        match &mut self.stage {
            Stage::Exercising(occurrence) => {
                occurrence.finish();
                self.on_occurrence_completed(now, effects);
                true
            }
            Stage::Resting => {
                self.timer.cancel();
                self.on_rest_finished(now, effects);
                true
            }
            Stage::Holding(_) | Stage::Done => false,
        }
    }

    /// Stop everything; false if already done
    pub fn cancel(&mut self) -> bool {
        let was_active = !self.is_done();
        if let Stage::Exercising(occurrence) = &mut self.stage {
            occurrence.cancel();
        }
        self.timer.cancel();
        self.stage = Stage::Done;
        self.run.is_resting = false;
        was_active
    }

    fn on_occurrence_completed(&mut self, now: Option<u64>, effects: &mut Vec<Effect>) {
        let index = self.run.current_index;
        self.completed_steps += 1;
        self.completed_seconds = self
            .completed_seconds
            .saturating_add(self.plan[index].config.effective_seconds());
        tracing::info!(
            "Workout {}: step {}/{} ({}) complete",
            self.run.workout_id,
            index + 1,
            self.plan.len(),
            self.plan[index].spec.id
        );

        let occurrence = match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Exercising(occurrence) => occurrence,
            other => {
                self.stage = other;
                return;
            }
        };
        let start = occurrence.boundary().or(now);

        if index + 1 == self.plan.len() {
            self.finish_workout(occurrence, start, effects);
            return;
        }

        let rest = self.plan[index].rest_seconds;
        if rest == 0 {
            self.begin_step(index + 1, self.settings.pre_countdown_seconds, start, effects);
            return;
        }

        let next = &self.plan[index + 1].spec;
        let upcoming = Announcement::Exercise {
            exercise_id: next.id.clone(),
            name: next.name.clone(),
        };
        match self.timer.rest(rest, start) {
            Ok(_) => {
                self.run.is_resting = true;
                self.run.next_exercise_id = Some(next.id.clone());
                self.stage = Stage::Resting;
                effects.push(Effect::Cue(Cue::RestStart {
                    seconds: rest,
                    upcoming,
                }));
            }
            Err(e) => {
                tracing::error!("Could not start rest: {}", e);
                self.begin_step(index + 1, 0, start, effects);
            }
        }
    }

    fn on_rest_finished(&mut self, now: Option<u64>, effects: &mut Vec<Effect>) {
        let start = self.timer.boundary().or(now);
        let next = self.run.current_index + 1;
        let spec = &self.plan[next].spec;
        effects.push(Effect::Cue(Cue::RestEnd {
            upcoming: Announcement::Exercise {
                exercise_id: spec.id.clone(),
                name: spec.name.clone(),
            },
        }));
        self.run.is_resting = false;
        self.run.next_exercise_id = None;
        self.begin_step(next, 0, start, effects);
    }

    fn begin_step(
        &mut self,
        index: usize,
        pre_countdown_seconds: u32,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) {
        self.run.current_index = index;
        let step = &self.plan[index];
        match Occurrence::begin(
            &step.spec,
            step.config,
            &self.settings,
            pre_countdown_seconds,
            now,
            effects,
        ) {
            Ok(occurrence) => self.stage = Stage::Exercising(occurrence),
            Err(e) => {
                tracing::error!("Could not start step {} ({}): {}", index + 1, step.spec.id, e);
                self.timer.cancel();
                self.stage = Stage::Done;
            }
        }
    }

    fn finish_workout(&mut self, last: Occurrence, now: Option<u64>, effects: &mut Vec<Effect>) {
        effects.push(Effect::Cue(Cue::Completion {
            subject_id: self.run.workout_id.clone(),
        }));
        effects.push(Effect::Record(
            self.entry(self.completed_seconds, ActivityOutcome::Completed),
        ));
        tracing::info!(
            "Workout {} complete ({}s of work)",
            self.run.workout_id,
            self.completed_seconds
        );

        let hold = self.settings.display_hold;
        if hold.is_zero() {
            self.stage = Stage::Done;
        } else {
            self.timer.hold(hold.as_secs_f64(), now);
            self.stage = Stage::Holding(last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_default_catalog;
    use crate::{StepOverrides, TimerPhase};

    fn settings() -> TimerSettings {
        TimerSettings {
            pre_countdown_seconds: 0,
            ..TimerSettings::default()
        }
    }

    fn timed_step(id: &str, order: u32, seconds: u32) -> WorkoutStep {
        WorkoutStep::new(id, order).with_overrides(StepOverrides {
            duration_seconds: Some(seconds),
            ..Default::default()
        })
    }

    /// Tick once per `step_ms` until the sequencer is done
    fn drive(
        sequencer: &mut WorkoutSequencer,
        start_ms: u64,
        step_ms: u64,
        effects: &mut Vec<Effect>,
    ) -> u64 {
        let mut now = start_ms;
        while let Some((handle, _)) = sequencer.tick_schedule() {
            now += step_ms;
            sequencer.tick(handle, Some(now), effects);
            assert!(now < 1_000_000, "workout never finished");
        }
        now
    }

    #[test]
    fn test_empty_workout_rejected() {
        let mut effects = Vec::new();
        let result = WorkoutSequencer::start(
            Workout::from(vec![]),
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        );
        assert!(matches!(result, Err(Error::EmptyWorkout)));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_unknown_step_rejected_before_start() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            WorkoutStep::new("plank", 1),
            WorkoutStep::new("levitation", 2),
        ]);
        let result = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        );
        assert!(matches!(result, Err(Error::UnknownExercise(id)) if id == "levitation"));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_steps_run_in_order() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            timed_step("wall_sit", 2, 3).with_rest(0),
            timed_step("plank", 1, 2).with_rest(0),
        ]);
        let sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        assert_eq!(sequencer.run().steps[0].exercise_id, "plank");
        assert_eq!(sequencer.state().exercise_id.as_deref(), Some("plank"));
        assert_eq!(sequencer.planned_seconds(), 5);
    }

    #[test]
    fn test_rest_preloads_next_exercise() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            timed_step("plank", 1, 5).with_rest(30),
            timed_step("wall_sit", 2, 5),
        ]);
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        let (handle, _) = sequencer.tick_schedule().unwrap();
        sequencer.tick(handle, Some(5_000), &mut effects);

        let run = sequencer.run();
        assert!(run.is_resting);
        assert_eq!(run.current_index, 0);
        assert_eq!(run.next_exercise_id.as_deref(), Some("wall_sit"));
        assert_eq!(sequencer.state().phase, TimerPhase::Resting);
        assert_eq!(sequencer.state().target_seconds, 30.0);
        assert!(matches!(
            effects.last(),
            Some(Effect::Cue(Cue::RestStart { seconds: 30, .. }))
        ));

        // The first step's handle is dead once resting
        assert!(!sequencer.owns(handle));

        let (rest, _) = sequencer.tick_schedule().unwrap();
        effects.clear();
        sequencer.tick(rest, Some(35_000), &mut effects);

        assert_eq!(sequencer.run().current_index, 1);
        assert!(!sequencer.run().is_resting);
        assert_eq!(sequencer.state().phase, TimerPhase::Running);
        assert!(matches!(effects[0], Effect::Cue(Cue::RestEnd { .. })));
        assert!(matches!(
            &effects[1],
            Effect::Cue(Cue::Start { exercise_id, .. }) if exercise_id == "wall_sit"
        ));
    }

    #[test]
    fn test_completion_records_effective_seconds_once() {
        let mut effects = Vec::new();
        let workout = Workout {
            id: "morning".into(),
            name: "Morning".into(),
            steps: vec![
                timed_step("plank", 1, 5).with_rest(10),
                WorkoutStep::new("squats", 2).with_overrides(StepOverrides {
                    sets: Some(1),
                    reps: Some(2),
                    rep_duration_seconds: Some(1.5),
                    ..Default::default()
                }),
            ],
        };
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        let session_id = sequencer.run().session_id;

        drive(&mut sequencer, 0, 100, &mut effects);

        let records: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Record(entry) => Some(entry),
                _ => None,
            })
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_seconds, 8);
        assert_eq!(records[0].kind, ActivityKind::Workout);
        assert_eq!(records[0].subject_id, "morning");
        assert_eq!(records[0].session_id, Some(session_id));

        let completion = effects
            .iter()
            .position(|e| matches!(e, Effect::Cue(Cue::Completion { .. })))
            .unwrap();
        assert!(matches!(effects[completion + 1], Effect::Record(_)));
        assert!(sequencer.is_done());
        assert_eq!(sequencer.progress(), 1.0);
    }

    #[test]
    fn test_display_hold_keeps_completed_state() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![timed_step("plank", 1, 2)]);
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        let (handle, _) = sequencer.tick_schedule().unwrap();
        sequencer.tick(handle, Some(2_000), &mut effects);

        assert!(sequencer.is_finished());
        assert!(!sequencer.is_done());
        assert_eq!(sequencer.state().phase, TimerPhase::Completed);
        assert_eq!(sequencer.state().elapsed_seconds, 2.0);

        let (hold, interval) = sequencer.tick_schedule().unwrap();
        assert_eq!(interval, Duration::from_millis(100));
        sequencer.tick(hold, Some(3_900), &mut effects);
        assert!(!sequencer.is_done());
        sequencer.tick(hold, Some(4_000), &mut effects);
        assert!(sequencer.is_done());
        assert_eq!(sequencer.state().phase, TimerPhase::Idle);
    }

    #[test]
    fn test_complete_current_advances() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            timed_step("plank", 1, 60).with_rest(0),
            timed_step("wall_sit", 2, 45),
        ]);
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        assert!(sequencer.complete_current(Some(1_000), &mut effects));
        assert_eq!(sequencer.run().current_index, 1);
        assert_eq!(sequencer.progress(), 0.5);
        assert_eq!(sequencer.worked_seconds(), 60.0);
    }

    #[test]
    fn test_late_sample_replays_through_stages() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            timed_step("plank", 1, 5).with_rest(3),
            timed_step("wall_sit", 2, 4),
        ]);
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        // Rest runs 5000..8000 even though the step end was seen at 6500
        let (handle, _) = sequencer.tick_schedule().unwrap();
        sequencer.tick(handle, Some(6_500), &mut effects);
        assert!(sequencer.run().is_resting);
        assert_eq!(sequencer.state().elapsed_seconds, 1.0);

        // Second step starts at 8000, not at the 8900 sample
        let (handle, _) = sequencer.tick_schedule().unwrap();
        sequencer.tick(handle, Some(8_900), &mut effects);
        assert_eq!(sequencer.run().current_index, 1);
        assert_eq!(sequencer.state().phase, TimerPhase::Running);

        let (handle, _) = sequencer.tick_schedule().unwrap();
        sequencer.tick(handle, Some(12_000), &mut effects);
        assert!(sequencer.is_finished());
    }

    #[test]
    fn test_single_late_sample_finishes_workout() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            timed_step("plank", 1, 5).with_rest(3),
            timed_step("wall_sit", 2, 4),
        ]);
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        // 5s + 3s rest + 4s, then the 2s hold
        let (handle, _) = sequencer.tick_schedule().unwrap();
        sequencer.tick(handle, Some(14_000), &mut effects);

        assert!(sequencer.is_done());
        let records = effects
            .iter()
            .filter(|e| matches!(e, Effect::Record(entry) if entry.duration_seconds == 9))
            .count();
        assert_eq!(records, 1);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let mut effects = Vec::new();
        let workout = Workout::from(vec![
            timed_step("plank", 1, 3_000_000_000).with_rest(0),
            timed_step("wall_sit", 2, 3_000_000_000),
        ]);
        let mut sequencer = WorkoutSequencer::start(
            workout,
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        assert_eq!(sequencer.planned_seconds(), u32::MAX);

        assert!(sequencer.complete_current(Some(1_000), &mut effects));
        assert!(sequencer.complete_current(Some(2_000), &mut effects));

        let record = effects.iter().find_map(|e| match e {
            Effect::Record(entry) => Some(entry),
            _ => None,
        });
        assert_eq!(record.unwrap().duration_seconds, u32::MAX);
        assert_eq!(sequencer.worked_seconds(), f64::from(u32::MAX));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut effects = Vec::new();
        let mut sequencer = WorkoutSequencer::start(
            Workout::from(vec![timed_step("plank", 1, 10)]),
            get_default_catalog(),
            &settings(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        let (handle, _) = sequencer.tick_schedule().unwrap();

        assert!(sequencer.cancel());
        assert!(!sequencer.cancel());
        assert!(sequencer.tick_schedule().is_none());

        effects.clear();
        sequencer.tick(handle, Some(20_000), &mut effects);
        assert!(effects.is_empty());
    }
}
