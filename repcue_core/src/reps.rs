//! Repetition and set tracking for rep-based exercises.
//!
//! Counter advancement is a pure function on `RepCounters`; the bound is
//! checked before incrementing, so `current_rep` can never be observed above
//! `total_reps` ("Rep 6 of 5"). `RepSetTracker` drives one `ExerciseTimer`
//! per repetition and inserts the inter-set rest.

use crate::clock::TickHandle;
use crate::effects::{Announcement, Cue, Effect};
use crate::timer::{ExerciseTimer, TickIntervals, TickOutcome, TimedRun};
use crate::{RepPlan, Result, TickMode, TimerPhase, TimerState};
use serde::Serialize;
use std::time::Duration;

/// Rep/set position within one occurrence
///
/// `current_rep` counts reps completed in the current set; `current_set`
/// is zero-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RepCounters {
    pub current_rep: u32,
    pub total_reps: u32,
    pub current_set: u32,
    pub total_sets: u32,
}

/// What follows a completed rep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepAdvance {
    NextRep,
    SetRest,
    Done,
}

impl RepCounters {
    pub fn new(total_reps: u32, total_sets: u32) -> Self {
        Self {
            current_rep: 0,
            total_reps: total_reps.max(1),
            current_set: 0,
            total_sets: total_sets.max(1),
        }
    }

    pub fn is_last_set(&self) -> bool {
        self.current_set + 1 >= self.total_sets
    }

    /// Reps completed across all sets so far
    pub fn completed_reps(&self) -> u32 {
        self.current_set * self.total_reps + self.current_rep
    }

    /// Record one completed rep
    pub fn complete_rep(self) -> (Self, RepAdvance) {
        if self.current_rep >= self.total_reps {
            tracing::warn!(
                "Rep completion past the end of set {} ignored",
                self.current_set + 1
            );
            return (self, self.after_full_set());
        }

        let next = Self {
            current_rep: self.current_rep + 1,
            ..self
        };
        let advance = if next.current_rep < next.total_reps {
            RepAdvance::NextRep
        } else {
            next.after_full_set()
        };
        (next, advance)
    }

    /// Move to rep 0 of the next set; unchanged on the last set
    pub fn begin_next_set(self) -> Self {
        if self.is_last_set() {
            return self;
        }
        Self {
            current_rep: 0,
            current_set: self.current_set + 1,
            ..self
        }
    }

    fn after_full_set(&self) -> RepAdvance {
        if self.is_last_set() {
            RepAdvance::Done
        } else {
            RepAdvance::SetRest
        }
    }

    fn upcoming_set(&self) -> Announcement {
        let next = if self.current_rep >= self.total_reps && !self.is_last_set() {
            self.current_set + 1
        } else {
            self.current_set
        };
        Announcement::Set {
            set: next + 1,
            total_sets: self.total_sets,
            reps: self.total_reps,
        }
    }
}

/// Outcome of a tracker tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerOutcome {
    Pending,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Rep,
    SetRest,
    Completed,
    Cancelled,
}

/// Drives sets × reps of one exercise
#[derive(Debug)]
pub struct RepSetTracker {
    exercise_id: String,
    plan: RepPlan,
    counters: RepCounters,
    stage: Stage,
    timer: ExerciseTimer,
}

impl RepSetTracker {
    /// Start the first rep of the first set
    ///
    /// The pre-countdown only precedes the first rep.
    pub fn start(
        exercise_id: impl Into<String>,
        plan: RepPlan,
        pre_countdown_seconds: u32,
        intervals: TickIntervals,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) -> Result<Self> {
        crate::RunConfig::Reps(plan).validate()?;

        let mut tracker = Self {
            exercise_id: exercise_id.into(),
            plan,
            counters: RepCounters::new(plan.reps_total, plan.sets_total),
            stage: Stage::Rep,
            timer: ExerciseTimer::new(intervals),
        };
        tracker.start_rep(pre_countdown_seconds, now)?;
        if pre_countdown_seconds == 0 {
            tracker.push_start_cue(effects);
        }

        tracing::info!(
            "Started {}: {} sets x {} reps @ {}s",
            tracker.exercise_id,
            plan.sets_total,
            plan.reps_total,
            plan.per_rep_seconds
        );
        Ok(tracker)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn counters(&self) -> RepCounters {
        self.counters
    }

    pub fn plan(&self) -> &RepPlan {
        &self.plan
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Stage::Completed
    }

    /// Seconds of actual work so far, rest excluded
    pub fn worked_seconds(&self) -> f64 {
        let done = f64::from(self.counters.completed_reps()) * self.plan.per_rep_seconds;
        let current = if self.stage == Stage::Rep && self.timer.phase() == TimerPhase::Running {
            self.timer.elapsed()
        } else {
            0.0
        };
        done + current
    }

    pub fn tick_schedule(&self) -> Option<(TickHandle, Duration)> {
        self.timer.tick_schedule()
    }

    /// Clock instant the last rep ended, once completed naturally
    pub fn boundary(&self) -> Option<u64> {
        match self.stage {
            Stage::Completed => self.timer.boundary(),
            _ => None,
        }
    }

    pub fn owns(&self, handle: TickHandle) -> bool {
        self.timer.owns(handle)
    }

    pub fn state(&self) -> TimerState {
        let mut state = self.timer.state();
        state.phase = match self.stage {
            Stage::Completed => TimerPhase::Completed,
            Stage::Cancelled => TimerPhase::Idle,
            Stage::Rep | Stage::SetRest => state.phase,
        };
        if state.phase == TimerPhase::Completed {
            state.elapsed_seconds = state.target_seconds;
        }
        state.reps = Some(self.counters);
        state.exercise_id = Some(self.exercise_id.clone());
        state
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn tick(
        &mut self,
        handle: TickHandle,
        now: Option<u64>,
        effects: &mut Vec<Effect>,
    ) -> TrackerOutcome {
        let mut handle = handle;
        loop {
            match self.timer.tick(handle, now, effects) {
                TickOutcome::Started => self.push_start_cue(effects),
                TickOutcome::Finished => match self.stage {
                    Stage::Rep => {
                        if self.on_rep_finished(now, effects) == TrackerOutcome::Completed {
                            return TrackerOutcome::Completed;
                        }
                    }
                    Stage::SetRest => self.on_set_rest_finished(now, effects),
                    Stage::Completed | Stage::Cancelled => return TrackerOutcome::Pending,
                },
                TickOutcome::Noop | TickOutcome::Progress | TickOutcome::HoldElapsed => {
                    return TrackerOutcome::Pending
                }
            }

            // The next phase starts at the previous boundary, so a late
            // sample may already cover it
            match self.timer.tick_schedule() {
                Some((next, _)) => handle = next,
                None => return TrackerOutcome::Pending,
            }
        }
    }

    /// Treat the occurrence as fully done (user-declared completion)
    pub fn finish(&mut self) {
        self.timer.finish();
        self.counters = RepCounters {
            current_rep: self.counters.total_reps,
            current_set: self.counters.total_sets - 1,
            ..self.counters
        };
        self.stage = Stage::Completed;
    }

    pub fn cancel(&mut self) -> bool {
        if matches!(self.stage, Stage::Cancelled) {
            return false;
        }
        self.timer.cancel();
        self.stage = Stage::Cancelled;
        true
    }

    fn on_rep_finished(&mut self, now: Option<u64>, effects: &mut Vec<Effect>) -> TrackerOutcome {
        let start = self.timer.boundary().or(now);
        let (counters, advance) = self.counters.complete_rep();
        self.counters = counters;
        tracing::debug!(
            "{}: rep {}/{} of set {}/{} done",
            self.exercise_id,
            counters.current_rep,
            counters.total_reps,
            counters.current_set + 1,
            counters.total_sets
        );

        match advance {
            RepAdvance::NextRep => {
                self.restart_rep(start);
                TrackerOutcome::Pending
            }
            RepAdvance::SetRest if self.plan.set_rest_seconds == 0 => {
                self.counters = self.counters.begin_next_set();
                self.restart_rep(start);
                self.push_start_cue(effects);
                TrackerOutcome::Pending
            }
            RepAdvance::SetRest => {
                let upcoming = self.counters.upcoming_set();
                match self.timer.rest(self.plan.set_rest_seconds, start) {
                    Ok(_) => {
                        self.stage = Stage::SetRest;
                        effects.push(Effect::Cue(Cue::RestStart {
                            seconds: self.plan.set_rest_seconds,
                            upcoming,
                        }));
                    }
                    Err(e) => tracing::error!("Could not start set rest: {}", e),
                }
                TrackerOutcome::Pending
            }
            RepAdvance::Done => {
                self.stage = Stage::Completed;
                tracing::info!("{}: all sets complete", self.exercise_id);
                TrackerOutcome::Completed
            }
        }
    }

    fn on_set_rest_finished(&mut self, now: Option<u64>, effects: &mut Vec<Effect>) {
        let start = self.timer.boundary().or(now);
        effects.push(Effect::Cue(Cue::RestEnd {
            upcoming: self.counters.upcoming_set(),
        }));
        self.counters = self.counters.begin_next_set();
        self.stage = Stage::Rep;
        self.restart_rep(start);
        self.push_start_cue(effects);
    }

    fn restart_rep(&mut self, now: Option<u64>) {
        if let Err(e) = self.start_rep(0, now) {
            tracing::error!("Could not start next rep: {}", e);
        }
    }

    fn start_rep(&mut self, pre_countdown_seconds: u32, now: Option<u64>) -> Result<()> {
        self.timer.start(
            TimedRun {
                target_seconds: self.plan.per_rep_seconds,
                pre_countdown_seconds,
                mode: TickMode::Smooth,
                interval_seconds: None,
            },
            now,
        )?;
        Ok(())
    }

    fn push_start_cue(&self, effects: &mut Vec<Effect>) {
        effects.push(Effect::Cue(Cue::Start {
            exercise_id: self.exercise_id.clone(),
            announcement: Some(self.counters.upcoming_set()),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plan(sets: u32, reps: u32, per_rep: f64, rest: u32) -> RepPlan {
        RepPlan {
            sets_total: sets,
            reps_total: reps,
            per_rep_seconds: per_rep,
            set_rest_seconds: rest,
        }
    }

    /// Tick every 100 ms until the tracker completes or `limit_ms` passes
    fn drive(
        tracker: &mut RepSetTracker,
        mut now: u64,
        limit_ms: u64,
        effects: &mut Vec<Effect>,
        phases: &mut Vec<TimerPhase>,
    ) -> Option<u64> {
        while now <= limit_ms {
            now += 100;
            let Some((handle, _)) = tracker.tick_schedule() else {
                return None;
            };
            let outcome = tracker.tick(handle, Some(now), effects);
            let state = tracker.state();
            let counters = state.reps.unwrap();
            assert!(counters.current_rep <= counters.total_reps);
            assert!(counters.current_set < counters.total_sets);
            if phases.last() != Some(&state.phase) {
                phases.push(state.phase);
            }
            if outcome == TrackerOutcome::Completed {
                return Some(now);
            }
        }
        None
    }

    #[test]
    fn test_complete_rep_advances_within_set() {
        let counters = RepCounters::new(3, 2);
        let (counters, advance) = counters.complete_rep();
        assert_eq!(counters.current_rep, 1);
        assert_eq!(advance, RepAdvance::NextRep);
    }

    #[test]
    fn test_last_rep_of_set_requests_rest() {
        let counters = RepCounters {
            current_rep: 2,
            total_reps: 3,
            current_set: 0,
            total_sets: 2,
        };
        let (counters, advance) = counters.complete_rep();
        assert_eq!(counters.current_rep, 3);
        assert_eq!(advance, RepAdvance::SetRest);

        let next = counters.begin_next_set();
        assert_eq!(next.current_rep, 0);
        assert_eq!(next.current_set, 1);
    }

    #[test]
    fn test_last_rep_of_last_set_is_done() {
        let counters = RepCounters {
            current_rep: 2,
            total_reps: 3,
            current_set: 1,
            total_sets: 2,
        };
        let (counters, advance) = counters.complete_rep();
        assert_eq!(advance, RepAdvance::Done);

        // Extra completions stay at the bound
        let (again, advance) = counters.complete_rep();
        assert_eq!(again, counters);
        assert_eq!(advance, RepAdvance::Done);
        assert_eq!(again.begin_next_set(), again);
    }

    #[test]
    fn test_two_sets_with_rest_phase_sequence() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(2, 3, 2.0, 5),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        let mut phases = vec![tracker.state().phase];
        let done_at = drive(&mut tracker, 0, 60_000, &mut effects, &mut phases).unwrap();

        assert_eq!(
            phases,
            vec![
                TimerPhase::Running,
                TimerPhase::Resting,
                TimerPhase::Running,
                TimerPhase::Completed
            ]
        );
        // 3 reps x 2s, 5s rest, 3 reps x 2s
        assert_eq!(done_at, 17_000);
        assert_eq!(tracker.worked_seconds(), 12.0);

        let counters = tracker.counters();
        assert_eq!(counters.current_rep, 3);
        assert_eq!(counters.current_set, 1);
    }

    #[test]
    fn test_rest_end_precedes_next_start_cue() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(2, 1, 1.0, 2),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        drive(&mut tracker, 0, 10_000, &mut effects, &mut Vec::new()).unwrap();

        let cues: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Cue(cue) => Some(cue.clone()),
                _ => None,
            })
            .collect();
        let upcoming = Announcement::Set {
            set: 2,
            total_sets: 2,
            reps: 1,
        };
        assert_eq!(
            cues,
            vec![
                Cue::Start {
                    exercise_id: "squats".into(),
                    announcement: Some(Announcement::Set {
                        set: 1,
                        total_sets: 2,
                        reps: 1
                    }),
                },
                Cue::RestStart {
                    seconds: 2,
                    upcoming: upcoming.clone(),
                },
                Cue::RestEnd {
                    upcoming: upcoming.clone(),
                },
                Cue::Start {
                    exercise_id: "squats".into(),
                    announcement: Some(upcoming),
                },
            ]
        );
    }

    #[test]
    fn test_zero_set_rest_goes_straight_to_next_set() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "pushups",
            plan(3, 2, 1.0, 0),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        let mut phases = vec![tracker.state().phase];

        let done_at = drive(&mut tracker, 0, 20_000, &mut effects, &mut phases).unwrap();

        assert_eq!(done_at, 6_000);
        assert!(!phases.contains(&TimerPhase::Resting));
    }

    #[test]
    fn test_countdown_only_before_first_rep() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(1, 2, 1.0, 0),
            3,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        assert_eq!(tracker.state().phase, TimerPhase::Countdown);
        assert!(effects.is_empty());

        let done_at = drive(&mut tracker, 0, 20_000, &mut effects, &mut Vec::new()).unwrap();
        assert_eq!(done_at, 5_000);
        assert!(matches!(effects[0], Effect::Cue(Cue::Start { .. })));
    }

    #[test]
    fn test_worked_seconds_mid_rep() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(2, 3, 2.0, 5),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        drive(&mut tracker, 0, 2_900, &mut effects, &mut Vec::new());

        // One rep done, 1s into the second
        assert!((tracker.worked_seconds() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_late_ticks_keep_rep_schedule() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(1, 3, 2.0, 0),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        let mut tick_at = |tracker: &mut RepSetTracker, now: u64| {
            let (handle, _) = tracker.tick_schedule().unwrap();
            tracker.tick(handle, Some(now), &mut effects)
        };

        // Each rep starts where the previous one ended, not at the late sample
        assert_eq!(tick_at(&mut tracker, 2_500), TrackerOutcome::Pending);
        assert_eq!(tracker.counters().current_rep, 1);
        assert_eq!(tick_at(&mut tracker, 4_000), TrackerOutcome::Pending);
        assert_eq!(tracker.counters().current_rep, 2);
        assert_eq!(tick_at(&mut tracker, 4_500), TrackerOutcome::Pending);
        assert_eq!(tick_at(&mut tracker, 6_000), TrackerOutcome::Completed);
        assert_eq!(tracker.counters().current_rep, 3);
        assert_eq!(tracker.boundary(), Some(6_000));
    }

    #[test]
    fn test_one_late_sample_covers_several_reps() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(2, 2, 1.0, 3),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();

        // 2 reps, 3s rest, then 2 more reps: all done by 7000
        let (handle, _) = tracker.tick_schedule().unwrap();
        let outcome = tracker.tick(handle, Some(7_000), &mut effects);
        assert_eq!(outcome, TrackerOutcome::Completed);
        assert_eq!(tracker.boundary(), Some(7_000));
        assert_eq!(tracker.worked_seconds(), 4.0);

        let starts = effects
            .iter()
            .filter(|e| matches!(e, Effect::Cue(Cue::Start { .. })))
            .count();
        assert_eq!(starts, 2);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut effects = Vec::new();
        let mut tracker = RepSetTracker::start(
            "squats",
            plan(1, 1, 1.0, 0),
            0,
            TickIntervals::default(),
            Some(0),
            &mut effects,
        )
        .unwrap();
        assert!(tracker.cancel());
        assert!(!tracker.cancel());
        assert!(tracker.tick_schedule().is_none());
        assert_eq!(tracker.state().phase, TimerPhase::Idle);
    }

    proptest! {
        #[test]
        fn prop_counters_never_exceed_bounds(reps in 1u32..20, sets in 1u32..10, extra in 0u32..5) {
            let mut counters = RepCounters::new(reps, sets);
            let mut completed = 0u32;
            loop {
                let (next, advance) = counters.complete_rep();
                prop_assert!(next.current_rep <= next.total_reps);
                prop_assert!(next.current_set < next.total_sets);
                completed += 1;
                counters = next;
                match advance {
                    RepAdvance::NextRep => {}
                    RepAdvance::SetRest => {
                        counters = counters.begin_next_set();
                        prop_assert_eq!(counters.current_rep, 0);
                        prop_assert!(counters.current_set < counters.total_sets);
                    }
                    RepAdvance::Done => break,
                }
            }
            prop_assert_eq!(completed, reps * sets);
            prop_assert_eq!(counters.completed_reps(), reps * sets);

            for _ in 0..extra {
                let (next, advance) = counters.complete_rep();
                prop_assert_eq!(next, counters);
                prop_assert_eq!(advance, RepAdvance::Done);
            }
        }
    }
}
