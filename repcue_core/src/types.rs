//! Core domain types for the RepCue timing engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercise definitions and per-occurrence overrides
//! - Resolved run parameters
//! - Workout steps
//! - Timer phases and presentation snapshots
//! - Activity log entries

use crate::reps::RepCounters;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Exercise Types
// ============================================================================

/// How an exercise is measured
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    TimeBased,
    RepetitionBased,
}

/// Catalog defaults, carrying only the fields valid for each kind
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExerciseDefaults {
    /// Continuous hold or effort (e.g. plank, wall sit)
    TimeBased { duration_seconds: u32 },
    /// Counted repetitions in sets (e.g. squats, push-ups)
    RepetitionBased {
        sets: u32,
        reps: u32,
        rep_duration_seconds: f64,
    },
}

/// An exercise definition (e.g. "Plank")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSpec {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub defaults: ExerciseDefaults,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExerciseSpec {
    pub fn kind(&self) -> ExerciseKind {
        match self.defaults {
            ExerciseDefaults::TimeBased { .. } => ExerciseKind::TimeBased,
            ExerciseDefaults::RepetitionBased { .. } => ExerciseKind::RepetitionBased,
        }
    }
}

/// Per-occurrence custom values layered over catalog defaults
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_rest_seconds: Option<u32>,
}

// ============================================================================
// Resolved Run Parameters
// ============================================================================

/// Repetition plan for one rep-based occurrence
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepPlan {
    pub sets_total: u32,
    pub reps_total: u32,
    pub per_rep_seconds: f64,
    pub set_rest_seconds: u32,
}

impl RepPlan {
    /// Seconds of work, excluding inter-set rest
    pub fn work_seconds(&self) -> f64 {
        f64::from(self.sets_total) * f64::from(self.reps_total) * self.per_rep_seconds
    }
}

/// Resolved parameters for one timer run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunConfig {
    Timed { target_seconds: u32 },
    Reps(RepPlan),
}

impl RunConfig {
    /// Resolve run parameters from catalog defaults and overrides
    ///
    /// `default_set_rest` is used when neither the overrides nor the plan
    /// name an inter-set rest. Duration overrides do not apply to
    /// repetition-based exercises.
    pub fn resolve(
        spec: &ExerciseSpec,
        overrides: &StepOverrides,
        default_set_rest: u32,
    ) -> Result<Self> {
        let config = match &spec.defaults {
            ExerciseDefaults::TimeBased { duration_seconds } => RunConfig::Timed {
                target_seconds: overrides.duration_seconds.unwrap_or(*duration_seconds),
            },
            ExerciseDefaults::RepetitionBased {
                sets,
                reps,
                rep_duration_seconds,
            } => {
                if overrides.duration_seconds.is_some() {
                    tracing::debug!(
                        "Ignoring duration override for repetition-based exercise {}",
                        spec.id
                    );
                }
                RunConfig::Reps(RepPlan {
                    sets_total: overrides.sets.unwrap_or(*sets),
                    reps_total: overrides.reps.unwrap_or(*reps),
                    per_rep_seconds: overrides
                        .rep_duration_seconds
                        .unwrap_or(*rep_duration_seconds),
                    set_rest_seconds: overrides.set_rest_seconds.unwrap_or(default_set_rest),
                })
            }
        };

        config.validate().map_err(|e| match e {
            Error::InvalidRunConfig(msg) => {
                Error::InvalidRunConfig(format!("{} ({})", msg, spec.id))
            }
            other => other,
        })?;
        Ok(config)
    }

    /// Check the run invariants: target > 0, sets >= 1, reps >= 1
    pub fn validate(&self) -> Result<()> {
        match self {
            RunConfig::Timed { target_seconds } => {
                if *target_seconds == 0 {
                    return Err(Error::InvalidRunConfig(
                        "target seconds must be greater than zero".into(),
                    ));
                }
            }
            RunConfig::Reps(plan) => {
                if plan.sets_total < 1 {
                    return Err(Error::InvalidRunConfig("sets must be at least 1".into()));
                }
                if plan.reps_total < 1 {
                    return Err(Error::InvalidRunConfig("reps must be at least 1".into()));
                }
                if !(plan.per_rep_seconds.is_finite() && plan.per_rep_seconds > 0.0) {
                    return Err(Error::InvalidRunConfig(format!(
                        "seconds per rep must be positive, got {}",
                        plan.per_rep_seconds
                    )));
                }
            }
        }
        Ok(())
    }

    /// Effective duration used for activity logging (rest excluded)
    pub fn effective_seconds(&self) -> u32 {
        match self {
            RunConfig::Timed { target_seconds } => *target_seconds,
            RunConfig::Reps(plan) => plan.work_seconds().round() as u32,
        }
    }
}

// ============================================================================
// Workout Types
// ============================================================================

/// One ordered entry in a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutStep {
    pub exercise_id: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default, flatten)]
    pub overrides: StepOverrides,
    /// Rest after this step; `None` uses the configured default, 0 disables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_seconds: Option<u32>,
}

impl WorkoutStep {
    pub fn new(exercise_id: impl Into<String>, order: u32) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            order,
            overrides: StepOverrides::default(),
            rest_seconds: None,
        }
    }

    pub fn with_rest(mut self, seconds: u32) -> Self {
        self.rest_seconds = Some(seconds);
        self
    }

    pub fn with_overrides(mut self, overrides: StepOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// A workout definition as supplied by the caller
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    #[serde(default = "default_workout_id")]
    pub id: String,
    #[serde(default = "default_workout_name")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<WorkoutStep>,
}

fn default_workout_id() -> String {
    "workout".into()
}

fn default_workout_name() -> String {
    "Workout".into()
}

impl From<Vec<WorkoutStep>> for Workout {
    fn from(steps: Vec<WorkoutStep>) -> Self {
        Self {
            id: default_workout_id(),
            name: default_workout_name(),
            steps,
        }
    }
}

// ============================================================================
// Timer Phase and Snapshot Types
// ============================================================================

/// Discrete mode of the timer; exactly one is active at a time
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Countdown,
    Running,
    Resting,
    Completed,
}

/// Tick granularity for a run
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// Elapsed is floored to whole seconds
    WholeSeconds,
    /// Elapsed keeps fractional seconds for smooth progress
    Smooth,
}

/// Read-only snapshot of the active timer for presentation
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TimerState {
    pub phase: TimerPhase,
    pub elapsed_seconds: f64,
    pub target_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps: Option<RepCounters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise_id: Option<String>,
}

impl TimerState {
    pub fn idle() -> Self {
        Self {
            phase: TimerPhase::Idle,
            elapsed_seconds: 0.0,
            target_seconds: 0.0,
            countdown_remaining: None,
            reps: None,
            exercise_id: None,
        }
    }

    /// 0.0 .. 1.0 progress within the current phase
    pub fn progress(&self) -> f64 {
        match self.phase {
            TimerPhase::Completed => 1.0,
            _ if self.target_seconds <= 0.0 => 0.0,
            _ => (self.elapsed_seconds / self.target_seconds).clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// Activity Log Types
// ============================================================================

/// What a log entry summarizes
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Single,
    Workout,
}

/// How the logged unit ended
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOutcome {
    Completed,
    ManualStop,
}

/// A completed (or manually stopped) unit handed to the activity recorder
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub subject_id: String,
    pub subject_name: String,
    pub duration_seconds: u32,
    pub completed_at: DateTime<Utc>,
    pub kind: ActivityKind,
    pub outcome: ActivityOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squats() -> ExerciseSpec {
        ExerciseSpec {
            id: "squats".into(),
            name: "Squats".into(),
            defaults: ExerciseDefaults::RepetitionBased {
                sets: 3,
                reps: 10,
                rep_duration_seconds: 2.0,
            },
            tags: vec![],
        }
    }

    fn plank() -> ExerciseSpec {
        ExerciseSpec {
            id: "plank".into(),
            name: "Plank".into(),
            defaults: ExerciseDefaults::TimeBased {
                duration_seconds: 60,
            },
            tags: vec![],
        }
    }

    #[test]
    fn test_resolve_timed_uses_override() {
        let overrides = StepOverrides {
            duration_seconds: Some(45),
            ..Default::default()
        };
        let config = RunConfig::resolve(&plank(), &overrides, 30).unwrap();
        assert_eq!(config, RunConfig::Timed { target_seconds: 45 });
        assert_eq!(config.effective_seconds(), 45);
    }

    #[test]
    fn test_resolve_reps_merges_overrides() {
        let overrides = StepOverrides {
            sets: Some(2),
            set_rest_seconds: Some(5),
            ..Default::default()
        };
        let config = RunConfig::resolve(&squats(), &overrides, 30).unwrap();
        match config {
            RunConfig::Reps(plan) => {
                assert_eq!(plan.sets_total, 2);
                assert_eq!(plan.reps_total, 10);
                assert_eq!(plan.set_rest_seconds, 5);
            }
            other => panic!("Expected reps config, got {:?}", other),
        }
        assert_eq!(config.effective_seconds(), 40);
    }

    #[test]
    fn test_resolve_rejects_zero_target() {
        let overrides = StepOverrides {
            duration_seconds: Some(0),
            ..Default::default()
        };
        let result = RunConfig::resolve(&plank(), &overrides, 30);
        assert!(matches!(result, Err(Error::InvalidRunConfig(_))));
    }

    #[test]
    fn test_resolve_rejects_zero_reps_and_sets() {
        for overrides in [
            StepOverrides {
                reps: Some(0),
                ..Default::default()
            },
            StepOverrides {
                sets: Some(0),
                ..Default::default()
            },
            StepOverrides {
                rep_duration_seconds: Some(0.0),
                ..Default::default()
            },
        ] {
            let result = RunConfig::resolve(&squats(), &overrides, 30);
            assert!(matches!(result, Err(Error::InvalidRunConfig(_))));
        }
    }

    #[test]
    fn test_workout_step_from_toml() {
        let toml_str = r#"
name = "Leg day"

[[steps]]
exercise_id = "squats"
order = 1
sets = 2
rest_seconds = 0

[[steps]]
exercise_id = "plank"
order = 2
duration_seconds = 40
"#;
        let workout: Workout = toml::from_str(toml_str).unwrap();
        assert_eq!(workout.name, "Leg day");
        assert_eq!(workout.id, "workout");
        assert_eq!(workout.steps.len(), 2);
        assert_eq!(workout.steps[0].overrides.sets, Some(2));
        assert_eq!(workout.steps[0].rest_seconds, Some(0));
        assert_eq!(workout.steps[1].overrides.duration_seconds, Some(40));
        assert_eq!(workout.steps[1].rest_seconds, None);
    }

    #[test]
    fn test_timer_state_progress() {
        let mut state = TimerState::idle();
        assert_eq!(state.progress(), 0.0);

        state.phase = TimerPhase::Running;
        state.target_seconds = 30.0;
        state.elapsed_seconds = 15.0;
        assert!((state.progress() - 0.5).abs() < f64::EPSILON);

        state.phase = TimerPhase::Completed;
        assert_eq!(state.progress(), 1.0);
    }

    #[test]
    fn test_activity_entry_serializes_snake_case() {
        let entry = ActivityEntry {
            subject_id: "plank".into(),
            subject_name: "Plank".into(),
            duration_seconds: 30,
            completed_at: Utc::now(),
            kind: ActivityKind::Single,
            outcome: ActivityOutcome::ManualStop,
            session_id: None,
            notes: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kind\":\"single\""));
        assert!(json.contains("\"outcome\":\"manual_stop\""));
        assert!(!json.contains("session_id"));
    }
}
