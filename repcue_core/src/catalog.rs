//! Built-in exercise catalog.
//!
//! The catalog is read-only from the engine's point of view: timers look up
//! exercises by id through `ExerciseCatalog`. Custom exercises declared in
//! the config file are merged over the defaults.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Read-only exercise lookup
pub trait ExerciseCatalog {
    fn resolve(&self, id: &str) -> Result<&ExerciseSpec>;
}

/// Exercises keyed by id
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub exercises: HashMap<String, ExerciseSpec>,
}

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds a fresh copy of the default catalog
///
/// Prefer `get_default_catalog()` unless the catalog is about to be
/// extended with custom exercises.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

fn timed(id: &str, name: &str, seconds: u32, tags: &[&str]) -> ExerciseSpec {
    ExerciseSpec {
        id: id.into(),
        name: name.into(),
        defaults: ExerciseDefaults::TimeBased {
            duration_seconds: seconds,
        },
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn reps(id: &str, name: &str, sets: u32, reps: u32, per_rep: f64, tags: &[&str]) -> ExerciseSpec {
    ExerciseSpec {
        id: id.into(),
        name: name.into(),
        defaults: ExerciseDefaults::RepetitionBased {
            sets,
            reps,
            rep_duration_seconds: per_rep,
        },
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn build_default_catalog_internal() -> Catalog {
    let mut catalog = Catalog::default();

    // ========================================================================
    // Time-based
    // ========================================================================

    catalog.insert(timed("plank", "Plank", 60, &["core", "isometric"]));
    catalog.insert(timed("side_plank", "Side Plank", 30, &["core", "isometric"]));
    catalog.insert(timed("wall_sit", "Wall Sit", 45, &["legs", "isometric"]));
    catalog.insert(timed(
        "jumping_jacks",
        "Jumping Jacks",
        30,
        &["cardio", "full_body"],
    ));
    catalog.insert(timed("high_knees", "High Knees", 30, &["cardio"]));
    catalog.insert(timed(
        "mountain_climbers",
        "Mountain Climbers",
        30,
        &["cardio", "core"],
    ));

    // ========================================================================
    // Repetition-based
    // ========================================================================

    catalog.insert(reps("squats", "Bodyweight Squats", 3, 10, 2.0, &["legs"]));
    catalog.insert(reps("push_ups", "Push-ups", 3, 10, 2.0, &["upper_body", "push"]));
    catalog.insert(reps("lunges", "Alternating Lunges", 3, 12, 2.2, &["legs"]));
    catalog.insert(reps("burpees", "Burpees", 3, 8, 3.0, &["cardio", "full_body"]));
    catalog.insert(reps(
        "glute_bridges",
        "Glute Bridges",
        3,
        15,
        2.0,
        &["legs", "posterior_chain"],
    ));

    catalog
}

impl ExerciseCatalog for Catalog {
    fn resolve(&self, id: &str) -> Result<&ExerciseSpec> {
        self.exercises
            .get(id)
            .ok_or_else(|| Error::UnknownExercise(id.to_string()))
    }
}

impl<T: ExerciseCatalog + ?Sized> ExerciseCatalog for &T {
    fn resolve(&self, id: &str) -> Result<&ExerciseSpec> {
        (**self).resolve(id)
    }
}

impl Catalog {
    pub fn insert(&mut self, spec: ExerciseSpec) {
        self.exercises.insert(spec.id.clone(), spec);
    }

    /// Merge extra exercises, replacing defaults with the same id
    pub fn with_custom(mut self, custom: impl IntoIterator<Item = ExerciseSpec>) -> Self {
        for spec in custom {
            if self.exercises.contains_key(&spec.id) {
                tracing::info!("Custom exercise '{}' overrides built-in entry", spec.id);
            }
            self.insert(spec);
        }
        self
    }

    /// Exercises sorted by id for stable display
    pub fn sorted(&self) -> Vec<&ExerciseSpec> {
        let mut exercises: Vec<_> = self.exercises.values().collect();
        exercises.sort_by(|a, b| a.id.cmp(&b.id));
        exercises
    }

    /// Validate the catalog for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, spec) in &self.exercises {
            if id.is_empty() || spec.id.is_empty() {
                errors.push("Exercise has empty ID".to_string());
            }
            if id != &spec.id {
                errors.push(format!(
                    "Exercise key '{}' doesn't match exercise.id '{}'",
                    id, spec.id
                ));
            }
            if spec.name.is_empty() {
                errors.push(format!("Exercise '{}' has empty name", id));
            }

            let defaults = RunConfig::resolve(spec, &StepOverrides::default(), 0);
            if let Err(e) = defaults {
                errors.push(format!("Exercise '{}': {}", id, e));
            }
        }

        errors
    }
}
