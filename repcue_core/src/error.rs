//! Error types for the repcue_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for repcue_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A workout was started without any steps
    #[error("Cannot start a workout with no steps")]
    EmptyWorkout,

    /// Resolved run parameters are out of range (target <= 0, sets/reps < 1)
    #[error("Invalid run configuration: {0}")]
    InvalidRunConfig(String),

    /// Exercise id is not present in the catalog
    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    /// Wall-clock sample could not be taken
    #[error("Clock unavailable")]
    ClockUnavailable,

    /// Activity recorder failed to persist an entry
    #[error("Recorder write failed: {0}")]
    RecorderWrite(String),

    /// Wake lock could not be acquired or released
    #[error("Wake lock error: {0}")]
    WakeLock(String),

    /// Cue playback failed
    #[error("Cue playback failed: {0}")]
    Cue(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),
}
