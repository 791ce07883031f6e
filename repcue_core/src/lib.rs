#![forbid(unsafe_code)]

//! Core timing and progression engine for RepCue.
//!
//! This crate provides:
//! - Domain types (exercises, run parameters, workouts, activity entries)
//! - Catalog management
//! - Wall-clock exercise timer and rep/set tracking
//! - Workout sequencing and the session controller
//! - Effect dispatch (cues, activity log, wake lock)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod clock;
pub mod effects;
pub mod timer;
pub mod reps;
pub mod occurrence;
pub mod workout;
pub mod session;
pub mod runner;
pub mod recorder;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, Catalog, ExerciseCatalog};
pub use clock::{Clock, ManualClock, SystemClock, TickHandle};
pub use config::{Config, TimerSettings};
pub use effects::{
    ActivityRecorder, Announcement, ConsentGate, Cue, CueDispatcher, Effect, EffectDispatcher,
    Lock, WakeLock,
};
pub use recorder::{read_entries, JsonlRecorder};
pub use reps::RepCounters;
pub use runner::Runner;
pub use session::Session;
pub use workout::WorkoutRun;
