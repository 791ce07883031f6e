//! Configuration file support for RepCue.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/repcue/config.toml`.
//! Every field has a default, so a partial (or missing) file is fine.

use crate::catalog::{build_default_catalog, Catalog};
use crate::timer::TickIntervals;
use crate::{Error, ExerciseSpec, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub workout: WorkoutConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub exercises: ExercisesConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Timer behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_pre_countdown_seconds")]
    pub pre_countdown_seconds: u32,

    /// 0 disables interval cues
    #[serde(default = "default_interval_cue_seconds")]
    pub interval_cue_seconds: u32,

    #[serde(default = "default_whole_second_tick_ms")]
    pub whole_second_tick_ms: u64,

    #[serde(default = "default_smooth_tick_ms")]
    pub smooth_tick_ms: u64,

    #[serde(default = "default_display_hold_ms")]
    pub display_hold_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            pre_countdown_seconds: default_pre_countdown_seconds(),
            interval_cue_seconds: default_interval_cue_seconds(),
            whole_second_tick_ms: default_whole_second_tick_ms(),
            smooth_tick_ms: default_smooth_tick_ms(),
            display_hold_ms: default_display_hold_ms(),
        }
    }
}

/// Workout sequencing defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkoutConfig {
    /// Rest after a step that doesn't specify its own
    #[serde(default = "default_rest_seconds")]
    pub default_rest_seconds: u32,

    /// Rest between sets of a rep-based exercise
    #[serde(default = "default_set_rest_seconds")]
    pub set_rest_seconds: u32,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            default_rest_seconds: default_rest_seconds(),
            set_rest_seconds: default_set_rest_seconds(),
        }
    }
}

/// Consent for writing the activity log
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PrivacyConfig {
    #[serde(default)]
    pub activity_logging: bool,
}

/// User-declared exercises merged over the built-in catalog
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ExercisesConfig {
    #[serde(default)]
    pub custom: Vec<ExerciseSpec>,
}

/// Resolved engine settings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerSettings {
    pub intervals: TickIntervals,
    pub pre_countdown_seconds: u32,
    pub interval_cue_seconds: Option<u32>,
    pub display_hold: Duration,
    pub default_rest_seconds: u32,
    pub set_rest_seconds: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            intervals: TickIntervals::default(),
            pre_countdown_seconds: default_pre_countdown_seconds(),
            interval_cue_seconds: Some(default_interval_cue_seconds()),
            display_hold: Duration::from_millis(default_display_hold_ms()),
            default_rest_seconds: default_rest_seconds(),
            set_rest_seconds: default_set_rest_seconds(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("repcue")
}

fn default_pre_countdown_seconds() -> u32 {
    3
}

fn default_interval_cue_seconds() -> u32 {
    10
}

fn default_whole_second_tick_ms() -> u64 {
    1000
}

fn default_smooth_tick_ms() -> u64 {
    100
}

fn default_display_hold_ms() -> u64 {
    2000
}

fn default_rest_seconds() -> u32 {
    30
}

fn default_set_rest_seconds() -> u32 {
    30
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("repcue").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Engine settings derived from the `[timer]` and `[workout]` tables
    pub fn timer_settings(&self) -> Result<TimerSettings> {
        if self.timer.whole_second_tick_ms == 0 || self.timer.smooth_tick_ms == 0 {
            return Err(Error::Config("tick intervals must be non-zero".into()));
        }

        Ok(TimerSettings {
            intervals: TickIntervals {
                whole_second: Duration::from_millis(self.timer.whole_second_tick_ms),
                smooth: Duration::from_millis(self.timer.smooth_tick_ms),
            },
            pre_countdown_seconds: self.timer.pre_countdown_seconds,
            interval_cue_seconds: Some(self.timer.interval_cue_seconds).filter(|s| *s > 0),
            display_hold: Duration::from_millis(self.timer.display_hold_ms),
            default_rest_seconds: self.workout.default_rest_seconds,
            set_rest_seconds: self.workout.set_rest_seconds,
        })
    }

    /// Built-in catalog extended with `[[exercises.custom]]` entries
    pub fn catalog(&self) -> Result<Catalog> {
        let catalog = build_default_catalog().with_custom(self.exercises.custom.iter().cloned());
        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(Error::CatalogValidation(errors.join("; ")));
        }
        Ok(catalog)
    }
}
