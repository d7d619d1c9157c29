//! Engine configuration with documented constants
//!
//! Every tuning knob the timeline engine reads is collected here with an
//! explanation of what it controls.

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};

/// Configuration for the timeline engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tolerance used when comparing times and progress values
    ///
    /// Projected end times closer than this to the scheduled one are treated
    /// as unchanged, so repeated replays don't churn the event queue over
    /// floating point noise. Completion checks on task progress use their
    /// own, coarser slack of 1e-6 since progress is a ratio, not a time.
    pub time_epsilon: f64,

    /// Suffix appended to a task's name to form its progress variable
    ///
    /// A task named "gather" tracks progress in "gather_progress".
    pub progress_suffix: String,

    /// Maximum number of events a single recompute pass may trigger
    ///
    /// Guards against effect chains that keep scheduling new events at the
    /// same instant. Exceeding it aborts the pass with `ReplayLimit`.
    pub max_replay_steps: usize,

    /// Minimum batch size before `Timeline::sample` uses rayon
    ///
    /// Below this threshold thread overhead exceeds the cost of copying
    /// snapshots forward sequentially.
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_epsilon: 1e-9,
            progress_suffix: "_progress".to_string(),
            max_replay_steps: 100_000,
            parallel_threshold: 64,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if !(self.time_epsilon >= 0.0 && self.time_epsilon < 1e-3) {
            return Err(EngineError::Config(format!(
                "time_epsilon ({}) should be in [0, 0.001)",
                self.time_epsilon
            )));
        }

        if self.progress_suffix.is_empty() {
            return Err(EngineError::Config(
                "progress_suffix must not be empty".into(),
            ));
        }

        if self.max_replay_steps == 0 {
            return Err(EngineError::Config(
                "max_replay_steps must be positive".into(),
            ));
        }

        Ok(())
    }
}

// === GLOBAL CONFIG ACCESS ===

use std::sync::OnceLock;

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Get the global engine config (initializes with defaults if not set)
pub fn config() -> &'static EngineConfig {
    CONFIG.get_or_init(EngineConfig::default)
}

/// Set the global engine config (can only be called once)
///
/// Returns Err if config was already set.
pub fn set_config(config: EngineConfig) -> std::result::Result<(), EngineConfig> {
    CONFIG.set(config)
}
