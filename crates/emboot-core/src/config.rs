//! Bootstrap configuration
//!
//! The page hands the shell one [`BootConfig`] (as JSON) at construction.
//! Nothing reads configuration from a shared global afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_PROGRESS_LABEL, DEFAULT_SYNC_CALLBACK, PROGRESS_DEBOUNCE_MS};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config field `{0}` must not be empty")]
    Empty(&'static str),
    #[error("progress_debounce_ms must be a finite, non-negative number (got {0})")]
    InvalidDebounce(f64),
    #[error("unknown log level `{0}`")]
    InvalidLogLevel(String),
}

/// Shell configuration, passed once at bootstrap.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Id of the `<canvas>` the guest renders into
    pub canvas_id: String,
    /// Id of the status label element
    pub status_id: String,
    /// Id of the `<progress>` element
    pub progress_id: String,
    /// Id of the spinner element
    pub spinner_id: String,
    /// Exported guest function receiving sync completions (without the leading `_`)
    pub sync_callback: String,
    /// Property path from the guest module to its `AudioContext`
    pub audio_context_path: Vec<String>,
    /// Label in front of the `(done/total)` counter
    pub progress_label: String,
    /// Minimum spacing of progress-style status updates
    pub progress_debounce_ms: f64,
    /// Console log level (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            canvas_id: "canvas".to_string(),
            status_id: "status".to_string(),
            progress_id: "progress".to_string(),
            spinner_id: "spinner".to_string(),
            sync_callback: DEFAULT_SYNC_CALLBACK.to_string(),
            audio_context_path: vec!["SDL3".to_string(), "audioContext".to_string()],
            progress_label: DEFAULT_PROGRESS_LABEL.to_string(),
            progress_debounce_ms: PROGRESS_DEBOUNCE_MS,
            log_level: "info".to_string(),
        }
    }
}

impl BootConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BootConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("canvas_id", &self.canvas_id),
            ("status_id", &self.status_id),
            ("progress_id", &self.progress_id),
            ("spinner_id", &self.spinner_id),
            ("sync_callback", &self.sync_callback),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }
        if self.audio_context_path.is_empty() || self.audio_context_path.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Empty("audio_context_path"));
        }
        if !self.progress_debounce_ms.is_finite() || self.progress_debounce_ms < 0.0 {
            return Err(ConfigError::InvalidDebounce(self.progress_debounce_ms));
        }
        self.log_level()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn log_level(&self) -> Result<log::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }
}
