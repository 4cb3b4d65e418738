#![forbid(unsafe_code)]

//! Transition group configuration.
//!
//! [`TransitionConfig`] holds the few policy knobs of a group. It can be
//! loaded from TOML or JSON:
//!
//! ```toml
//! # ftui-transition.toml
//! candidate_policy = "first_only"
//! freeze_container = true
//! measure_preference = "entering"
//! announce_empty_cycles = true
//! ```
//!
//! ```rust,ignore
//! let config = TransitionConfig::from_toml_file("ftui-transition.toml")?;
//! let config = TransitionConfig::from_json_str(json)?;
//! ```
//!
//! Missing fields take their [`Default`] values.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// How many keys may start a phase in one update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// At most one entering and one leaving key per cycle; the first in
    /// iteration order wins. Other keys added in the same cycle are shown
    /// without an enter phase, and other keys removed in the same cycle stay
    /// retained until a later cycle selects them.
    #[default]
    FirstOnly,
    /// Every qualifying key starts its phase in the cycle.
    All,
}

/// Which candidate is measured to freeze the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurePreference {
    /// Measure the entering key, falling back to the leaving key.
    #[default]
    Entering,
    /// Measure the leaving key, falling back to the entering key.
    Leaving,
}

/// Policy knobs of a [`TransitionGroup`](crate::TransitionGroup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Candidate selection per cycle.
    pub candidate_policy: CandidatePolicy,
    /// Measure a candidate and freeze the container while in flight.
    pub freeze_container: bool,
    /// Which candidate to measure first.
    pub measure_preference: MeasurePreference,
    /// Notify `on_transition_start` (and close the burst) for cycles that
    /// start no phase. When `false` such cycles are quiet.
    pub announce_empty_cycles: bool,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            candidate_policy: CandidatePolicy::FirstOnly,
            freeze_container: true,
            measure_preference: MeasurePreference::Entering,
            announce_empty_cycles: true,
        }
    }
}

impl TransitionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidate selection policy.
    pub fn candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.candidate_policy = policy;
        self
    }

    /// Enable or disable container freezing.
    pub fn freeze_container(mut self, freeze: bool) -> Self {
        self.freeze_container = freeze;
        self
    }

    /// Set which candidate is measured first.
    pub fn measure_preference(mut self, preference: MeasurePreference) -> Self {
        self.measure_preference = preference;
        self
    }

    /// Announce cycles that start no phase.
    pub fn announce_empty_cycles(mut self, announce: bool) -> Self {
        self.announce_empty_cycles = announce;
        self
    }

    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Serialize to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when loading a transition configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// TOML serialization error.
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    /// JSON parse error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
