//! Session configuration
//!
//! Serde model for a session definition file, plus the numeric tuning
//! constants for the audio engine and front-end poll loops. A session
//! definition names the judgment protocol, the training examples, the
//! condition groups with their audio files, and the per-condition keys.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Engine and loop tuning
pub mod tuning {
    /// Command channel capacity (session -> engine)
    pub const COMMAND_CHANNEL_CAPACITY: usize = 16;

    /// Event channel capacity (engine -> session)
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    /// Engine loop poll interval while waiting for commands (milliseconds)
    pub const ENGINE_POLL_MS: u64 = 100;

    /// Interval between position reports for playing tracks (milliseconds)
    pub const POSITION_TICK_MS: u64 = 100;

    /// Poll interval front ends should use when pumping the session (milliseconds)
    pub const SESSION_TICK_MS: u64 = 33;

    /// HTTP user agent for submission requests
    pub const USER_AGENT: &str = concat!("Auricle/", env!("CARGO_PKG_VERSION"));

    /// Submission connect timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Submission read timeout in seconds
    pub const READ_TIMEOUT_SECS: u64 = 30;
}

fn default_test_timeout_sec() -> f64 {
    60.0
}

fn default_require_training() -> bool {
    true
}

fn default_min_rating() -> i64 {
    0
}

fn default_max_rating() -> i64 {
    99
}

fn default_rating() -> i64 {
    50
}

/// Judgment protocol a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Rate every stimulus of a condition on a numeric scale
    RatingScale,
    /// Forced choice between two time-aligned candidates
    PairwiseChoice,
    /// Mark the normalized position of a perceptible change
    Segmentation,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::RatingScale => write!(f, "rating scale"),
            ProtocolKind::PairwiseChoice => write!(f, "pairwise choice"),
            ProtocolKind::Segmentation => write!(f, "segmentation"),
        }
    }
}

/// One named group of training examples, in presentation order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingGroup {
    /// Display name, e.g. "References" or "Quality anchors"
    pub group: String,

    /// Ordered (key, path) pairs
    pub files: Vec<(String, PathBuf)>,
}

/// Audio files shared by every condition of one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub group_id: i64,

    /// Ordered (key, path) pairs for reference renditions
    #[serde(default)]
    pub reference_files: Vec<(String, PathBuf)>,

    /// Ordered (key, path) pairs for candidate renditions
    pub stimulus_files: Vec<(String, PathBuf)>,
}

impl ConditionGroup {
    /// All files of the group, references first
    pub fn all_files(&self) -> impl Iterator<Item = &(String, PathBuf)> {
        self.reference_files.iter().chain(self.stimulus_files.iter())
    }

    /// Path for a key, searching references then stimuli
    pub fn path_for(&self, key: &str) -> Option<&PathBuf> {
        self.all_files().find(|(k, _)| k == key).map(|(_, p)| p)
    }
}

/// One unit of evaluation content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub condition_id: i64,
    pub group_id: i64,

    #[serde(default)]
    pub reference_keys: Vec<String>,
    pub stimulus_keys: Vec<String>,

    /// Shown instead of the session-wide evaluation instructions when set
    #[serde(default)]
    pub evaluation_instructions_html: Option<String>,

    /// Candidate pair compared by the pairwise protocol; defaults to the
    /// condition's first two stimulus keys.
    #[serde(default)]
    pub comparison_pair: Option<[String; 2]>,
}

impl Condition {
    /// The two keys the pairwise protocol compares
    pub fn pair_keys(&self) -> Result<[&str; 2]> {
        if let Some([a, b]) = &self.comparison_pair {
            return Ok([a.as_str(), b.as_str()]);
        }
        match self.stimulus_keys.as_slice() {
            [a, b, ..] => Ok([a.as_str(), b.as_str()]),
            _ => Err(SessionError::Config(format!(
                "condition {} needs two stimulus keys for a pairwise comparison",
                self.condition_id
            ))),
        }
    }
}

/// Full session definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub test_title: Option<String>,

    pub protocol: ProtocolKind,

    /// Minimum seconds a participant must spend on each trial
    #[serde(default = "default_test_timeout_sec")]
    pub test_timeout_sec: f64,

    /// Lock training advance until every example has played to the end
    #[serde(default = "default_require_training")]
    pub require_listening_to_all_training_sounds: bool,

    #[serde(default = "default_min_rating")]
    pub min_rating_value: i64,

    #[serde(default = "default_max_rating")]
    pub max_rating_value: i64,

    /// Sliders start here; an untouched slider submits this value
    #[serde(default = "default_rating")]
    pub default_rating_value: i64,

    #[serde(default)]
    pub introduction_html: Option<String>,

    #[serde(default)]
    pub training_instructions_html: Option<String>,

    #[serde(default)]
    pub evaluation_instructions_html: Option<String>,

    #[serde(default)]
    pub training_groups: Vec<TrainingGroup>,

    pub groups: Vec<ConditionGroup>,
    pub conditions: Vec<Condition>,
}

impl SessionConfig {
    /// Load and validate a session definition from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a session definition from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(text)
            .map_err(|e| SessionError::Config(format!("invalid session definition: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The group a condition belongs to
    pub fn group(&self, group_id: i64) -> Option<&ConditionGroup> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.conditions.is_empty() {
            return Err(SessionError::Config("no conditions defined".into()));
        }
        if !self.test_timeout_sec.is_finite() || self.test_timeout_sec < 0.0 {
            return Err(SessionError::Config(format!(
                "test_timeout_sec must be a non-negative number, got {}",
                self.test_timeout_sec
            )));
        }
        if self.min_rating_value > self.max_rating_value
            || self.default_rating_value < self.min_rating_value
            || self.default_rating_value > self.max_rating_value
        {
            return Err(SessionError::Config(format!(
                "rating bounds must satisfy min <= default <= max, got {}/{}/{}",
                self.min_rating_value, self.default_rating_value, self.max_rating_value
            )));
        }

        for condition in &self.conditions {
            let group = self.group(condition.group_id).ok_or_else(|| {
                SessionError::Config(format!(
                    "condition {} references unknown group {}",
                    condition.condition_id, condition.group_id
                ))
            })?;
            if condition.stimulus_keys.is_empty() {
                return Err(SessionError::Config(format!(
                    "condition {} has no stimulus keys",
                    condition.condition_id
                )));
            }
            for key in condition.reference_keys.iter().chain(&condition.stimulus_keys) {
                if group.path_for(key).is_none() {
                    return Err(SessionError::Config(format!(
                        "condition {} uses key {:?} not present in group {}",
                        condition.condition_id, key, condition.group_id
                    )));
                }
            }
            if self.protocol == ProtocolKind::PairwiseChoice {
                let [a, b] = condition.pair_keys()?;
                for key in [a, b] {
                    if !condition.stimulus_keys.iter().any(|k| k == key) {
                        return Err(SessionError::Config(format!(
                            "condition {} comparison pair uses key {:?} outside its stimulus keys",
                            condition.condition_id, key
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
