//! Error types for the auricle session core
//!
//! Centralized error handling using thiserror.

use crate::audio::types::TrackId;
use thiserror::Error;

/// Main error type for the session core
#[derive(Error, Debug)]
pub enum SessionError {
    /// Track ids are synthetic (derived from config keys), so a collision
    /// is a programming or config-authoring error, not a runtime fault.
    #[error("Duplicate track id: {0}")]
    DuplicateTrackId(TrackId),

    #[error("Unknown track id: {0}")]
    UnknownTrackId(TrackId),

    #[error("Failed to load audio for {track}: {message}")]
    AudioLoadFailed { track: TrackId, message: String },

    #[error("Audio playback failed: {0}")]
    AudioPlaybackFailed(String),

    /// The current trial is not ready to advance. The payload is the
    /// user-facing prompt text, not a diagnostic.
    #[error("{0}")]
    IncompleteTrial(String),

    /// Neither a marker nor an explicit "no change" was given.
    #[error("{0}")]
    NoSelectionMade(String),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the session core
pub type Result<T> = std::result::Result<T, SessionError>;

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_decode() {
        return "Invalid response from server".to_string();
    }
    format!("Network error: {e}")
}
