//! Auricle: listening-test session engine
//!
//! Preloaded multi-track playback, trial protocols, and the session
//! state machine behind a perceptual audio evaluation.
//!
//! ## Quick start
//!
//! ```no_run
//! use auricle::audio::AudioEngine;
//! use auricle::session::EvaluationWorkflow;
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
