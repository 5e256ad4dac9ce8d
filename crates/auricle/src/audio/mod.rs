//! Audio playback layer
//!
//! A dedicated engine thread owns the output device and one sink per
//! registered track; the session side holds the pure transport state
//! (`AudioTrackSet`) and derives UI-facing signals from engine events
//! (`PlaybackClock`). The two halves talk exclusively over crossbeam
//! channels using the types in [`types`].

pub mod clock;
pub mod decoder;
pub mod engine;
pub mod tracks;
pub mod types;

pub use clock::{ClockUpdate, PlaybackClock};
pub use engine::AudioEngine;
pub use tracks::AudioTrackSet;
pub use types::{AudioCommand, AudioEvent, ClipInfo, PlaybackMode, TrackId};
