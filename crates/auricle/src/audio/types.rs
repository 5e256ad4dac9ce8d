//! Shared audio types
//!
//! Track identifiers, decoded clip metadata, and the command/event
//! vocabulary spoken between the session core and the engine thread.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Identifier for one registered track
///
/// Synthetic, derived from config keys: `g<groupID>_<key>` for condition
/// audio, `train_<group>_<key>` for training examples. Conditions of the
/// same group share tracks, so ids stay stable for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for a condition-group file
    pub fn for_group(group_id: i64, key: &str) -> Self {
        Self(format!("g{group_id}_{key}"))
    }

    /// Id for a training example
    pub fn for_training(group: &str, key: &str) -> Self {
        Self(format!("train_{group}_{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Metadata for a fully decoded clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl fmt::Display for ClipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {} Hz, {:.2}s",
            self.channels,
            self.sample_rate,
            self.duration.as_secs_f64()
        )
    }
}

/// Transport state of the track set as a whole
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    #[default]
    Idle,
    /// One track playing on its own
    SingleTrack(TrackId),
    /// The sync cohort playing in lockstep
    SyncGroup,
}

impl PlaybackMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, PlaybackMode::Idle)
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Idle => write!(f, "idle"),
            PlaybackMode::SingleTrack(id) => write!(f, "playing {id}"),
            PlaybackMode::SyncGroup => write!(f, "sync group playing"),
        }
    }
}

/// Commands accepted by the audio engine thread
#[derive(Debug, Clone)]
pub enum AudioCommand {
    /// Decode a file up front and keep its PCM in memory
    Load { id: TrackId, path: PathBuf },

    /// Start a track from an offset, replacing whatever it was doing
    Start { id: TrackId, offset: Duration },

    /// Start only the [start, end) slice of a track
    StartRange {
        id: TrackId,
        start: Duration,
        end: Duration,
    },

    /// Pause one track where it is
    Pause { id: TrackId },

    /// Set a track's gain (0.0 or 1.0 in this system)
    SetVolume { id: TrackId, volume: f32 },

    /// Stop the engine thread
    Shutdown,
}

/// Notifications emitted by the audio engine thread
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// A load finished; the clip's measured metadata is now known
    Loaded { id: TrackId, info: ClipInfo },

    LoadFailed { id: TrackId, message: String },

    /// Periodic report for a playing track
    Position {
        id: TrackId,
        elapsed: Duration,
        duration: Duration,
    },

    /// A started track ran out of samples
    Ended { id: TrackId },

    /// The output device failed; the session cannot continue
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_track_ids_are_stable() {
        assert_eq!(TrackId::for_group(3, "S1").as_str(), "g3_S1");
        assert_eq!(TrackId::for_group(3, "S1"), TrackId::for_group(3, "S1"));
        assert_ne!(TrackId::for_group(3, "S1"), TrackId::for_group(4, "S1"));
    }

    #[test]
    fn training_track_ids_embed_the_group() {
        let id = TrackId::for_training("References", "Reference");
        assert_eq!(id.as_str(), "train_References_Reference");
    }

    #[test]
    fn track_id_display_matches_inner() {
        let id = TrackId::new("g1_S2");
        assert_eq!(id.to_string(), "g1_S2");
    }

    #[test]
    fn playback_mode_default_is_idle() {
        assert_eq!(PlaybackMode::default(), PlaybackMode::Idle);
        assert!(PlaybackMode::Idle.is_idle());
        assert!(!PlaybackMode::SyncGroup.is_idle());
    }

    #[test]
    fn playback_mode_display() {
        assert_eq!(PlaybackMode::Idle.to_string(), "idle");
        assert_eq!(
            PlaybackMode::SingleTrack(TrackId::new("g1_S1")).to_string(),
            "playing g1_S1"
        );
        assert_eq!(PlaybackMode::SyncGroup.to_string(), "sync group playing");
    }

    #[test]
    fn clip_info_display() {
        let info = ClipInfo {
            channels: 2,
            sample_rate: 44100,
            duration: Duration::from_millis(1500),
        };
        assert_eq!(info.to_string(), "2ch 44100 Hz, 1.50s");
    }

    #[test]
    fn commands_and_events_format_for_logging() {
        let cmd = AudioCommand::Start {
            id: TrackId::new("g1_S1"),
            offset: Duration::ZERO,
        };
        assert!(format!("{cmd:?}").contains("g1_S1"));

        let event = AudioEvent::Ended {
            id: TrackId::new("g1_S1"),
        };
        assert!(format!("{event:?}").contains("Ended"));
    }
}
