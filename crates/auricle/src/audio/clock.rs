//! Playback clock
//!
//! Translates raw engine events into session-level updates. The clock
//! owns the normalized playhead (0.0 at the start of a clip, 1.0 at the
//! end) and decides which engine reports matter in the current mode: a
//! muted cohort member finishing is bookkeeping, the last one finishing
//! is an ended notification.

use super::tracks::{AudioTrackSet, EndedDisposition};
use super::types::{AudioEvent, TrackId};

/// What the session layer hears about playback
#[derive(Debug, Clone, PartialEq)]
pub enum ClockUpdate {
    /// A registered track finished decoding and is ready to start
    Loaded(TrackId),
    /// A registered track could not be decoded
    LoadFailed { track: TrackId, message: String },
    /// Normalized playhead of the audible track, clamped to [0, 1]
    Position(f64),
    /// Playback ran to the end: the single track, or the whole cohort
    Ended(TrackId),
    /// A bounded range ran out; the transport is idle again
    Paused,
    /// The engine hit an unrecoverable playback fault
    Failed(String),
}

/// Normalized playhead plus the event translation rules
#[derive(Debug, Default)]
pub struct PlaybackClock {
    position: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last normalized playhead, in [0, 1]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Digest one engine event, updating the track set's transport state
    /// along the way. Returns the update the session should react to, if
    /// any.
    pub fn process(&mut self, tracks: &mut AudioTrackSet, event: AudioEvent) -> Option<ClockUpdate> {
        match event {
            AudioEvent::Loaded { id, info } => {
                tracks.mark_loaded(&id, info);
                Some(ClockUpdate::Loaded(id))
            }
            AudioEvent::LoadFailed { id, message } => {
                Some(ClockUpdate::LoadFailed { track: id, message })
            }
            AudioEvent::Position {
                id,
                elapsed,
                duration,
            } => {
                if !tracks.is_position_source(&id) {
                    return None;
                }
                let fraction = if duration.is_zero() {
                    0.0
                } else {
                    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
                };
                self.position = fraction;
                Some(ClockUpdate::Position(fraction))
            }
            AudioEvent::Ended { id } => match tracks.handle_ended(&id) {
                EndedDisposition::Looped => {
                    self.position = 0.0;
                    None
                }
                EndedDisposition::RangeFinished => Some(ClockUpdate::Paused),
                EndedDisposition::SingleFinished => {
                    self.position = 1.0;
                    Some(ClockUpdate::Ended(id))
                }
                EndedDisposition::CohortMemberFinished { last: true } => {
                    self.position = 1.0;
                    Some(ClockUpdate::Ended(id))
                }
                EndedDisposition::CohortMemberFinished { last: false } => None,
                EndedDisposition::Stray => None,
            },
            AudioEvent::Failed { message } => Some(ClockUpdate::Failed(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::{AudioCommand, ClipInfo};
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn clip(secs: f64) -> ClipInfo {
        ClipInfo {
            channels: 1,
            sample_rate: 44100,
            duration: Duration::from_secs_f64(secs),
        }
    }

    fn set_with(ids: &[&str]) -> AudioTrackSet {
        // The receiver is dropped; the set ignores send failures
        let (tx, _rx) = unbounded::<AudioCommand>();
        let mut set = AudioTrackSet::new(tx);
        for id in ids {
            set.register(TrackId::new(*id), format!("/audio/{id}.wav")).unwrap();
            set.mark_loaded(&TrackId::new(*id), clip(2.0));
        }
        set
    }

    fn position_event(id: &str, elapsed_ms: u64) -> AudioEvent {
        AudioEvent::Position {
            id: TrackId::new(id),
            elapsed: Duration::from_millis(elapsed_ms),
            duration: Duration::from_secs(2),
        }
    }

    // --- Loading ---

    #[test]
    fn loaded_event_marks_the_track_and_surfaces() {
        let (tx, _rx) = unbounded();
        let mut set = AudioTrackSet::new(tx);
        set.register(TrackId::new("a"), "/audio/a.wav").unwrap();
        let mut clock = PlaybackClock::new();

        let update = clock.process(
            &mut set,
            AudioEvent::Loaded {
                id: TrackId::new("a"),
                info: clip(1.5),
            },
        );
        assert_eq!(update, Some(ClockUpdate::Loaded(TrackId::new("a"))));
        assert!(set.is_loaded(&TrackId::new("a")));
        assert_eq!(
            set.duration_of(&TrackId::new("a")),
            Some(Duration::from_secs_f64(1.5))
        );
    }

    #[test]
    fn load_failure_carries_the_message() {
        let mut set = set_with(&["a"]);
        let mut clock = PlaybackClock::new();

        let update = clock.process(
            &mut set,
            AudioEvent::LoadFailed {
                id: TrackId::new("a"),
                message: "bad header".into(),
            },
        );
        assert_eq!(
            update,
            Some(ClockUpdate::LoadFailed {
                track: TrackId::new("a"),
                message: "bad header".into(),
            })
        );
    }

    // --- Position ---

    #[test]
    fn position_of_the_playing_track_is_normalized() {
        let mut set = set_with(&["a"]);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();

        let update = clock.process(&mut set, position_event("a", 500));
        assert_eq!(update, Some(ClockUpdate::Position(0.25)));
        assert_eq!(clock.position(), 0.25);
    }

    #[test]
    fn position_of_other_tracks_is_dropped() {
        let mut set = set_with(&["a", "b"]);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();

        assert_eq!(clock.process(&mut set, position_event("b", 500)), None);
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn sync_position_follows_the_soloed_member() {
        let mut set = set_with(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();
        set.solo(&TrackId::new("b")).unwrap();
        let mut clock = PlaybackClock::new();

        assert_eq!(clock.process(&mut set, position_event("a", 1000)), None);
        assert_eq!(
            clock.process(&mut set, position_event("b", 1000)),
            Some(ClockUpdate::Position(0.5))
        );
    }

    #[test]
    fn position_clamps_at_the_end() {
        let mut set = set_with(&["a"]);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();

        let update = clock.process(&mut set, position_event("a", 2300));
        assert_eq!(update, Some(ClockUpdate::Position(1.0)));
    }

    #[test]
    fn zero_duration_reads_as_zero() {
        let mut set = set_with(&["a"]);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();

        let update = clock.process(
            &mut set,
            AudioEvent::Position {
                id: TrackId::new("a"),
                elapsed: Duration::from_millis(10),
                duration: Duration::ZERO,
            },
        );
        assert_eq!(update, Some(ClockUpdate::Position(0.0)));
    }

    // --- Ended ---

    #[test]
    fn single_track_end_surfaces_with_full_position() {
        let mut set = set_with(&["a"]);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();

        let update = clock.process(&mut set, AudioEvent::Ended { id: TrackId::new("a") });
        assert_eq!(update, Some(ClockUpdate::Ended(TrackId::new("a"))));
        assert_eq!(clock.position(), 1.0);
    }

    #[test]
    fn looped_end_is_silent_and_rewinds() {
        let mut set = set_with(&["a"]);
        set.set_loop(true);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();
        clock.process(&mut set, position_event("a", 1800));

        let update = clock.process(&mut set, AudioEvent::Ended { id: TrackId::new("a") });
        assert_eq!(update, None);
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn range_end_reads_as_paused() {
        let mut set = set_with(&["a"]);
        set.play_range(
            &TrackId::new("a"),
            Duration::from_millis(400),
            Duration::from_millis(800),
        )
        .unwrap();
        let mut clock = PlaybackClock::new();

        let update = clock.process(&mut set, AudioEvent::Ended { id: TrackId::new("a") });
        assert_eq!(update, Some(ClockUpdate::Paused));
    }

    #[test]
    fn cohort_end_surfaces_once_when_the_last_member_finishes() {
        let mut set = set_with(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();
        let mut clock = PlaybackClock::new();

        assert_eq!(
            clock.process(&mut set, AudioEvent::Ended { id: TrackId::new("a") }),
            None
        );
        assert_eq!(
            clock.process(&mut set, AudioEvent::Ended { id: TrackId::new("b") }),
            Some(ClockUpdate::Ended(TrackId::new("b")))
        );
    }

    #[test]
    fn stray_end_is_ignored() {
        let mut set = set_with(&["a", "b"]);
        set.play(&TrackId::new("a")).unwrap();
        let mut clock = PlaybackClock::new();

        assert_eq!(
            clock.process(&mut set, AudioEvent::Ended { id: TrackId::new("b") }),
            None
        );
    }

    // --- Faults ---

    #[test]
    fn engine_fault_passes_through() {
        let mut set = set_with(&["a"]);
        let mut clock = PlaybackClock::new();

        let update = clock.process(
            &mut set,
            AudioEvent::Failed {
                message: "device lost".into(),
            },
        );
        assert_eq!(update, Some(ClockUpdate::Failed("device lost".into())));
    }
}
