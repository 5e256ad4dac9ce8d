//! Track set transport state
//!
//! `AudioTrackSet` owns the pure transport state for every registered
//! track: the playback mode, the sync cohort, solo volumes, the loop
//! flag, and any active range window. Contract operations become engine
//! commands on the channel; the set itself never touches hardware, which
//! keeps the whole transport policy testable without an output device.
//!
//! Solo is volume state, not transport state: muting all cohort members
//! but one while they keep running is what lets a forced-choice trial
//! flip between two time-aligned renditions with no re-seek.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::error::{Result, SessionError};

use super::types::{AudioCommand, ClipInfo, PlaybackMode, TrackId};

/// One registered track
#[derive(Debug, Clone)]
struct Track {
    volume: f32,
    /// Known once the engine acknowledges the load
    info: Option<ClipInfo>,
}

/// What became of an ended track, for the clock to translate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndedDisposition {
    /// Loop is on; the track was restarted from zero
    Looped,
    /// A bounded range finished; transport reads as paused
    RangeFinished,
    /// The single playing track finished; mode is idle again
    SingleFinished,
    /// A cohort member finished; `last` when no member is still running
    CohortMemberFinished { last: bool },
    /// An ended report for a track this set no longer considers active
    Stray,
}

pub struct AudioTrackSet {
    cmd_tx: Sender<AudioCommand>,
    tracks: HashMap<TrackId, Track>,
    mode: PlaybackMode,
    cohort: Vec<TrackId>,
    /// Cohort members that have not ended since the last sync start
    running_cohort: Vec<TrackId>,
    solo: Option<TrackId>,
    loop_enabled: bool,
    /// Set while a `play_range` slice is running
    active_range: Option<TrackId>,
}

impl AudioTrackSet {
    pub fn new(cmd_tx: Sender<AudioCommand>) -> Self {
        Self {
            cmd_tx,
            tracks: HashMap::new(),
            mode: PlaybackMode::Idle,
            cohort: Vec::new(),
            running_cohort: Vec::new(),
            solo: None,
            loop_enabled: false,
            active_range: None,
        }
    }

    // --- Registration ---

    /// Register a track and ask the engine to decode it
    pub fn register(&mut self, id: TrackId, source_path: impl Into<std::path::PathBuf>) -> Result<()> {
        if self.tracks.contains_key(&id) {
            return Err(SessionError::DuplicateTrackId(id));
        }
        self.tracks.insert(
            id.clone(),
            Track {
                volume: 1.0,
                info: None,
            },
        );
        self.send(AudioCommand::Load {
            id,
            path: source_path.into(),
        });
        Ok(())
    }

    /// Record the engine's load acknowledgement
    pub fn mark_loaded(&mut self, id: &TrackId, info: ClipInfo) {
        if let Some(track) = self.tracks.get_mut(id) {
            track.info = Some(info);
        }
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.contains_key(id)
    }

    pub fn is_loaded(&self, id: &TrackId) -> bool {
        self.tracks.get(id).is_some_and(|t| t.info.is_some())
    }

    pub fn duration_of(&self, id: &TrackId) -> Option<Duration> {
        self.tracks.get(id)?.info.map(|i| i.duration)
    }

    pub fn volume_of(&self, id: &TrackId) -> Option<f32> {
        self.tracks.get(id).map(|t| t.volume)
    }

    // --- Single-track transport ---

    /// Restart a track from the beginning on its own
    pub fn play(&mut self, id: &TrackId) -> Result<()> {
        self.play_from_offset(id, Duration::ZERO)
    }

    /// Start a track on its own from an explicit offset
    pub fn play_from_offset(&mut self, id: &TrackId, offset: Duration) -> Result<()> {
        self.start_single(id, offset, None)
    }

    /// Play only the [start, end) window of a track; when the window runs
    /// out the set reports a pause rather than an ended track
    pub fn play_range(&mut self, id: &TrackId, start: Duration, end: Duration) -> Result<()> {
        self.start_single(id, start, Some(end))
    }

    fn start_single(&mut self, id: &TrackId, offset: Duration, end: Option<Duration>) -> Result<()> {
        if !self.tracks.contains_key(id) {
            return Err(SessionError::UnknownTrackId(id.clone()));
        }

        // Whatever was playing gives way; the mode is single-valued
        self.pause();

        // A previous solo may have muted this track; make it audible
        self.set_volume(id, 1.0);

        match end {
            Some(end) => {
                self.send(AudioCommand::StartRange {
                    id: id.clone(),
                    start: offset,
                    end,
                });
                self.active_range = Some(id.clone());
            }
            None => {
                self.send(AudioCommand::Start {
                    id: id.clone(),
                    offset,
                });
            }
        }
        self.mode = PlaybackMode::SingleTrack(id.clone());
        Ok(())
    }

    /// Pause whatever the current mode implies; mode becomes idle and
    /// any solo selection is forgotten
    pub fn pause(&mut self) {
        self.pause_transport_only();
        self.solo = None;
    }

    // --- Sync cohort ---

    /// Replace the sync cohort. Duration mismatches among loaded members
    /// are tolerated; they are logged and nothing more.
    pub fn set_sync_cohort(&mut self, ids: Vec<TrackId>) -> Result<()> {
        for id in &ids {
            if !self.tracks.contains_key(id) {
                return Err(SessionError::UnknownTrackId(id.clone()));
            }
        }

        let durations: Vec<(&TrackId, Duration)> = ids
            .iter()
            .filter_map(|id| self.duration_of(id).map(|d| (id, d)))
            .collect();
        if let (Some(min), Some(max)) = (
            durations.iter().map(|(_, d)| *d).min(),
            durations.iter().map(|(_, d)| *d).max(),
        ) {
            if max - min > Duration::from_millis(1) {
                tracing::warn!(
                    ?min,
                    ?max,
                    "sync cohort members have unequal durations; shorter tracks will end first"
                );
            }
        }

        self.cohort = ids;
        // The old solo target belongs to the cohort it was chosen from
        self.solo = None;
        Ok(())
    }

    pub fn cohort(&self) -> &[TrackId] {
        &self.cohort
    }

    /// Start every cohort member from the beginning, back to back
    pub fn sync_play(&mut self) {
        self.sync_play_from_offset(Duration::ZERO);
    }

    /// Start every cohort member from an offset, back to back.
    /// Volumes are left alone, so an earlier solo survives the restart.
    pub fn sync_play_from_offset(&mut self, offset: Duration) {
        if self.cohort.is_empty() {
            tracing::warn!("sync play requested with an empty cohort");
            return;
        }
        if self.mode != PlaybackMode::Idle {
            self.pause_transport_only();
        }
        for id in &self.cohort {
            self.send(AudioCommand::Start {
                id: id.clone(),
                offset,
            });
        }
        self.running_cohort = self.cohort.clone();
        self.active_range = None;
        self.mode = PlaybackMode::SyncGroup;
    }

    /// Pause all cohort members; mode becomes idle
    pub fn sync_pause(&mut self) {
        for id in &self.cohort {
            self.send(AudioCommand::Pause { id: id.clone() });
        }
        self.mode = PlaybackMode::Idle;
        self.active_range = None;
        self.running_cohort.clear();
    }

    /// Mute every cohort member except `id`. Transport state is not
    /// touched: soloing a paused group changes nothing audible until the
    /// group is started again.
    pub fn solo(&mut self, id: &TrackId) -> Result<()> {
        if !self.tracks.contains_key(id) {
            return Err(SessionError::UnknownTrackId(id.clone()));
        }
        let members: Vec<TrackId> = self.cohort.clone();
        for member in &members {
            let volume = if member == id { 1.0 } else { 0.0 };
            self.set_volume(member, volume);
        }
        // The solo target is audible even when outside the cohort
        self.set_volume(id, 1.0);
        self.solo = Some(id.clone());
        Ok(())
    }

    pub fn solo_target(&self) -> Option<&TrackId> {
        self.solo.as_ref()
    }

    // --- Looping ---

    /// Applies to all registered and future tracks
    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    // --- State ---

    pub fn mode(&self) -> &PlaybackMode {
        &self.mode
    }

    /// Whether a position report for `id` should drive the UI position:
    /// the single playing track always does; during sync playback only
    /// the soloed member does.
    pub fn is_position_source(&self, id: &TrackId) -> bool {
        match &self.mode {
            PlaybackMode::Idle => false,
            PlaybackMode::SingleTrack(playing) => playing == id,
            PlaybackMode::SyncGroup => self.solo.as_ref() == Some(id),
        }
    }

    /// Digest an ended report from the engine and restore invariants
    pub fn handle_ended(&mut self, id: &TrackId) -> EndedDisposition {
        if self.active_range.as_ref() == Some(id) {
            self.active_range = None;
            self.mode = PlaybackMode::Idle;
            return EndedDisposition::RangeFinished;
        }

        let active = match &self.mode {
            PlaybackMode::SingleTrack(playing) => playing == id,
            PlaybackMode::SyncGroup => self.running_cohort.contains(id),
            PlaybackMode::Idle => false,
        };
        if !active {
            return EndedDisposition::Stray;
        }

        if self.loop_enabled {
            self.send(AudioCommand::Start {
                id: id.clone(),
                offset: Duration::ZERO,
            });
            return EndedDisposition::Looped;
        }

        match &self.mode {
            PlaybackMode::SingleTrack(_) => {
                self.mode = PlaybackMode::Idle;
                EndedDisposition::SingleFinished
            }
            PlaybackMode::SyncGroup => {
                self.running_cohort.retain(|running| running != id);
                let last = self.running_cohort.is_empty();
                if last {
                    self.mode = PlaybackMode::Idle;
                }
                EndedDisposition::CohortMemberFinished { last }
            }
            PlaybackMode::Idle => EndedDisposition::Stray,
        }
    }

    // --- Internals ---

    /// Pause the running tracks without clearing solo state; used when a
    /// sync restart displaces an earlier transport mode.
    fn pause_transport_only(&mut self) {
        match &self.mode {
            PlaybackMode::Idle => {}
            PlaybackMode::SingleTrack(id) => {
                self.send(AudioCommand::Pause { id: id.clone() });
            }
            PlaybackMode::SyncGroup => {
                for id in &self.running_cohort {
                    self.send(AudioCommand::Pause { id: id.clone() });
                }
            }
        }
        self.mode = PlaybackMode::Idle;
        self.active_range = None;
        self.running_cohort.clear();
    }

    fn set_volume(&mut self, id: &TrackId, volume: f32) {
        let changed = match self.tracks.get_mut(id) {
            Some(track) if (track.volume - volume).abs() > f32::EPSILON => {
                track.volume = volume;
                true
            }
            _ => false,
        };
        if changed {
            self.send(AudioCommand::SetVolume {
                id: id.clone(),
                volume,
            });
        }
    }

    fn send(&self, cmd: AudioCommand) {
        // A closed channel means the engine is gone; the session is
        // already tearing down, so there is nobody left to tell.
        let _ = self.cmd_tx.send(cmd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};

    fn make_set() -> (AudioTrackSet, Receiver<AudioCommand>) {
        let (tx, rx) = unbounded();
        (AudioTrackSet::new(tx), rx)
    }

    fn registered_set(ids: &[&str]) -> (AudioTrackSet, Receiver<AudioCommand>) {
        let (mut set, rx) = make_set();
        for id in ids {
            set.register(TrackId::new(*id), format!("/audio/{id}.wav")).unwrap();
        }
        drain(&rx);
        (set, rx)
    }

    fn drain(rx: &Receiver<AudioCommand>) -> Vec<AudioCommand> {
        let mut cmds = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            cmds.push(cmd);
        }
        cmds
    }

    fn loaded(set: &mut AudioTrackSet, id: &str, secs: f64) {
        set.mark_loaded(
            &TrackId::new(id),
            ClipInfo {
                channels: 1,
                sample_rate: 44100,
                duration: Duration::from_secs_f64(secs),
            },
        );
    }

    // --- Registration ---

    #[test]
    fn register_sends_load_command() {
        let (mut set, rx) = make_set();
        set.register(TrackId::new("a"), "/audio/a.wav").unwrap();

        let cmds = drain(&rx);
        assert_eq!(cmds.len(), 1);
        assert!(matches!(&cmds[0], AudioCommand::Load { id, .. } if id.as_str() == "a"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (mut set, _rx) = make_set();
        set.register(TrackId::new("a"), "/audio/a.wav").unwrap();
        let err = set.register(TrackId::new("a"), "/audio/other.wav").unwrap_err();
        assert!(matches!(err, SessionError::DuplicateTrackId(_)));
    }

    #[test]
    fn mark_loaded_records_duration() {
        let (mut set, _rx) = registered_set(&["a"]);
        assert!(!set.is_loaded(&TrackId::new("a")));

        loaded(&mut set, "a", 2.5);
        assert!(set.is_loaded(&TrackId::new("a")));
        assert_eq!(
            set.duration_of(&TrackId::new("a")),
            Some(Duration::from_secs_f64(2.5))
        );
    }

    // --- Single-track transport ---

    #[test]
    fn play_unknown_track_is_rejected() {
        let (mut set, _rx) = make_set();
        let err = set.play(&TrackId::new("ghost")).unwrap_err();
        assert!(matches!(err, SessionError::UnknownTrackId(_)));
    }

    #[test]
    fn play_starts_from_zero_and_sets_single_mode() {
        let (mut set, rx) = registered_set(&["a"]);
        set.play(&TrackId::new("a")).unwrap();

        assert_eq!(*set.mode(), PlaybackMode::SingleTrack(TrackId::new("a")));
        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::Start { id, offset } if id.as_str() == "a" && *offset == Duration::ZERO
        )));
    }

    #[test]
    fn play_displaces_a_playing_single_track() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.play(&TrackId::new("a")).unwrap();
        drain(&rx);

        set.play(&TrackId::new("b")).unwrap();
        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::Pause { id } if id.as_str() == "a"
        )));
        assert_eq!(*set.mode(), PlaybackMode::SingleTrack(TrackId::new("b")));
    }

    #[test]
    fn play_restores_volume_after_an_earlier_solo() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.solo(&TrackId::new("a")).unwrap();
        assert_eq!(set.volume_of(&TrackId::new("b")), Some(0.0));
        drain(&rx);

        set.play(&TrackId::new("b")).unwrap();
        assert_eq!(set.volume_of(&TrackId::new("b")), Some(1.0));
        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::SetVolume { id, volume } if id.as_str() == "b" && *volume == 1.0
        )));
    }

    #[test]
    fn play_from_offset_passes_the_offset() {
        let (mut set, rx) = registered_set(&["a"]);
        set.play_from_offset(&TrackId::new("a"), Duration::from_millis(750)).unwrap();

        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::Start { offset, .. } if *offset == Duration::from_millis(750)
        )));
    }

    #[test]
    fn play_range_sends_bounded_start() {
        let (mut set, rx) = registered_set(&["a"]);
        set.play_range(
            &TrackId::new("a"),
            Duration::from_millis(200),
            Duration::from_millis(600),
        )
        .unwrap();

        assert_eq!(*set.mode(), PlaybackMode::SingleTrack(TrackId::new("a")));
        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::StartRange { start, end, .. }
                if *start == Duration::from_millis(200) && *end == Duration::from_millis(600)
        )));
    }

    #[test]
    fn pause_single_track_goes_idle_and_clears_solo() {
        let (mut set, rx) = registered_set(&["a"]);
        set.play(&TrackId::new("a")).unwrap();
        drain(&rx);

        set.pause();
        assert!(set.mode().is_idle());
        assert!(set.solo_target().is_none());
        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::Pause { id } if id.as_str() == "a"
        )));
    }

    #[test]
    fn pause_when_idle_sends_nothing() {
        let (mut set, rx) = registered_set(&["a"]);
        set.pause();
        assert!(drain(&rx).is_empty());
    }

    // --- Cohort ---

    #[test]
    fn cohort_with_unknown_member_is_rejected() {
        let (mut set, _rx) = registered_set(&["a"]);
        let err = set
            .set_sync_cohort(vec![TrackId::new("a"), TrackId::new("ghost")])
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownTrackId(_)));
    }

    #[test]
    fn cohort_is_replaced_wholesale() {
        let (mut set, _rx) = registered_set(&["a", "b", "c"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.set_sync_cohort(vec![TrackId::new("c")]).unwrap();
        assert_eq!(set.cohort(), [TrackId::new("c")]);
    }

    #[test]
    fn unequal_durations_are_tolerated() {
        let (mut set, _rx) = registered_set(&["a", "b"]);
        loaded(&mut set, "a", 2.0);
        loaded(&mut set, "b", 3.5);
        // Logged, not rejected
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        assert_eq!(set.cohort().len(), 2);
    }

    #[test]
    fn sync_play_starts_every_member_in_order() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();

        assert_eq!(*set.mode(), PlaybackMode::SyncGroup);
        let started: Vec<String> = drain(&rx)
            .iter()
            .filter_map(|c| match c {
                AudioCommand::Start { id, .. } => Some(id.as_str().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(started, ["a", "b"]);
    }

    #[test]
    fn sync_play_with_empty_cohort_stays_idle() {
        let (mut set, rx) = registered_set(&["a"]);
        set.sync_play();
        assert!(set.mode().is_idle());
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn sync_play_from_offset_passes_the_offset() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play_from_offset(Duration::from_millis(300));

        let cmds = drain(&rx);
        let offsets: Vec<Duration> = cmds
            .iter()
            .filter_map(|c| match c {
                AudioCommand::Start { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, [Duration::from_millis(300); 2]);
    }

    #[test]
    fn sync_pause_pauses_all_members_and_goes_idle() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();
        drain(&rx);

        set.sync_pause();
        assert!(set.mode().is_idle());
        let paused = drain(&rx)
            .iter()
            .filter(|c| matches!(c, AudioCommand::Pause { .. }))
            .count();
        assert_eq!(paused, 2);
    }

    // --- Solo ---

    #[test]
    fn solo_mutes_everyone_else_without_touching_transport() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();
        drain(&rx);

        set.solo(&TrackId::new("a")).unwrap();

        assert_eq!(*set.mode(), PlaybackMode::SyncGroup);
        assert_eq!(set.volume_of(&TrackId::new("a")), Some(1.0));
        assert_eq!(set.volume_of(&TrackId::new("b")), Some(0.0));
        // Only volume commands, no transport commands
        let cmds = drain(&rx);
        assert!(cmds.iter().all(|c| matches!(c, AudioCommand::SetVolume { .. })));
    }

    #[test]
    fn solo_switch_flips_volumes() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();
        set.solo(&TrackId::new("a")).unwrap();
        drain(&rx);

        set.solo(&TrackId::new("b")).unwrap();
        assert_eq!(set.volume_of(&TrackId::new("a")), Some(0.0));
        assert_eq!(set.volume_of(&TrackId::new("b")), Some(1.0));
    }

    #[test]
    fn solo_while_paused_changes_no_transport() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();

        set.solo(&TrackId::new("b")).unwrap();
        assert!(set.mode().is_idle());
        let cmds = drain(&rx);
        assert!(cmds.iter().all(|c| matches!(c, AudioCommand::SetVolume { .. })));
    }

    #[test]
    fn solo_survives_a_sync_restart() {
        let (mut set, rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();
        set.solo(&TrackId::new("a")).unwrap();
        set.sync_pause();
        drain(&rx);

        set.sync_play();
        assert_eq!(set.volume_of(&TrackId::new("a")), Some(1.0));
        assert_eq!(set.volume_of(&TrackId::new("b")), Some(0.0));
        // Restart issues no volume changes
        let cmds = drain(&rx);
        assert!(cmds.iter().all(|c| !matches!(c, AudioCommand::SetVolume { .. })));
    }

    // --- Ended handling ---

    #[test]
    fn single_track_ending_goes_idle() {
        let (mut set, _rx) = registered_set(&["a"]);
        set.play(&TrackId::new("a")).unwrap();

        let disposition = set.handle_ended(&TrackId::new("a"));
        assert_eq!(disposition, EndedDisposition::SingleFinished);
        assert!(set.mode().is_idle());
    }

    #[test]
    fn looped_track_is_restarted() {
        let (mut set, rx) = registered_set(&["a"]);
        set.set_loop(true);
        set.play(&TrackId::new("a")).unwrap();
        drain(&rx);

        let disposition = set.handle_ended(&TrackId::new("a"));
        assert_eq!(disposition, EndedDisposition::Looped);
        assert_eq!(*set.mode(), PlaybackMode::SingleTrack(TrackId::new("a")));
        let cmds = drain(&rx);
        assert!(cmds.iter().any(|c| matches!(
            c,
            AudioCommand::Start { offset, .. } if *offset == Duration::ZERO
        )));
    }

    #[test]
    fn finished_range_reads_as_pause_and_never_loops() {
        let (mut set, rx) = registered_set(&["a"]);
        set.set_loop(true);
        set.play_range(
            &TrackId::new("a"),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .unwrap();
        drain(&rx);

        let disposition = set.handle_ended(&TrackId::new("a"));
        assert_eq!(disposition, EndedDisposition::RangeFinished);
        assert!(set.mode().is_idle());
        assert!(drain(&rx).is_empty(), "range end must not restart playback");
    }

    #[test]
    fn cohort_members_finish_one_by_one() {
        let (mut set, _rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();

        assert_eq!(
            set.handle_ended(&TrackId::new("a")),
            EndedDisposition::CohortMemberFinished { last: false }
        );
        assert_eq!(*set.mode(), PlaybackMode::SyncGroup);

        assert_eq!(
            set.handle_ended(&TrackId::new("b")),
            EndedDisposition::CohortMemberFinished { last: true }
        );
        assert!(set.mode().is_idle());
    }

    #[test]
    fn ended_for_inactive_track_is_stray() {
        let (mut set, _rx) = registered_set(&["a", "b"]);
        set.play(&TrackId::new("a")).unwrap();
        assert_eq!(set.handle_ended(&TrackId::new("b")), EndedDisposition::Stray);
        // The playing track is unaffected
        assert_eq!(*set.mode(), PlaybackMode::SingleTrack(TrackId::new("a")));
    }

    // --- Position filtering ---

    #[test]
    fn single_playing_track_is_the_position_source() {
        let (mut set, _rx) = registered_set(&["a", "b"]);
        set.play(&TrackId::new("a")).unwrap();
        assert!(set.is_position_source(&TrackId::new("a")));
        assert!(!set.is_position_source(&TrackId::new("b")));
    }

    #[test]
    fn sync_mode_position_follows_the_solo() {
        let (mut set, _rx) = registered_set(&["a", "b"]);
        set.set_sync_cohort(vec![TrackId::new("a"), TrackId::new("b")]).unwrap();
        set.sync_play();

        // No solo, no position source
        assert!(!set.is_position_source(&TrackId::new("a")));

        set.solo(&TrackId::new("b")).unwrap();
        assert!(set.is_position_source(&TrackId::new("b")));
        assert!(!set.is_position_source(&TrackId::new("a")));
    }

    #[test]
    fn idle_set_has_no_position_source() {
        let (set, _rx) = registered_set(&["a"]);
        assert!(!set.is_position_source(&TrackId::new("a")));
    }
}
