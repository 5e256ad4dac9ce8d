//! Session workflow
//!
//! One `EvaluationWorkflow` owns a complete session: it registers every
//! clip for preload up front, walks Introduction, Training, Evaluation,
//! Submit and Complete, and absorbs unrecoverable faults into Error.
//! It is single-threaded and cooperative. The host calls `pump` between
//! commands to drain engine events and service deadlines, so command
//! handlers always run against a settled view of playback.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioCommand, AudioEvent, AudioTrackSet, ClockUpdate, PlaybackClock, TrackId};
use crate::config::{tuning, SessionConfig};
use crate::error::{Result, SessionError};
use crate::session::protocol::{make_protocol, TrialContext, TrialProtocol};
use crate::session::results::{SubmissionPayload, TrialResult};
use crate::session::state::{
    Phase, SessionCommand, SessionEvent, SessionSnapshot, TrainingItemView,
};
use crate::session::submit::{SubmitOutcome, Submitter};

/// One training example and whether it has been heard to completion
struct TrainingItem {
    group: String,
    key: String,
    track: TrackId,
    played: bool,
}

pub struct EvaluationWorkflow {
    config: SessionConfig,
    participant_id: Option<String>,
    tracks: AudioTrackSet,
    clock: PlaybackClock,
    engine_events: Receiver<AudioEvent>,
    session_tx: Sender<SessionEvent>,
    session_rx: Receiver<SessionEvent>,
    submitter: Box<dyn Submitter>,
    protocol: Box<dyn TrialProtocol>,

    phase: Phase,
    condition_index: usize,
    results: Vec<TrialResult>,
    training: Vec<TrainingItem>,
    loading_total: usize,
    loading_remaining: usize,

    /// Wall-clock gate on leaving the current trial
    advance_deadline: Option<Instant>,
    timeout_elapsed: bool,

    prompt: Option<String>,
    fatal: Option<String>,
    /// The error phase allows a retry only after a rejected submission
    error_recoverable: bool,
    /// Built once when evaluation finishes; retries resend it verbatim
    submission: Option<SubmissionPayload>,
    advance_was_enabled: bool,
}

impl EvaluationWorkflow {
    /// Validates the config and queues a load for every training and
    /// group file. The session stays locked until the engine has
    /// acknowledged each one.
    pub fn new(
        config: SessionConfig,
        participant_id: Option<String>,
        engine_commands: Sender<AudioCommand>,
        engine_events: Receiver<AudioEvent>,
        submitter: Box<dyn Submitter>,
    ) -> Result<Self> {
        config.validate()?;
        let (session_tx, session_rx) = bounded(tuning::EVENT_CHANNEL_CAPACITY);
        let mut tracks = AudioTrackSet::new(engine_commands);

        let mut training = Vec::new();
        for group in &config.training_groups {
            for (key, path) in &group.files {
                let track = TrackId::for_training(&group.group, key);
                tracks.register(track.clone(), path.clone())?;
                training.push(TrainingItem {
                    group: group.group.clone(),
                    key: key.clone(),
                    track,
                    played: false,
                });
            }
        }
        for group in &config.groups {
            for (key, path) in group.all_files() {
                tracks.register(TrackId::for_group(group.group_id, key), path.clone())?;
            }
        }
        let loading_total = training.len()
            + config
                .groups
                .iter()
                .map(|g| g.reference_files.len() + g.stimulus_files.len())
                .sum::<usize>();
        info!(files = loading_total, "preloading session audio");

        let protocol = make_protocol(config.protocol);
        Ok(Self {
            config,
            participant_id,
            tracks,
            clock: PlaybackClock::new(),
            engine_events,
            session_tx,
            session_rx,
            submitter,
            protocol,
            phase: Phase::Introduction,
            condition_index: 0,
            results: Vec::new(),
            training,
            loading_total,
            loading_remaining: loading_total,
            advance_deadline: None,
            timeout_elapsed: false,
            prompt: None,
            fatal: None,
            error_recoverable: false,
            submission: None,
            advance_was_enabled: false,
        })
    }

    /// A cloneable handle for waking the host loop. Events are hints;
    /// `snapshot` is the authoritative render state.
    pub fn event_receiver(&self) -> Receiver<SessionEvent> {
        self.session_rx.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_session_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Drains engine events and services deadlines. Call this regularly
    /// from the host loop, and before trusting a snapshot.
    pub fn pump(&mut self) {
        while let Ok(event) = self.engine_events.try_recv() {
            if let Some(update) = self.clock.process(&mut self.tracks, event) {
                self.apply_clock_update(update);
            }
        }
        let now = Instant::now();
        if let Some(deadline) = self.advance_deadline {
            if now >= deadline {
                self.advance_deadline = None;
                self.timeout_elapsed = true;
                debug!(condition = self.condition_index, "trial timeout satisfied");
            }
        }
        if self.phase == Phase::Evaluation {
            self.protocol.tick(now);
        }
        self.refresh_advance();
    }

    pub fn handle_command(&mut self, cmd: SessionCommand) {
        if self.loading_remaining > 0 {
            debug!(?cmd, remaining = self.loading_remaining, "ignored while loading");
            return;
        }
        if self.phase == Phase::Complete {
            debug!(?cmd, "session already complete");
            return;
        }
        // A fresh interaction clears the previous refusal text
        self.prompt = None;
        if let Err(err) = self.dispatch(cmd) {
            self.refuse(err);
        }
        self.refresh_advance();
    }

    fn dispatch(&mut self, cmd: SessionCommand) -> Result<()> {
        match cmd {
            SessionCommand::Start => {
                if self.phase == Phase::Introduction {
                    self.set_phase(Phase::Training);
                }
                Ok(())
            }
            SessionCommand::PlayTraining { group, key } => {
                if self.phase != Phase::Training {
                    debug!(%group, %key, "training playback outside the training phase");
                    return Ok(());
                }
                let track = self
                    .training
                    .iter()
                    .find(|item| item.group == group && item.key == key)
                    .map(|item| item.track.clone())
                    .ok_or_else(|| {
                        SessionError::UnknownTrackId(TrackId::for_training(&group, &key))
                    })?;
                self.tracks.play(&track)
            }
            SessionCommand::PlayReference(key) => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                let ctx = TrialContext::new(&self.config, self.condition_index)?;
                self.protocol.play_reference(&key, &ctx, &mut self.tracks)
            }
            SessionCommand::PlayCandidate(key) => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                let ctx = TrialContext::new(&self.config, self.condition_index)?;
                self.protocol.play_candidate(&key, &ctx, &mut self.tracks)
            }
            SessionCommand::SelectCandidate(key) => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                self.protocol.select_candidate(&key)
            }
            SessionCommand::SetRating { key, value } => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                let ctx = TrialContext::new(&self.config, self.condition_index)?;
                self.protocol.set_rating(&key, value, &ctx)
            }
            SessionCommand::SetMarker(position) => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                self.protocol.set_marker(position)
            }
            SessionCommand::ConfirmNoChange => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                self.protocol.confirm_no_change()
            }
            SessionCommand::ReviewMarker => {
                if self.phase != Phase::Evaluation {
                    return Ok(());
                }
                let ctx = TrialContext::new(&self.config, self.condition_index)?;
                self.protocol.review_marker(&ctx, &mut self.tracks)
            }
            SessionCommand::Pause => {
                self.tracks.pause();
                if self.phase == Phase::Evaluation {
                    self.protocol.on_pause();
                }
                Ok(())
            }
            SessionCommand::SetLoop(enabled) => {
                self.tracks.set_loop(enabled);
                Ok(())
            }
            SessionCommand::AdvanceTrial => self.advance(),
        }
    }

    fn advance(&mut self) -> Result<()> {
        match self.phase {
            Phase::Introduction => {
                self.set_phase(Phase::Training);
                Ok(())
            }
            Phase::Training => {
                if !self.training_gate_satisfied() {
                    return Err(SessionError::IncompleteTrial(
                        "Please listen to every training example before continuing.".into(),
                    ));
                }
                self.tracks.pause();
                self.condition_index = 0;
                self.set_phase(Phase::Evaluation);
                self.begin_current_trial()
            }
            Phase::Evaluation => self.advance_trial(),
            Phase::Error if self.error_recoverable => {
                self.attempt_submit();
                Ok(())
            }
            Phase::Submit | Phase::Complete | Phase::Error => {
                debug!(phase = %self.phase, "nothing to advance");
                Ok(())
            }
        }
    }

    /// Records the current trial and moves on, or hands the results to
    /// the submitter after the last condition.
    fn advance_trial(&mut self) -> Result<()> {
        self.protocol.readiness(self.timeout_elapsed)?;
        let ctx = TrialContext::new(&self.config, self.condition_index)?;
        let result = self.protocol.assemble_result(&ctx);
        self.results.push(result);
        debug!(
            condition = self.condition_index,
            recorded = self.results.len(),
            "trial recorded"
        );
        self.advance_deadline = None;
        self.timeout_elapsed = false;
        self.tracks.pause();
        self.condition_index += 1;
        if self.condition_index >= self.config.conditions.len() {
            self.enter_submit();
            Ok(())
        } else {
            self.begin_current_trial()
        }
    }

    fn begin_current_trial(&mut self) -> Result<()> {
        let ctx = TrialContext::new(&self.config, self.condition_index)?;
        self.protocol.begin_trial(&ctx, &mut self.tracks)?;
        self.arm_trial_timeout();
        info!(
            condition = self.condition_index,
            of = self.config.conditions.len(),
            "trial started"
        );
        Ok(())
    }

    /// Replacing the deadline outright means an expiry from the
    /// previous trial can never carry over into this one.
    fn arm_trial_timeout(&mut self) {
        if self.config.test_timeout_sec > 0.0 {
            self.timeout_elapsed = false;
            self.advance_deadline =
                Some(Instant::now() + Duration::from_secs_f64(self.config.test_timeout_sec));
        } else {
            self.timeout_elapsed = true;
            self.advance_deadline = None;
        }
    }

    fn enter_submit(&mut self) {
        self.set_phase(Phase::Submit);
        if self.submission.is_none() {
            self.submission = Some(SubmissionPayload {
                participant_id: self.participant_id.clone(),
                test_title: self.config.test_title.clone(),
                completed_condition_data: self.results.clone(),
            });
        }
        self.attempt_submit();
    }

    fn attempt_submit(&mut self) {
        let Some(payload) = self.submission.as_ref() else {
            return;
        };
        info!(results = payload.completed_condition_data.len(), "submitting results");
        match self.submitter.submit(payload) {
            SubmitOutcome::Accepted => {
                info!("submission accepted; session complete");
                self.prompt = None;
                self.error_recoverable = false;
                self.set_phase(Phase::Complete);
            }
            SubmitOutcome::Rejected(reason) => {
                let err = SessionError::SubmissionRejected(reason);
                warn!(%err, "retry available");
                self.error_recoverable = true;
                let message = err.to_string();
                self.prompt = Some(message.clone());
                self.emit(SessionEvent::Prompt(message));
                self.set_phase(Phase::Error);
            }
        }
    }

    fn apply_clock_update(&mut self, update: ClockUpdate) {
        match &update {
            ClockUpdate::Loaded(id) => {
                if self.loading_remaining > 0 {
                    self.loading_remaining -= 1;
                    debug!(track = %id, remaining = self.loading_remaining, "clip ready");
                    self.emit(SessionEvent::LoadingProgress {
                        remaining: self.loading_remaining,
                    });
                    if self.loading_remaining == 0 {
                        info!("all audio loaded; session unlocked");
                    }
                }
            }
            ClockUpdate::LoadFailed { track, message } => {
                self.fail(SessionError::AudioLoadFailed {
                    track: track.clone(),
                    message: message.clone(),
                });
            }
            ClockUpdate::Position(fraction) => {
                self.emit(SessionEvent::Position(*fraction));
            }
            ClockUpdate::Ended(id) => {
                if self.phase == Phase::Training {
                    if let Some(item) = self.training.iter_mut().find(|item| item.track == *id) {
                        if !item.played {
                            item.played = true;
                            debug!(group = %item.group, key = %item.key, "training example heard");
                        }
                    }
                }
            }
            ClockUpdate::Paused => {}
            ClockUpdate::Failed(message) => {
                self.fail(SessionError::AudioPlaybackFailed(message.clone()));
                return;
            }
        }
        if self.phase == Phase::Evaluation {
            self.protocol.on_clock(&update, &mut self.tracks);
        }
    }

    /// Audio faults abandon the session; there is no way to finish a
    /// listening test with a broken output path.
    fn fail(&mut self, err: SessionError) {
        error!(%err, "session failed");
        let message = err.to_string();
        self.fatal = Some(message.clone());
        self.error_recoverable = false;
        self.advance_deadline = None;
        self.tracks.pause();
        self.set_phase(Phase::Error);
        self.emit(SessionEvent::FatalError(message));
    }

    fn refuse(&mut self, err: SessionError) {
        let message = err.to_string();
        match &err {
            SessionError::IncompleteTrial(_) | SessionError::NoSelectionMade(_) => {
                debug!(%message, "advance refused")
            }
            _ => error!(%err, "command failed"),
        }
        self.prompt = Some(message.clone());
        self.emit(SessionEvent::Prompt(message));
    }

    fn training_gate_satisfied(&self) -> bool {
        !self.config.require_listening_to_all_training_sounds
            || self.training.iter().all(|item| item.played)
    }

    fn advance_ready(&self) -> bool {
        if self.loading_remaining > 0 {
            return false;
        }
        match self.phase {
            Phase::Introduction => true,
            Phase::Training => self.training_gate_satisfied(),
            Phase::Evaluation => self.protocol.readiness(self.timeout_elapsed).is_ok(),
            Phase::Submit | Phase::Complete => false,
            Phase::Error => self.error_recoverable,
        }
    }

    fn refresh_advance(&mut self) {
        let enabled = self.advance_ready();
        if enabled != self.advance_was_enabled {
            self.advance_was_enabled = enabled;
            self.emit(SessionEvent::AdvanceEnabled(enabled));
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        info!(from = %self.phase, to = %phase, "phase change");
        self.phase = phase;
        self.emit(SessionEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: SessionEvent) {
        // The snapshot is authoritative; a dropped event only delays a redraw
        if self.session_tx.try_send(event).is_err() {
            debug!("session event channel full");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            test_title: self.config.test_title.clone(),
            instructions: self.instructions_for_phase(),
            loading_remaining: self.loading_remaining,
            loading_total: self.loading_total,
            condition_index: self.condition_index,
            condition_total: self.config.conditions.len(),
            position: self.clock.position(),
            advance_enabled: self.advance_ready(),
            loop_enabled: self.tracks.loop_enabled(),
            prompt: self.prompt.clone(),
            fatal_error: self.fatal.clone(),
            training: self
                .training
                .iter()
                .map(|item| TrainingItemView {
                    group: item.group.clone(),
                    key: item.key.clone(),
                    played: item.played,
                })
                .collect(),
            protocol: (self.phase == Phase::Evaluation).then(|| self.protocol.view()),
        }
    }

    fn instructions_for_phase(&self) -> String {
        let text = match self.phase {
            Phase::Introduction => self.config.introduction_html.as_deref(),
            Phase::Training => self.config.training_instructions_html.as_deref(),
            Phase::Evaluation => self
                .config
                .conditions
                .get(self.condition_index)
                .and_then(|c| c.evaluation_instructions_html.as_deref())
                .or(self.config.evaluation_instructions_html.as_deref()),
            _ => None,
        };
        text.unwrap_or_default().to_string()
    }
}
