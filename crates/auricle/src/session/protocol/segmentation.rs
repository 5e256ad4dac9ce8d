//! Change-point marking protocol
//!
//! One stimulus per condition. Marker controls stay locked until the
//! participant has heard the clip once, uninterrupted, end to end: a
//! deadline armed at the clip's measured duration when playback starts
//! from zero, cancelled by any interruption, completes the listen when
//! it fires. The marker is a normalized position in [0, 1]; "no change
//! heard" records the -1 sentinel instead.

use std::time::Instant;

use crate::audio::AudioTrackSet;
use crate::error::{Result, SessionError};
use crate::session::results::{RatingValue, TrialResult};
use crate::session::state::{ProtocolView, SegmentationView};

use super::{base_result, require_timeout, TrialContext, TrialProtocol};

/// Half-width of the marker review window, as a position fraction
const REVIEW_HALF_WINDOW: f64 = 0.1;

/// Recorded when the participant asserts no change was heard
const NO_CHANGE_SENTINEL: f64 = -1.0;

pub struct SegmentationProtocol {
    stimulus_key: String,
    reference_keys: Vec<String>,
    /// Pending full-listen deadline; `None` once complete or interrupted
    listen_deadline: Option<Instant>,
    listen_complete: bool,
    marker: Option<f64>,
    no_change: bool,
}

impl SegmentationProtocol {
    pub fn new() -> Self {
        Self {
            stimulus_key: String::new(),
            reference_keys: Vec::new(),
            listen_deadline: None,
            listen_complete: false,
            marker: None,
            no_change: false,
        }
    }

    fn require_listened(&self) -> Result<()> {
        if self.listen_complete {
            Ok(())
        } else {
            Err(SessionError::IncompleteTrial(
                "Please listen to the whole recording first.".to_string(),
            ))
        }
    }
}

impl Default for SegmentationProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialProtocol for SegmentationProtocol {
    fn begin_trial(&mut self, ctx: &TrialContext<'_>, _tracks: &mut AudioTrackSet) -> Result<()> {
        // Config validation guarantees at least one stimulus key
        self.stimulus_key = ctx
            .condition
            .stimulus_keys
            .first()
            .cloned()
            .ok_or_else(|| {
                SessionError::Config(format!(
                    "condition {} has no stimulus to segment",
                    ctx.condition.condition_id
                ))
            })?;
        self.reference_keys = ctx.condition.reference_keys.clone();
        self.listen_deadline = None;
        self.listen_complete = false;
        self.marker = None;
        self.no_change = false;
        Ok(())
    }

    fn play_reference(
        &mut self,
        key: &str,
        ctx: &TrialContext<'_>,
        tracks: &mut AudioTrackSet,
    ) -> Result<()> {
        if !self.reference_keys.iter().any(|k| k == key) {
            return Err(SessionError::UnknownTrackId(ctx.track(key)));
        }
        // Switching to the reference interrupts a listen in progress
        self.listen_deadline = None;
        tracks.play(&ctx.track(key))
    }

    fn play_candidate(
        &mut self,
        key: &str,
        ctx: &TrialContext<'_>,
        tracks: &mut AudioTrackSet,
    ) -> Result<()> {
        if key != self.stimulus_key {
            return Err(SessionError::UnknownTrackId(ctx.track(key)));
        }
        let track = ctx.track(key);
        tracks.play(&track)?;
        if !self.listen_complete {
            // Restarting from zero re-arms the deadline at the measured length
            self.listen_deadline = tracks.duration_of(&track).map(|d| Instant::now() + d);
        }
        Ok(())
    }

    fn set_marker(&mut self, position: f64) -> Result<()> {
        self.require_listened()?;
        self.marker = Some(position.clamp(0.0, 1.0));
        self.no_change = false;
        Ok(())
    }

    fn confirm_no_change(&mut self) -> Result<()> {
        self.require_listened()?;
        self.no_change = true;
        self.marker = None;
        Ok(())
    }

    fn review_marker(&mut self, ctx: &TrialContext<'_>, tracks: &mut AudioTrackSet) -> Result<()> {
        let Some(marker) = self.marker else {
            return Err(SessionError::IncompleteTrial(
                "Place a marker before reviewing it.".to_string(),
            ));
        };
        let track = ctx.track(&self.stimulus_key);
        let Some(duration) = tracks.duration_of(&track) else {
            return Err(SessionError::AudioPlaybackFailed(format!(
                "duration of {track} is not known"
            )));
        };
        let start = (marker - REVIEW_HALF_WINDOW).max(0.0);
        let end = (marker + REVIEW_HALF_WINDOW).min(1.0);
        tracks.play_range(&track, duration.mul_f64(start), duration.mul_f64(end))
    }

    fn on_pause(&mut self) {
        // An interrupted listen does not count
        self.listen_deadline = None;
    }

    fn tick(&mut self, now: Instant) {
        if let Some(deadline) = self.listen_deadline {
            if now >= deadline {
                self.listen_deadline = None;
                self.listen_complete = true;
                tracing::debug!(key = %self.stimulus_key, "full listen-through complete");
            }
        }
    }

    fn readiness(&self, timeout_elapsed: bool) -> Result<()> {
        require_timeout(timeout_elapsed)?;
        self.require_listened()?;
        if self.marker.is_none() && !self.no_change {
            return Err(SessionError::NoSelectionMade(
                "Mark where the change happens, or confirm you heard none.".to_string(),
            ));
        }
        Ok(())
    }

    fn assemble_result(&self, ctx: &TrialContext<'_>) -> TrialResult {
        let mut result = base_result(ctx);
        result.ratings.insert(
            self.stimulus_key.clone(),
            RatingValue::Position(self.marker.unwrap_or(NO_CHANGE_SENTINEL)),
        );
        result
    }

    fn view(&self) -> ProtocolView {
        ProtocolView::Segmentation(SegmentationView {
            stimulus_key: self.stimulus_key.clone(),
            marker: self.marker,
            no_change: self.no_change,
            listen_complete: self.listen_complete,
        })
    }
}
