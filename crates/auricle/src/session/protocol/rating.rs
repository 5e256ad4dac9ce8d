//! Rating-scale protocol
//!
//! Every stimulus of the condition's group gets its own slider and plays
//! solo on demand; no synchronized cohort is involved. An untouched
//! slider submits the configured default value, so the trial is ready as
//! soon as the timeout elapses; participants are never forced to move a
//! slider they judge correct at its default.

use crate::audio::AudioTrackSet;
use crate::error::{Result, SessionError};
use crate::session::results::RatingValue;
use crate::session::results::TrialResult;
use crate::session::state::{ProtocolView, RatingSlider};

use super::{base_result, require_timeout, TrialContext, TrialProtocol};

pub struct RatingScaleProtocol {
    reference_keys: Vec<String>,
    /// Sliders in stimulus order; the single source of rating state
    sliders: Vec<RatingSlider>,
}

impl RatingScaleProtocol {
    pub fn new() -> Self {
        Self {
            reference_keys: Vec::new(),
            sliders: Vec::new(),
        }
    }

    fn slider_mut(&mut self, key: &str) -> Option<&mut RatingSlider> {
        self.sliders.iter_mut().find(|s| s.key == key)
    }
}

impl Default for RatingScaleProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialProtocol for RatingScaleProtocol {
    fn begin_trial(&mut self, ctx: &TrialContext<'_>, _tracks: &mut AudioTrackSet) -> Result<()> {
        self.reference_keys = ctx.condition.reference_keys.clone();
        self.sliders = ctx
            .condition
            .stimulus_keys
            .iter()
            .map(|key| RatingSlider {
                key: key.clone(),
                value: ctx.config.default_rating_value,
            })
            .collect();
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
        tracks.play(&ctx.track(key))
    }

    fn play_candidate(
        &mut self,
        key: &str,
        ctx: &TrialContext<'_>,
        tracks: &mut AudioTrackSet,
    ) -> Result<()> {
        if !self.sliders.iter().any(|s| s.key == key) {
            return Err(SessionError::UnknownTrackId(ctx.track(key)));
        }
        tracks.play(&ctx.track(key))
    }

    fn set_rating(&mut self, key: &str, value: i64, ctx: &TrialContext<'_>) -> Result<()> {
        let clamped = value.clamp(ctx.config.min_rating_value, ctx.config.max_rating_value);
        match self.slider_mut(key) {
            Some(slider) => {
                slider.value = clamped;
                Ok(())
            }
            None => Err(SessionError::UnknownTrackId(ctx.track(key))),
        }
    }

    fn readiness(&self, timeout_elapsed: bool) -> Result<()> {
        // Defaults are a valid answer; only the trial timeout gates here
        require_timeout(timeout_elapsed)
    }

    fn assemble_result(&self, ctx: &TrialContext<'_>) -> TrialResult {
        let mut result = base_result(ctx);
        result.ratings = self
            .sliders
            .iter()
            .map(|s| (s.key.clone(), RatingValue::Score(s.value)))
            .collect();
        result
    }

    fn view(&self) -> ProtocolView {
        ProtocolView::Rating {
            reference_keys: self.reference_keys.clone(),
            sliders: self.sliders.clone(),
        }
    }
}
