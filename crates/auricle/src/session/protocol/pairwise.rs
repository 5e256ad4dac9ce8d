//! Forced-choice pairwise protocol
//!
//! The two candidates and any references run as one sync cohort. A play
//! command solos the requested track and only starts the cohort when the
//! transport is idle, so switching between A and B mid-playback changes
//! nothing but which member is audible. No re-seek, no resync error.

use std::collections::BTreeMap;

use crate::audio::AudioTrackSet;
use crate::error::{Result, SessionError};
use crate::session::results::{RatingValue, TrialResult};
use crate::session::state::{PairwiseView, ProtocolView};

use super::{base_result, require_timeout, TrialContext, TrialProtocol};

pub struct PairwiseChoiceProtocol {
    reference_keys: Vec<String>,
    pair: [String; 2],
    /// Engagement per playable key, set when its play command runs
    engaged: BTreeMap<String, bool>,
    selected: Option<String>,
}

impl PairwiseChoiceProtocol {
    pub fn new() -> Self {
        Self {
            reference_keys: Vec::new(),
            pair: [String::new(), String::new()],
            engaged: BTreeMap::new(),
            selected: None,
        }
    }

    /// Solo the key's track; start the cohort only from idle so a running
    /// comparison keeps its playhead
    fn engage(&mut self, key: &str, ctx: &TrialContext<'_>, tracks: &mut AudioTrackSet) -> Result<()> {
        tracks.solo(&ctx.track(key))?;
        if tracks.mode().is_idle() {
            tracks.sync_play();
        }
        self.engaged.insert(key.to_string(), true);
        Ok(())
    }
}

impl Default for PairwiseChoiceProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialProtocol for PairwiseChoiceProtocol {
    fn begin_trial(&mut self, ctx: &TrialContext<'_>, tracks: &mut AudioTrackSet) -> Result<()> {
        let [a, b] = ctx.condition.pair_keys()?;
        self.pair = [a.to_string(), b.to_string()];
        self.reference_keys = ctx.condition.reference_keys.clone();
        self.engaged = self
            .reference_keys
            .iter()
            .chain(self.pair.iter())
            .map(|key| (key.clone(), false))
            .collect();
        self.selected = None;

        let cohort = self
            .reference_keys
            .iter()
            .chain(self.pair.iter())
            .map(|key| ctx.track(key))
            .collect();
        tracks.set_sync_cohort(cohort)
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
        self.engage(key, ctx, tracks)
    }

    fn play_candidate(
        &mut self,
        key: &str,
        ctx: &TrialContext<'_>,
        tracks: &mut AudioTrackSet,
    ) -> Result<()> {
        if !self.pair.iter().any(|k| k == key) {
            return Err(SessionError::UnknownTrackId(ctx.track(key)));
        }
        self.engage(key, ctx, tracks)
    }

    fn select_candidate(&mut self, key: &str) -> Result<()> {
        if !self.pair.iter().any(|k| k == key) {
            return Err(SessionError::IncompleteTrial(
                "That choice is not part of this comparison.".to_string(),
            ));
        }
        self.selected = Some(key.to_string());
        Ok(())
    }

    fn readiness(&self, timeout_elapsed: bool) -> Result<()> {
        require_timeout(timeout_elapsed)?;
        if !self.engaged.values().all(|&played| played) {
            return Err(SessionError::IncompleteTrial(
                "Please listen to every version before continuing.".to_string(),
            ));
        }
        if self.selected.is_none() {
            return Err(SessionError::IncompleteTrial(
                "Please choose the version that sounds better.".to_string(),
            ));
        }
        Ok(())
    }

    fn assemble_result(&self, ctx: &TrialContext<'_>) -> TrialResult {
        let mut result = base_result(ctx);
        for key in &self.pair {
            let chosen = self.selected.as_deref() == Some(key.as_str());
            result
                .ratings
                .insert(key.clone(), RatingValue::Score(i64::from(chosen)));
        }
        result
    }

    fn view(&self) -> ProtocolView {
        let played = |key: &str| self.engaged.get(key).copied().unwrap_or(false);
        ProtocolView::Pairwise(PairwiseView {
            reference_keys: self.reference_keys.clone(),
            candidate_a: self.pair[0].clone(),
            candidate_b: self.pair[1].clone(),
            played_a: played(&self.pair[0]),
            played_b: played(&self.pair[1]),
            selected: self.selected.clone(),
        })
    }
}
