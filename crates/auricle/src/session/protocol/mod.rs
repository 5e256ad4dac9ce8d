//! Judgment protocols
//!
//! One trial lifecycle, three structurally different judgments. The
//! workflow stays protocol-agnostic: it owns phase transitions, the
//! trial timeout, and result accumulation, and delegates everything
//! stimulus-shaped to the active `TrialProtocol`.

pub mod pairwise;
pub mod rating;
pub mod segmentation;

use std::collections::BTreeMap;
use std::time::Instant;

use crate::audio::{AudioTrackSet, ClockUpdate, TrackId};
use crate::config::{Condition, ConditionGroup, ProtocolKind, SessionConfig};
use crate::error::{Result, SessionError};
use crate::session::results::TrialResult;
use crate::session::state::ProtocolView;

pub use pairwise::PairwiseChoiceProtocol;
pub use rating::RatingScaleProtocol;
pub use segmentation::SegmentationProtocol;

/// Read-only view of the current condition for protocol callbacks
pub struct TrialContext<'a> {
    pub condition: &'a Condition,
    pub group: &'a ConditionGroup,
    pub config: &'a SessionConfig,
}

impl<'a> TrialContext<'a> {
    pub fn new(config: &'a SessionConfig, condition_index: usize) -> Result<Self> {
        let condition = config.conditions.get(condition_index).ok_or_else(|| {
            SessionError::Config(format!("condition index {condition_index} out of range"))
        })?;
        let group = config.group(condition.group_id).ok_or_else(|| {
            SessionError::Config(format!("condition references unknown group {}", condition.group_id))
        })?;
        Ok(Self {
            condition,
            group,
            config,
        })
    }

    /// Track id for a key of this condition's group
    pub fn track(&self, key: &str) -> TrackId {
        TrackId::for_group(self.condition.group_id, key)
    }
}

/// One judgment protocol driving a trial.
///
/// Handlers a variant has no use for keep the no-op defaults; the front
/// end only offers the controls the active view names, so a stray
/// command is a host bug, logged and ignored.
pub trait TrialProtocol: Send {
    /// Reset per-trial state and prepare the track set (cohort etc.)
    fn begin_trial(&mut self, ctx: &TrialContext<'_>, tracks: &mut AudioTrackSet) -> Result<()>;

    fn play_reference(
        &mut self,
        key: &str,
        ctx: &TrialContext<'_>,
        tracks: &mut AudioTrackSet,
    ) -> Result<()> {
        let _ = (key, ctx, tracks);
        tracing::debug!("play_reference is not part of this protocol");
        Ok(())
    }

    fn play_candidate(
        &mut self,
        key: &str,
        ctx: &TrialContext<'_>,
        tracks: &mut AudioTrackSet,
    ) -> Result<()>;

    fn select_candidate(&mut self, key: &str) -> Result<()> {
        let _ = key;
        tracing::debug!("select_candidate is not part of this protocol");
        Ok(())
    }

    fn set_rating(&mut self, key: &str, value: i64, ctx: &TrialContext<'_>) -> Result<()> {
        let _ = (key, value, ctx);
        tracing::debug!("set_rating is not part of this protocol");
        Ok(())
    }

    fn set_marker(&mut self, position: f64) -> Result<()> {
        let _ = position;
        tracing::debug!("set_marker is not part of this protocol");
        Ok(())
    }

    fn confirm_no_change(&mut self) -> Result<()> {
        tracing::debug!("confirm_no_change is not part of this protocol");
        Ok(())
    }

    fn review_marker(&mut self, ctx: &TrialContext<'_>, tracks: &mut AudioTrackSet) -> Result<()> {
        let _ = (ctx, tracks);
        tracing::debug!("review_marker is not part of this protocol");
        Ok(())
    }

    /// Playback notifications relevant during the trial
    fn on_clock(&mut self, update: &ClockUpdate, tracks: &mut AudioTrackSet) {
        let _ = (update, tracks);
    }

    /// The user paused playback; pending listen obligations reset
    fn on_pause(&mut self) {}

    /// Periodic wall-clock tick for protocol-owned deadlines
    fn tick(&mut self, now: Instant) {
        let _ = now;
    }

    /// Ready to advance? An `Err` carries the user-facing refusal text.
    fn readiness(&self, timeout_elapsed: bool) -> Result<()>;

    /// Build the trial's record; only called after `readiness` passed
    fn assemble_result(&self, ctx: &TrialContext<'_>) -> TrialResult;

    fn view(&self) -> ProtocolView;
}

/// Instantiate the protocol the config names
pub fn make_protocol(kind: ProtocolKind) -> Box<dyn TrialProtocol> {
    match kind {
        ProtocolKind::RatingScale => Box::new(RatingScaleProtocol::new()),
        ProtocolKind::PairwiseChoice => Box::new(PairwiseChoiceProtocol::new()),
        ProtocolKind::Segmentation => Box::new(SegmentationProtocol::new()),
    }
}

/// Shared trial-timeout refusal used by every protocol
pub(crate) fn require_timeout(timeout_elapsed: bool) -> Result<()> {
    if timeout_elapsed {
        Ok(())
    } else {
        Err(SessionError::IncompleteTrial(
            "Please keep listening before continuing.".to_string(),
        ))
    }
}

/// Result skeleton with the condition's files and keys filled in;
/// protocols add their ratings on top
pub(crate) fn base_result(ctx: &TrialContext<'_>) -> TrialResult {
    let files_for = |keys: &[String]| {
        keys.iter()
            .filter_map(|key| ctx.group.path_for(key))
            .map(|path| path.display().to_string())
            .collect()
    };
    TrialResult {
        condition_id: ctx.condition.condition_id,
        group_id: ctx.condition.group_id,
        ratings: BTreeMap::new(),
        reference_files: files_for(&ctx.condition.reference_keys),
        stimulus_files: files_for(&ctx.condition.stimulus_keys),
        reference_keys: ctx.condition.reference_keys.clone(),
        stimulus_keys: ctx.condition.stimulus_keys.clone(),
    }
}
