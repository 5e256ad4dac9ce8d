//! Trial results and the submission payload
//!
//! Field names keep the camelCase wire spelling the collection server
//! expects, so payloads from this crate drop into the existing analysis
//! pipeline unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One recorded judgment value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RatingValue {
    /// A rating-scale score, or a 0/1 pairwise choice indicator
    Score(i64),
    /// A normalized change-point position, or -1.0 for "no change heard"
    Position(f64),
}

/// The record appended when one condition's trial completes.
///
/// Appended in condition order and never mutated afterwards; the ordered
/// sequence of these is the whole submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    #[serde(rename = "conditionID")]
    pub condition_id: i64,
    #[serde(rename = "groupID")]
    pub group_id: i64,
    /// Judgment per stimulus key (the bare key, without the group prefix)
    pub ratings: BTreeMap<String, RatingValue>,
    #[serde(rename = "referenceFiles")]
    pub reference_files: Vec<String>,
    #[serde(rename = "stimulusFiles")]
    pub stimulus_files: Vec<String>,
    #[serde(rename = "referenceKeys")]
    pub reference_keys: Vec<String>,
    #[serde(rename = "stimulusKeys")]
    pub stimulus_keys: Vec<String>,
}

/// Everything sent at Submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(rename = "participantID", skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(rename = "testTitle", skip_serializing_if = "Option::is_none")]
    pub test_title: Option<String>,
    #[serde(rename = "completedConditionData")]
    pub completed_condition_data: Vec<TrialResult>,
}
