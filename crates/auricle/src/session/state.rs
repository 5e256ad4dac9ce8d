//! Session surface types
//!
//! The host drives the workflow exclusively through these types: commands
//! in, events and cloneable snapshots out. Events are wakeups; the
//! snapshot is the authoritative render state.

use std::fmt;

/// Lifecycle phase of one evaluation session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Welcome text; also covers the initial preload
    Introduction,
    /// Listen to the labeled training examples
    Training,
    /// Judge conditions one trial at a time
    Evaluation,
    /// Results handed to the submitter
    Submit,
    /// Accepted; the session is over
    Complete,
    /// Absorbing failure state; recoverable only after a rejected submit
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Introduction => "introduction",
            Phase::Training => "training",
            Phase::Evaluation => "evaluation",
            Phase::Submit => "submit",
            Phase::Complete => "complete",
            Phase::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// User intent, forwarded verbatim by the front end
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Leave the introduction once loading is done
    Start,
    /// Play one training example
    PlayTraining { group: String, key: String },
    /// Play a reference stimulus of the current condition
    PlayReference(String),
    /// Play a candidate stimulus of the current condition
    PlayCandidate(String),
    /// Pairwise: choose a candidate
    SelectCandidate(String),
    /// Rating scale: move one slider
    SetRating { key: String, value: i64 },
    /// Segmentation: place the change-point marker (normalized 0..1)
    SetMarker(f64),
    /// Segmentation: assert that no change was heard
    ConfirmNoChange,
    /// Segmentation: re-audition a short window around the marker
    ReviewMarker,
    /// Pause whatever is playing
    Pause,
    /// Toggle looping for all tracks
    SetLoop(bool),
    /// Continue: training gate, trial advance, or submit retry
    AdvanceTrial,
}

/// Notifications for the host loop
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged(Phase),
    /// Outstanding load acknowledgements; 0 unlocks the session
    LoadingProgress { remaining: usize },
    /// Normalized playhead of the audible track
    Position(f64),
    AdvanceEnabled(bool),
    /// Inline user-facing refusal text (incomplete trial, rejection)
    Prompt(String),
    /// Unrecoverable audio fault; the session is abandoned
    FatalError(String),
}

/// One rating-scale slider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingSlider {
    pub key: String,
    pub value: i64,
}

/// Pairwise comparison render state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairwiseView {
    pub reference_keys: Vec<String>,
    pub candidate_a: String,
    pub candidate_b: String,
    pub played_a: bool,
    pub played_b: bool,
    pub selected: Option<String>,
}

/// Segmentation render state
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationView {
    pub stimulus_key: String,
    pub marker: Option<f64>,
    pub no_change: bool,
    /// Marker controls stay locked until the first full listen-through
    pub listen_complete: bool,
}

/// Protocol-specific slice of the snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolView {
    Rating {
        reference_keys: Vec<String>,
        sliders: Vec<RatingSlider>,
    },
    Pairwise(PairwiseView),
    Segmentation(SegmentationView),
}

/// One training example with its listened flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingItemView {
    pub group: String,
    pub key: String,
    pub played: bool,
}

/// Everything a front end needs to render one frame
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub test_title: Option<String>,
    /// Instruction text for the current phase (condition-specific during
    /// evaluation when the config provides it)
    pub instructions: String,
    pub loading_remaining: usize,
    pub loading_total: usize,
    pub condition_index: usize,
    pub condition_total: usize,
    pub position: f64,
    pub advance_enabled: bool,
    pub loop_enabled: bool,
    pub prompt: Option<String>,
    pub fatal_error: Option<String>,
    pub training: Vec<TrainingItemView>,
    /// Present only during the evaluation phase
    pub protocol: Option<ProtocolView>,
}
