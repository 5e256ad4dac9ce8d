//! Evaluation session
//!
//! The workflow state machine plus everything it feeds: protocol
//! implementations, trial records, and the submission seam. Audio moves
//! through [`crate::audio`]; this module decides what is allowed to
//! happen and when.

pub mod protocol;
pub mod results;
pub mod state;
pub mod submit;
pub mod workflow;

pub use protocol::{make_protocol, TrialContext, TrialProtocol};
pub use results::{RatingValue, SubmissionPayload, TrialResult};
pub use state::{
    PairwiseView, Phase, ProtocolView, RatingSlider, SegmentationView, SessionCommand,
    SessionEvent, SessionSnapshot, TrainingItemView,
};
pub use submit::{FileSubmitter, HttpSubmitter, SubmitOutcome, Submitter};
pub use workflow::EvaluationWorkflow;
