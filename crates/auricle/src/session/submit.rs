//! Result submission
//!
//! The workflow hands the finished payload to a `Submitter` exactly once
//! per trigger; a rejected outcome leaves the session in a retryable
//! state with the same payload. Transport faults are reported as
//! rejections rather than errors so the participant can retry instead of
//! losing the session.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::tuning::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT};
use crate::error::{Result, SessionError};

use super::results::SubmissionPayload;

/// What the collection endpoint said
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(String),
}

/// Destination for the completed session's results
pub trait Submitter: Send {
    fn submit(&mut self, payload: &SubmissionPayload) -> SubmitOutcome;
}

/// POSTs the payload as JSON to a collection endpoint
pub struct HttpSubmitter {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpSubmitter {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Submitter for HttpSubmitter {
    fn submit(&mut self, payload: &SubmissionPayload) -> SubmitOutcome {
        let response = match self.client.post(&self.url).json(payload).send() {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "submission request failed");
                return SubmitOutcome::Rejected(SessionError::from(e).to_string());
            }
        };
        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %self.url, "submission accepted");
            SubmitOutcome::Accepted
        } else {
            tracing::warn!(url = %self.url, %status, "submission rejected");
            SubmitOutcome::Rejected(format!("server responded with {status}"))
        }
    }
}

/// Writes the payload as pretty JSON next to the session
pub struct FileSubmitter {
    path: PathBuf,
}

impl FileSubmitter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Submitter for FileSubmitter {
    fn submit(&mut self, payload: &SubmissionPayload) -> SubmitOutcome {
        let serialized = match serde_json::to_string_pretty(payload) {
            Ok(s) => s,
            Err(e) => return SubmitOutcome::Rejected(format!("could not serialize results: {e}")),
        };
        match fs::write(&self.path, serialized) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "results written");
                SubmitOutcome::Accepted
            }
            Err(e) => SubmitOutcome::Rejected(format!(
                "could not write {}: {e}",
                self.path.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::results::TrialResult;
    use std::collections::BTreeMap;

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            participant_id: Some("p1".into()),
            test_title: Some("test".into()),
            completed_condition_data: vec![TrialResult {
                condition_id: 0,
                group_id: 0,
                ratings: BTreeMap::new(),
                reference_files: Vec::new(),
                stimulus_files: Vec::new(),
                reference_keys: Vec::new(),
                stimulus_keys: Vec::new(),
            }],
        }
    }

    #[test]
    fn http_submitter_builds() {
        assert!(HttpSubmitter::new("http://localhost/submit").is_ok());
    }

    #[test]
    fn file_submitter_writes_wire_format() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let mut submitter = FileSubmitter::new(&path);

        assert_eq!(submitter.submit(&payload()), SubmitOutcome::Accepted);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["participantID"], "p1");
        assert_eq!(written["completedConditionData"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn file_submitter_reports_unwritable_path() {
        let mut submitter = FileSubmitter::new("/nonexistent-dir/results.json");
        match submitter.submit(&payload()) {
            SubmitOutcome::Rejected(reason) => assert!(reason.contains("results.json")),
            SubmitOutcome::Accepted => panic!("write into a missing directory must fail"),
        }
    }

    #[test]
    fn http_submitter_rejects_unreachable_host() {
        // Connection refused on a port nothing listens on; must come back
        // as a rejection, never a panic or error
        let mut submitter = HttpSubmitter::new("http://127.0.0.1:9/submit").unwrap();
        match submitter.submit(&payload()) {
            SubmitOutcome::Rejected(reason) => assert!(!reason.is_empty()),
            SubmitOutcome::Accepted => panic!("nothing listens on port 9"),
        }
    }
}
