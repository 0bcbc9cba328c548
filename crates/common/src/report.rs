//! Run report model
//!
//! The report is the only output of a run. Its wire shape is:
//!
//! ```json
//! {
//!   "schemaVersion": "v1",
//!   "scenario": "basic",
//!   "startedAt": "2024-01-01T00:00:00.000Z",
//!   "finishedAt": "2024-01-01T00:00:01.250Z",
//!   "status": "passed",
//!   "sequences": [
//!     {"name": "login", "status": "passed", "durationMs": 1250,
//!      "steps": [{"id": "prompt", "type": "waitFor", "status": "passed", "durationMs": 40, "error": null}],
//!      "artifacts": []}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::SchemaVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub step_type: String,

    pub status: RunStatus,

    pub duration_ms: u64,

    /// Failure message, `null` on success
    pub error: Option<String>,
}

/// Outcome of one sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceResult {
    pub name: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub artifacts: Vec<String>,
}

/// Aggregated outcome of a scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub schema_version: SchemaVersion,
    pub scenario: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: RunStatus,
    pub sequences: Vec<SequenceResult>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the report against its schema
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Error::schema(format!("invalid report: {}", msg));

        if self.scenario.is_empty() {
            return Err(invalid("scenario must be non-empty".into()));
        }
        if self.started_at.is_empty() || self.finished_at.is_empty() {
            return Err(invalid("timestamps must be non-empty".into()));
        }
        if self.sequences.is_empty() {
            return Err(invalid("sequences must be non-empty".into()));
        }
        for sequence in &self.sequences {
            let at = |msg: &str| invalid(format!("sequence {:?} {}", sequence.name, msg));
            if sequence.name.is_empty() {
                return Err(invalid("sequence name must be non-empty".into()));
            }
            if sequence.artifacts.iter().any(|a| a.is_empty()) {
                return Err(at("has an empty artifact path"));
            }
            for step in &sequence.steps {
                if step.step_type.is_empty() {
                    return Err(at("has a step without type"));
                }
                if step.id.as_deref() == Some("") {
                    return Err(at("has a step with an empty id"));
                }
                if step.error.as_deref() == Some("") {
                    return Err(at("has a step with an empty error"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> RunReport {
        RunReport {
            schema_version: SchemaVersion::V1,
            scenario: "basic".into(),
            started_at: "2024-01-01T00:00:00.000Z".into(),
            finished_at: "2024-01-01T00:00:01.000Z".into(),
            status: RunStatus::Passed,
            sequences: vec![SequenceResult {
                name: "login".into(),
                status: RunStatus::Passed,
                duration_ms: 12,
                steps: vec![StepResult {
                    id: None,
                    step_type: "line".into(),
                    status: RunStatus::Passed,
                    duration_ms: 3,
                    error: None,
                }],
                artifacts: vec![],
            }],
        }
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(value["schemaVersion"], "v1");
        assert_eq!(value["status"], "passed");
        assert_eq!(value["sequences"][0]["durationMs"], 12);
        assert_eq!(value["sequences"][0]["steps"][0]["type"], "line");
        assert_eq!(value["sequences"][0]["steps"][0]["error"], json!(null));
        assert!(value["sequences"][0]["steps"][0].get("id").is_none());
    }

    #[test]
    fn test_validate_accepts_well_formed_report() {
        assert!(report().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_sequences() {
        let mut report = report();
        report.sequences.clear();
        assert!(matches!(report.validate(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_validate_rejects_empty_error_message() {
        let mut report = report();
        report.sequences[0].steps[0].error = Some(String::new());
        assert!(report.validate().is_err());
    }
}
