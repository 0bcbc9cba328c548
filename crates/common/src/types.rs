//! Scenario, sequence and macro documents

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::step::{non_empty, Matcher, Step};

/// Document schema version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
}

/// Which backend drives the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Tmux,
    Pty,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Tmux => write!(f, "tmux"),
            BackendKind::Pty => write!(f, "pty"),
        }
    }
}

/// How to start the target process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    pub backend: BackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,

    /// Deadline for the process to report running and for the ready matcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_matcher: Option<Matcher>,
}

/// Scenario-level timing defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollback_lines: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_type_ms: Option<u64>,
}

/// Where run artifacts go
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSettings {
    /// `"stdout"` or a file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captures_dir: Option<PathBuf>,

    #[serde(default)]
    pub redact: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redact_patterns: Vec<String>,
}

/// Top-level run definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub schema_version: SchemaVersion,

    pub name: String,

    pub launch: LaunchSpec,

    #[serde(default)]
    pub defaults: ScenarioDefaults,

    #[serde(default)]
    pub artifacts: ArtifactSettings,

    pub sequence_order: Vec<String>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let scenario: Scenario = serde_json::from_value(value)
            .map_err(|e| Error::schema(format!("invalid scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        let at = |msg: String| Error::schema(format!("scenario {:?}: {}", self.name, msg));

        if self.name.is_empty() {
            return Err(Error::schema("scenario name must be non-empty"));
        }
        if self.launch.command.is_empty() {
            return Err(at("launch.command must be non-empty".into()));
        }
        if self.launch.cols == Some(0) || self.launch.rows == Some(0) {
            return Err(at("launch.cols and launch.rows must be positive".into()));
        }
        if self.launch.startup_timeout_ms == Some(0) {
            return Err(at("launch.startupTimeoutMs must be positive".into()));
        }
        if let Some(matcher) = &self.launch.ready_matcher {
            matcher.check().map_err(|e| at(format!("launch.readyMatcher: {}", e)))?;
        }

        let defaults = &self.defaults;
        if defaults.wait_timeout_ms == Some(0)
            || defaults.poll_ms == Some(0)
            || defaults.scrollback_lines == Some(0)
        {
            return Err(at("defaults must be positive".into()));
        }

        non_empty(self.artifacts.report.as_deref(), "artifacts.report").map_err(at)?;
        if self.artifacts.redact_patterns.iter().any(|p| p.is_empty()) {
            return Err(at("artifacts.redactPatterns entries must be non-empty".into()));
        }

        if self.sequence_order.is_empty() {
            return Err(at("sequenceOrder must be non-empty".into()));
        }
        if self.sequence_order.iter().any(|name| name.is_empty()) {
            return Err(at("sequenceOrder entries must be non-empty".into()));
        }
        Ok(())
    }
}

/// Named ordered list of steps, optionally gated by a readiness matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub schema_version: SchemaVersion,

    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure: Option<Matcher>,

    pub steps: Vec<Step>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            schema_version: SchemaVersion::V1,
            name: name.into(),
            prerequisites: Vec::new(),
            ensure: None,
            steps,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let sequence: Sequence = serde_json::from_value(value)
            .map_err(|e| Error::schema(format!("invalid sequence: {}", e)))?;
        sequence.validate()?;
        Ok(sequence)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::schema("sequence name must be non-empty"));
        }
        let at = |msg: String| Error::schema(format!("sequence {:?}: {}", self.name, msg));
        if self.prerequisites.iter().any(|p| p.is_empty()) {
            return Err(at("prerequisites entries must be non-empty".into()));
        }
        if let Some(matcher) = &self.ensure {
            matcher.check().map_err(|e| at(format!("ensure: {}", e)))?;
        }
        for (idx, step) in self.steps.iter().enumerate() {
            step.validate()
                .map_err(|e| at(format!("step {}: {}", idx + 1, e.detail())))?;
        }
        Ok(())
    }
}

/// Reusable step templates keyed by macro name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroFile {
    pub schema_version: SchemaVersion,

    pub macros: BTreeMap<String, Vec<Step>>,
}

impl MacroFile {
    pub fn new(macros: BTreeMap<String, Vec<Step>>) -> Self {
        Self {
            schema_version: SchemaVersion::V1,
            macros,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let file: MacroFile = serde_json::from_value(value)
            .map_err(|e| Error::schema(format!("invalid macro file: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, steps) in &self.macros {
            if name.is_empty() {
                return Err(Error::schema("macro names must be non-empty"));
            }
            for (idx, step) in steps.iter().enumerate() {
                step.validate().map_err(|e| {
                    Error::schema(format!("macro {:?} step {}: {}", name, idx + 1, e.detail()))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;
    use serde_json::json;

    fn scenario_json() -> Value {
        json!({
            "schemaVersion": "v1",
            "name": "basic",
            "launch": {
                "command": "./start.sh",
                "args": ["--plain"],
                "cwd": ".",
                "backend": "pty",
                "startupTimeoutMs": 2000,
                "readyMatcher": {"contains": "Ready"}
            },
            "defaults": {"waitTimeoutMs": 200, "pollMs": 10},
            "artifacts": {"report": "stdout", "redact": true, "redactPatterns": ["syn_[A-Za-z0-9]+"]},
            "sequenceOrder": ["login", "verify"]
        })
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_value(scenario_json()).unwrap();
        assert_eq!(scenario.name, "basic");
        assert_eq!(scenario.launch.backend, BackendKind::Pty);
        assert_eq!(scenario.launch.args, vec!["--plain".to_string()]);
        assert_eq!(scenario.defaults.wait_timeout_ms, Some(200));
        assert!(scenario.artifacts.redact);
        assert_eq!(scenario.sequence_order, vec!["login", "verify"]);
    }

    #[test]
    fn test_scenario_requires_sequence_order() {
        let mut value = scenario_json();
        value["sequenceOrder"] = json!([]);
        assert!(matches!(Scenario::from_value(value), Err(Error::Schema(_))));
    }

    #[test]
    fn test_scenario_rejects_other_schema_versions() {
        let mut value = scenario_json();
        value["schemaVersion"] = json!("v2");
        assert!(matches!(Scenario::from_value(value), Err(Error::Schema(_))));
    }

    #[test]
    fn test_scenario_rejects_incomplete_ready_matcher() {
        let mut value = scenario_json();
        value["launch"]["readyMatcher"] = json!({"regexFlags": "i"});
        assert!(matches!(Scenario::from_value(value), Err(Error::Schema(_))));
    }

    #[test]
    fn test_parse_sequence() {
        let sequence = Sequence::from_json(
            r#"{
                "schemaVersion": "v1",
                "name": "login",
                "ensure": {"contains": "Ready>"},
                "steps": [
                    {"type": "line", "text": "hello"},
                    {"type": "macro", "name": "login", "args": {"user": "alice"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(sequence.steps.len(), 2);
        assert!(matches!(sequence.steps[1].kind, StepKind::Macro { .. }));
    }

    #[test]
    fn test_sequence_reports_failing_step() {
        let err = Sequence::from_value(json!({
            "schemaVersion": "v1",
            "name": "broken",
            "steps": [{"type": "line", "text": "ok"}, {"type": "expect"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("step 2"), "{}", err);
    }

    #[test]
    fn test_parse_macro_file() {
        let file = MacroFile::from_value(json!({
            "schemaVersion": "v1",
            "macros": {
                "login": [
                    {"type": "waitFor", "contains": "Username:"},
                    {"type": "line", "text": "${user}"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(file.macros["login"].len(), 2);
    }
}
