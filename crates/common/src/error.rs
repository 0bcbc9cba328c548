//! Error types for tuimuppet

use thiserror::Error;

/// Result type alias using the tuimuppet Error
pub type Result<T> = std::result::Result<T, Error>;

/// tuimuppet error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema validation failed: {0}")]
    Schema(String),

    #[error("Macro \"{0}\" not found")]
    MacroNotFound(String),

    #[error("Macro cycle detected: {}", chain.join(" -> "))]
    MacroCycle { chain: Vec<String> },

    #[error("Scenario references missing sequence: {0}")]
    SequenceReference(String),

    #[error("{kind} contains duplicate names: {}", names.join(", "))]
    DuplicateName { kind: String, names: Vec<String> },

    #[error("Timed out after {timeout_ms}ms waiting for {matcher}")]
    MatchTimeout { matcher: String, timeout_ms: u64 },

    #[error("Expectation failed: {0}")]
    Expectation(String),

    #[error("Step type '{step_type}' is not supported by the {backend} backend")]
    UnsupportedStep { step_type: String, backend: String },

    #[error("Process lifecycle error: {0}")]
    ProcessLifecycle(String),

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Error::ProcessLifecycle(msg.into())
    }

    pub fn unsupported(step_type: impl Into<String>, backend: impl Into<String>) -> Self {
        Error::UnsupportedStep {
            step_type: step_type.into(),
            backend: backend.into(),
        }
    }

    /// Message without the variant prefix, for re-wrapping nested schema errors
    pub fn detail(&self) -> String {
        match self {
            Error::Schema(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Errors that are detected before any process is launched and abort the run.
    pub fn is_pre_run(&self) -> bool {
        matches!(
            self,
            Error::Schema(_)
                | Error::MacroNotFound(_)
                | Error::MacroCycle { .. }
                | Error::SequenceReference(_)
                | Error::DuplicateName { .. }
        )
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidRegex(e.to_string())
    }
}
