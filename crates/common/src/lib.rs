//! tuimuppet common library
//!
//! Document model (scenarios, sequences, macro files, steps), the run report
//! model, and the error taxonomy shared by the engine and the CLI.

pub mod defaults;
pub mod error;
pub mod index;
pub mod report;
pub mod step;
pub mod types;

pub use error::{Error, Result};
pub use report::{RunReport, RunStatus, SequenceResult, StepResult};
pub use step::{CaptureFormat, Matcher, Scope, Step, StepCommon, StepKind};
pub use types::*;

/// tuimuppet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
