//! Step and matcher definitions
//!
//! A [`Step`] is one scripted action or assertion. Steps are a closed sum type
//! ([`StepKind`]) plus a set of optional fields shared by every kind
//! ([`StepCommon`]). On the wire a step is a flat JSON object discriminated by
//! its `type` field:
//!
//! ```json
//! { "type": "waitFor", "contains": "Ready>", "timeoutMs": 5000 }
//! ```
//!
//! Deserialization only checks field typing. The refinements the documents
//! also require (non-empty strings, positive durations, matcher completeness)
//! are checked by [`Step::validate`]; [`Step::from_value`] does both.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Literal-or-regex condition evaluated against captured text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_flags: Option<String>,
}

impl Matcher {
    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            contains: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            regex: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.regex_flags = Some(flags.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.check().map_err(Error::schema)
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        non_empty(self.contains.as_deref(), "matcher contains")?;
        non_empty(self.regex.as_deref(), "matcher regex")?;
        if self.contains.is_none() && self.regex.is_none() {
            return Err("Matcher requires contains or regex".to_string());
        }
        Ok(())
    }

    /// Human-readable form used in failure messages
    pub fn describe(&self) -> String {
        match (&self.contains, &self.regex) {
            (Some(text), _) => format!("contains {:?}", text),
            (None, Some(pattern)) => {
                format!("regex /{}/{}", pattern, self.regex_flags.as_deref().unwrap_or(""))
            }
            (None, None) => "empty matcher".to_string(),
        }
    }
}

/// Text surface a step reads from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    #[default]
    Screen,
    Scrollback,
    Transcript,
    /// Screen and scrollback together; only meaningful for `capture`
    Both,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Screen => write!(f, "screen"),
            Scope::Scrollback => write!(f, "scrollback"),
            Scope::Transcript => write!(f, "transcript"),
            Scope::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureFormat {
    #[default]
    Text,
    Ansi,
    Json,
}

impl CaptureFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureFormat::Text => "txt",
            CaptureFormat::Ansi => "ansi",
            CaptureFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseAction {
    Move,
    Down,
    Up,
    Click,
    Drag,
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Modifier {
    Shift,
    Alt,
    Ctrl,
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollDirection {
    Up,
    Down,
    PageUp,
    PageDown,
    Top,
    Bottom,
}

/// Optional fields accepted by every step kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollback_lines: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captures_dir: Option<String>,
}

/// The step kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepKind {
    /// Type a line of text and submit it
    Line {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        submit_keys: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_type_ms: Option<u64>,
    },

    /// Space-separated key tokens
    SendKeys { keys: String },

    /// Key tokens as a list
    Keys { keys: Vec<String> },

    /// Literal text, bypassing line editing
    Paste { text: String },

    Sleep { ms: u64 },

    Resize { cols: u16, rows: u16 },

    WaitFor {
        #[serde(flatten)]
        matcher: Matcher,
    },

    WaitForNot {
        #[serde(flatten)]
        matcher: Matcher,
    },

    Expect {
        #[serde(flatten)]
        matcher: Matcher,
    },

    ExpectCount {
        #[serde(flatten)]
        matcher: Matcher,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equals: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_least: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_most: Option<usize>,
    },

    WaitForExit {},

    Capture {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<CaptureFormat>,
    },

    /// Wait until the rendered screen stops changing for `stable_ms`
    WaitForStable { stable_ms: u64 },

    Macro {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Map<String, Value>>,
    },

    Mouse {
        action: MouseAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<MouseButton>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modifiers: Option<Vec<Modifier>>,
    },

    Scroll {
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u32>,
    },
}

impl StepKind {
    /// The `type` discriminator as written in documents
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Line { .. } => "line",
            StepKind::SendKeys { .. } => "sendKeys",
            StepKind::Keys { .. } => "keys",
            StepKind::Paste { .. } => "paste",
            StepKind::Sleep { .. } => "sleep",
            StepKind::Resize { .. } => "resize",
            StepKind::WaitFor { .. } => "waitFor",
            StepKind::WaitForNot { .. } => "waitForNot",
            StepKind::Expect { .. } => "expect",
            StepKind::ExpectCount { .. } => "expectCount",
            StepKind::WaitForExit {} => "waitForExit",
            StepKind::Capture { .. } => "capture",
            StepKind::WaitForStable { .. } => "waitForStable",
            StepKind::Macro { .. } => "macro",
            StepKind::Mouse { .. } => "mouse",
            StepKind::Scroll { .. } => "scroll",
        }
    }
}

/// One scripted action or assertion within a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub common: StepCommon,

    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            common: StepCommon::default(),
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.common.id = Some(id.into());
        self
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self::new(StepKind::Line {
            text: text.into(),
            submit_keys: None,
            post_type_ms: None,
        })
    }

    pub fn wait_for(matcher: Matcher) -> Self {
        Self::new(StepKind::WaitFor { matcher })
    }

    pub fn expect(matcher: Matcher) -> Self {
        Self::new(StepKind::Expect { matcher })
    }

    pub fn invoke(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::new(StepKind::Macro {
            name: name.into(),
            args: Some(args),
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Parse a step from a JSON value and check its structural invariants
    pub fn from_value(value: Value) -> Result<Self> {
        let step: Step = serde_json::from_value(value)
            .map_err(|e| Error::schema(format!("invalid step: {}", e)))?;
        step.validate()?;
        Ok(step)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Check the refinements that field typing alone cannot express
    pub fn validate(&self) -> Result<()> {
        let ty = self.type_name();
        let at = |msg: &str| Error::schema(format!("{} step: {}", ty, msg));

        let common = &self.common;
        non_empty(common.id.as_deref(), "id").map_err(|e| at(&e))?;
        non_empty(common.description.as_deref(), "description").map_err(|e| at(&e))?;
        non_empty(common.captures_dir.as_deref(), "capturesDir").map_err(|e| at(&e))?;
        if common.timeout_ms == Some(0) {
            return Err(at("timeoutMs must be positive"));
        }
        if common.poll_ms == Some(0) {
            return Err(at("pollMs must be positive"));
        }
        if common.scrollback_lines == Some(0) {
            return Err(at("scrollbackLines must be positive"));
        }
        if common.scope == Some(Scope::Both) && !matches!(self.kind, StepKind::Capture { .. }) {
            return Err(at("scope 'both' is only valid for capture"));
        }

        match &self.kind {
            StepKind::Line { submit_keys, .. } => {
                if let Some(keys) = submit_keys {
                    if keys.iter().any(|k| k.is_empty()) {
                        return Err(at("submitKeys entries must be non-empty"));
                    }
                }
            }
            StepKind::SendKeys { keys } => {
                if keys.is_empty() {
                    return Err(at("keys must be non-empty"));
                }
            }
            StepKind::Keys { keys } => {
                if keys.is_empty() || keys.iter().any(|k| k.is_empty()) {
                    return Err(at("keys must be a non-empty list of non-empty tokens"));
                }
            }
            StepKind::Resize { cols, rows } => {
                if *cols == 0 || *rows == 0 {
                    return Err(at("cols and rows must be positive"));
                }
            }
            StepKind::WaitFor { matcher }
            | StepKind::WaitForNot { matcher }
            | StepKind::Expect { matcher } => {
                matcher.check().map_err(|e| at(&e))?;
            }
            StepKind::ExpectCount {
                matcher,
                equals,
                at_least,
                at_most,
            } => {
                matcher.check().map_err(|e| at(&e))?;
                if equals.is_none() && at_least.is_none() && at_most.is_none() {
                    return Err(at("expectCount requires equals, atLeast, or atMost"));
                }
            }
            StepKind::Capture { name, .. } => {
                non_empty(name.as_deref(), "name").map_err(|e| at(&e))?;
            }
            StepKind::WaitForStable { stable_ms } => {
                if *stable_ms == 0 {
                    return Err(at("stableMs must be positive"));
                }
            }
            StepKind::Macro { name, .. } => {
                if name.is_empty() {
                    return Err(at("name must be non-empty"));
                }
            }
            StepKind::Mouse {
                action,
                button,
                x,
                y,
                delta,
                ..
            } => {
                let needs_coords = matches!(action, MouseAction::Move | MouseAction::Drag);
                let needs_button = matches!(
                    action,
                    MouseAction::Down | MouseAction::Up | MouseAction::Click | MouseAction::Drag
                );
                if needs_coords && (x.is_none() || y.is_none()) {
                    return Err(at("mouse action requires x and y"));
                }
                if needs_button && button.is_none() {
                    return Err(at("mouse action requires button"));
                }
                if *action == MouseAction::Wheel && delta.is_none() {
                    return Err(at("mouse wheel requires delta"));
                }
            }
            StepKind::Scroll { amount, .. } => {
                if *amount == Some(0) {
                    return Err(at("amount must be positive"));
                }
            }
            StepKind::Paste { .. } | StepKind::Sleep { .. } | StepKind::WaitForExit {} => {}
        }

        Ok(())
    }
}

pub(crate) fn non_empty(value: Option<&str>, field: &str) -> std::result::Result<(), String> {
    match value {
        Some("") => Err(format!("{} must be non-empty", field)),
        _ => Ok(()),
    }
}
