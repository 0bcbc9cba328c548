//! Capture files and redaction

use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use tuimuppet_common::{ArtifactSettings, CaptureFormat, Result};

use crate::matcher::strip_ansi;

/// Replacement for redacted matches
pub const REDACTED: &str = "[REDACTED]";

/// Replaces secret-looking text in written captures
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<Regex>,
}

impl Redactor {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn redact(&self, text: &str) -> String {
        self.patterns.iter().fold(text.to_string(), |text, pattern| {
            pattern.replace_all(&text, REDACTED).into_owned()
        })
    }
}

/// Text captured by a `capture` step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub screen: Option<String>,
    pub scrollback: Option<String>,
    pub transcript: Option<String>,
}

impl Snapshot {
    fn parts(&self) -> impl Iterator<Item = (&'static str, &String)> {
        [
            ("screen", self.screen.as_ref()),
            ("scrollback", self.scrollback.as_ref()),
            ("transcript", self.transcript.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, part)| part.map(|p| (name, p)))
    }

    /// `text` strips escape sequences, `ansi` keeps the capture verbatim,
    /// `json` writes an object keyed by part
    pub fn render(&self, format: CaptureFormat) -> Result<String> {
        Ok(match format {
            CaptureFormat::Text => self
                .parts()
                .map(|(_, part)| strip_ansi(part))
                .collect::<Vec<_>>()
                .join("\n"),
            CaptureFormat::Ansi => self
                .parts()
                .map(|(_, part)| part.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            CaptureFormat::Json => {
                let object: Map<String, Value> = self
                    .parts()
                    .map(|(name, part)| (name.to_string(), Value::String(part.clone())))
                    .collect();
                serde_json::to_string_pretty(&Value::Object(object))?
            }
        })
    }
}

/// Writes capture files for one scenario
#[derive(Debug, Clone)]
pub struct CaptureWriter {
    scenario: String,
    dir: Option<PathBuf>,
    redactor: Option<Redactor>,
}

impl CaptureWriter {
    pub fn new(scenario: impl Into<String>, settings: &ArtifactSettings) -> Result<Self> {
        let redactor = if settings.redact {
            Some(Redactor::new(&settings.redact_patterns)?)
        } else {
            None
        };
        Ok(Self {
            scenario: scenario.into(),
            dir: settings.captures_dir.clone(),
            redactor,
        })
    }

    /// Replace the scenario's captures directory
    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.dir = Some(dir);
        self
    }

    /// Step directory, then the configured one
    pub fn target_dir(&self, step_dir: Option<&str>) -> Option<PathBuf> {
        step_dir.map(PathBuf::from).or_else(|| self.dir.clone())
    }

    /// Write a snapshot and return the file path
    pub fn write(
        &self,
        dir: &Path,
        sequence: &str,
        label: &str,
        format: CaptureFormat,
        snapshot: &Snapshot,
    ) -> Result<PathBuf> {
        let mut content = snapshot.render(format)?;
        if let Some(redactor) = &self.redactor {
            content = redactor.redact(&content);
        }

        std::fs::create_dir_all(dir)?;
        let file_name = format!(
            "{}-{}-{}.{}",
            sanitize(&self.scenario),
            sanitize(sequence),
            sanitize(label),
            format.extension()
        );
        let path = dir.join(file_name);
        std::fs::write(&path, content)?;

        info!("Capture written to: {}", path.display());
        Ok(path)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
