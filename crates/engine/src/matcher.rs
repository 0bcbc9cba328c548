//! Matcher engine
//!
//! Literal and regex matching over a captured text surface, plus the
//! cooperative poll loop used by `waitFor`, `waitForNot` and readiness checks.

use regex::{Regex, RegexBuilder};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

use tuimuppet_common::{Error, Matcher, Result, Scope};

use crate::backend::Backend;

/// A matcher with its pattern compiled
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    regex: Regex,
    description: String,
}

impl CompiledMatcher {
    /// Compile a matcher; `contains` wins when both forms are present
    pub fn compile(matcher: &Matcher) -> Result<Self> {
        let regex = match (&matcher.contains, &matcher.regex) {
            (Some(text), _) => Regex::new(&regex::escape(text))?,
            (None, Some(pattern)) => {
                let mut builder = RegexBuilder::new(pattern);
                for flag in matcher.regex_flags.as_deref().unwrap_or("").chars() {
                    match flag {
                        'i' => builder.case_insensitive(true),
                        'm' => builder.multi_line(true),
                        's' => builder.dot_matches_new_line(true),
                        'x' => builder.ignore_whitespace(true),
                        'u' => builder.unicode(true),
                        // global and sticky have no meaning here: counting always scans
                        'g' | 'y' => &mut builder,
                        other => {
                            return Err(Error::InvalidRegex(format!(
                                "unsupported regex flag '{}' in /{}/",
                                other, pattern
                            )))
                        }
                    };
                }
                builder.build()?
            }
            (None, None) => return Err(Error::schema("Matcher requires contains or regex")),
        };

        Ok(Self {
            regex,
            description: matcher.describe(),
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Number of non-overlapping matches
    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }

    pub fn describe(&self) -> &str {
        &self.description
    }
}

/// Check a match count against optional bounds
pub fn check_count(
    count: usize,
    equals: Option<usize>,
    at_least: Option<usize>,
    at_most: Option<usize>,
    description: &str,
) -> Result<()> {
    if let Some(expected) = equals {
        if count != expected {
            return Err(Error::Expectation(format!(
                "expected {} matches of {}, found {}",
                expected, description, count
            )));
        }
    }
    if let Some(min) = at_least {
        if count < min {
            return Err(Error::Expectation(format!(
                "expected at least {} matches of {}, found {}",
                min, description, count
            )));
        }
    }
    if let Some(max) = at_most {
        if count > max {
            return Err(Error::Expectation(format!(
                "expected at most {} matches of {}, found {}",
                max, description, count
            )));
        }
    }
    Ok(())
}

/// Where matcher text comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Screen,
    Scrollback(usize),
    Transcript,
}

impl Surface {
    /// `both` reads the scrollback window, which includes the visible screen
    pub fn from_scope(scope: Scope, scrollback_lines: usize) -> Self {
        match scope {
            Scope::Screen => Surface::Screen,
            Scope::Scrollback | Scope::Both => Surface::Scrollback(scrollback_lines),
            Scope::Transcript => Surface::Transcript,
        }
    }
}

pub async fn read_surface(backend: &mut dyn Backend, surface: Surface) -> Result<String> {
    match surface {
        Surface::Screen => backend.capture_screen().await,
        Surface::Scrollback(lines) => backend.capture_scrollback(lines).await,
        Surface::Transcript => backend.capture_transcript().await,
    }
}

/// Poll a surface until the matcher is present (or absent when `negated`).
///
/// The first check happens immediately so fast transitions are not missed.
pub async fn wait_for(
    backend: &mut dyn Backend,
    matcher: &CompiledMatcher,
    surface: Surface,
    negated: bool,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let text = read_surface(backend, surface).await?;
        if matcher.is_match(&text) != negated {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            let what = if negated {
                format!("absence of {}", matcher.describe())
            } else {
                matcher.describe().to_string()
            };
            return Err(Error::MatchTimeout {
                matcher: what,
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        trace!("{} not satisfied yet, polling again", matcher.describe());
        sleep(poll.min(deadline - now)).await;
    }
}

/// Remove ANSI escape sequences and stray control characters
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.next() {
                // CSI: parameters and intermediates up to a final byte in @..~
                Some('[') => {
                    for next in chars.by_ref() {
                        if ('@'..='~').contains(&next) {
                            break;
                        }
                    }
                }
                // OSC, DCS, SOS, PM, APC: terminated by BEL or ST
                Some(']') | Some('P') | Some('X') | Some('^') | Some('_') => {
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                // Charset designation takes one more character
                Some('(') | Some(')') | Some('*') | Some('+') => {
                    chars.next();
                }
                _ => {}
            },
            '\r' => {}
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}
