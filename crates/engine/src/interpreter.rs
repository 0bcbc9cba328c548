//! Step interpreter
//!
//! Dispatches each step to the backend. A step failure never escapes
//! [`Interpreter::run_step`]; it is recorded as a failed [`StepResult`].

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use tuimuppet_common::{Error, Matcher, Result, RunStatus, Scope, Step, StepKind, StepResult};

use crate::artifacts::{CaptureWriter, Snapshot};
use crate::backend::Backend;
use crate::matcher::{self, check_count, CompiledMatcher, Surface};
use crate::timing::Timing;

/// Runs steps of one sequence against a backend
pub struct Interpreter<'a> {
    backend: &'a mut dyn Backend,
    timing: &'a Timing,
    captures: &'a CaptureWriter,
    sequence: &'a str,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        backend: &'a mut dyn Backend,
        timing: &'a Timing,
        captures: &'a CaptureWriter,
        sequence: &'a str,
    ) -> Self {
        Self {
            backend,
            timing,
            captures,
            sequence,
        }
    }

    /// Execute one step. Capture paths are appended to `artifacts`.
    pub async fn run_step(
        &mut self,
        step: &Step,
        index: usize,
        artifacts: &mut Vec<String>,
    ) -> StepResult {
        let start = Instant::now();
        let outcome = self.execute(step, index, artifacts).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (status, error) = match outcome {
            Ok(()) => {
                debug!("  ✓ {} ({}ms)", label(step, index), duration_ms);
                (RunStatus::Passed, None)
            }
            Err(e) => {
                warn!("  ✗ {}: {}", label(step, index), e);
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        StepResult {
            id: step.common.id.clone(),
            step_type: step.type_name().to_string(),
            status,
            duration_ms,
            error,
        }
    }

    async fn execute(
        &mut self,
        step: &Step,
        index: usize,
        artifacts: &mut Vec<String>,
    ) -> Result<()> {
        let timing = self.timing.for_step(&step.common);
        let scope = step.common.scope.unwrap_or_default();
        let surface = Surface::from_scope(scope, timing.scrollback_lines);

        match &step.kind {
            StepKind::Line {
                text,
                submit_keys,
                post_type_ms,
            } => {
                match submit_keys {
                    Some(keys) => {
                        self.backend.send_text(text).await?;
                        self.backend.send_keys(keys).await?;
                    }
                    None => self.backend.send_line(text).await?,
                }
                let delay = post_type_ms.map(Duration::from_millis).unwrap_or(timing.post_type);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            StepKind::SendKeys { keys } => {
                let tokens: Vec<String> = keys.split(' ').map(str::to_string).collect();
                self.backend.send_keys(&tokens).await?;
            }
            StepKind::Keys { keys } => self.backend.send_keys(keys).await?,
            StepKind::Paste { text } => self.backend.paste(text).await?,
            StepKind::Sleep { ms } => sleep(Duration::from_millis(*ms)).await,
            StepKind::Resize { cols, rows } => self.backend.resize(*cols, *rows).await?,
            StepKind::WaitFor { matcher } => self.wait(matcher, surface, false, &timing).await?,
            StepKind::WaitForNot { matcher } => self.wait(matcher, surface, true, &timing).await?,
            StepKind::Expect { matcher } => {
                let compiled = CompiledMatcher::compile(matcher)?;
                let text = matcher::read_surface(&mut *self.backend, surface).await?;
                if !compiled.is_match(&text) {
                    return Err(Error::Expectation(format!(
                        "{} not found on {}",
                        compiled.describe(),
                        scope
                    )));
                }
            }
            StepKind::ExpectCount {
                matcher,
                equals,
                at_least,
                at_most,
            } => {
                let compiled = CompiledMatcher::compile(matcher)?;
                let text = matcher::read_surface(&mut *self.backend, surface).await?;
                check_count(
                    compiled.count(&text),
                    *equals,
                    *at_least,
                    *at_most,
                    compiled.describe(),
                )?;
            }
            StepKind::WaitForExit {} => self.backend.wait_for_exit(timing.wait_timeout).await?,
            StepKind::Capture { name, format } => {
                let label = name
                    .clone()
                    .or_else(|| step.common.id.clone())
                    .unwrap_or_else(|| format!("step-{}", index + 1));
                let snapshot = self.snapshot(scope, timing.scrollback_lines).await?;
                if let Some(dir) = self.captures.target_dir(step.common.captures_dir.as_deref()) {
                    let path = self.captures.write(
                        &dir,
                        self.sequence,
                        &label,
                        format.unwrap_or_default(),
                        &snapshot,
                    )?;
                    artifacts.push(path.to_string_lossy().into_owned());
                } else {
                    debug!("No captures directory configured, discarding capture {}", label);
                }
            }
            StepKind::WaitForStable { stable_ms } => {
                self.backend
                    .wait_for_stable(Duration::from_millis(*stable_ms), timing.wait_timeout)
                    .await?
            }
            StepKind::Macro { .. } | StepKind::Mouse { .. } | StepKind::Scroll { .. } => {
                return Err(Error::unsupported(step.type_name(), self.backend.name()));
            }
        }
        Ok(())
    }

    async fn wait(
        &mut self,
        matcher: &Matcher,
        surface: Surface,
        negated: bool,
        timing: &Timing,
    ) -> Result<()> {
        let compiled = CompiledMatcher::compile(matcher)?;
        matcher::wait_for(
            &mut *self.backend,
            &compiled,
            surface,
            negated,
            timing.wait_timeout,
            timing.poll,
        )
        .await
    }

    async fn snapshot(&mut self, scope: Scope, scrollback_lines: usize) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        if matches!(scope, Scope::Screen | Scope::Both) {
            snapshot.screen = Some(self.backend.capture_screen().await?);
        }
        if matches!(scope, Scope::Scrollback | Scope::Both) {
            snapshot.scrollback = Some(self.backend.capture_scrollback(scrollback_lines).await?);
        }
        if scope == Scope::Transcript {
            snapshot.transcript = Some(self.backend.capture_transcript().await?);
        }
        Ok(snapshot)
    }
}

fn label(step: &Step, index: usize) -> String {
    match &step.common.id {
        Some(id) => format!("{} [{}]", step.type_name(), id),
        None => format!("{} #{}", step.type_name(), index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;
    use serde_json::json;
    use tempfile::TempDir;
    use tuimuppet_common::ArtifactSettings;

    fn step(value: serde_json::Value) -> Step {
        Step::from_value(value).unwrap()
    }

    fn fast_timing() -> Timing {
        Timing {
            wait_timeout: Duration::from_millis(100),
            poll: Duration::from_millis(10),
            ..Timing::default()
        }
    }

    async fn run(
        backend: &mut FakeBackend,
        captures: &CaptureWriter,
        step: &Step,
    ) -> (StepResult, Vec<String>) {
        let timing = fast_timing();
        let mut artifacts = Vec::new();
        let mut interpreter = Interpreter::new(backend, &timing, captures, "main");
        let result = interpreter.run_step(step, 0, &mut artifacts).await;
        (result, artifacts)
    }

    fn no_captures() -> CaptureWriter {
        CaptureWriter::new("demo", &ArtifactSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_line_uses_send_line() {
        let mut backend = FakeBackend::new();
        let (result, _) = run(&mut backend, &no_captures(), &Step::line("hello")).await;

        assert_eq!(result.status, RunStatus::Passed);
        assert_eq!(result.error, None);
        assert_eq!(backend.sent_lines(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_line_with_submit_keys() {
        let mut backend = FakeBackend::new();
        let step = step(json!({"type": "line", "text": "ls", "submitKeys": ["C-m"]}));
        run(&mut backend, &no_captures(), &step).await;

        assert_eq!(backend.sent_text(), vec!["ls".to_string()]);
        assert_eq!(backend.sent_keys(), vec!["C-m".to_string()]);
        assert!(backend.sent_lines().is_empty());
    }

    /// Rewrite the screen every 10ms for `ticks` ticks
    fn churn_screen(backend: &FakeBackend, ticks: usize) -> tokio::task::JoinHandle<()> {
        let handle = backend.clone();
        tokio::spawn(async move {
            for tick in 0..ticks {
                handle.set_screen(format!("frame {}", tick));
                sleep(Duration::from_millis(10)).await;
            }
        })
    }

    #[tokio::test]
    async fn test_wait_for_stable_times_out_on_busy_screen() {
        let mut backend = FakeBackend::new();
        let churn = churn_screen(&backend, 1000);
        let step = step(json!({"type": "waitForStable", "stableMs": 100, "timeoutMs": 300}));

        let (result, _) = run(&mut backend, &no_captures(), &step).await;
        churn.abort();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            result.error.as_deref(),
            Some("Timed out after 300ms waiting for screen stable for 100ms")
        );
    }

    #[tokio::test]
    async fn test_wait_for_stable_passes_once_screen_settles() {
        let mut backend = FakeBackend::new();
        let churn = churn_screen(&backend, 15);
        let step = step(json!({"type": "waitForStable", "stableMs": 100, "timeoutMs": 2000}));

        let (result, _) = run(&mut backend, &no_captures(), &step).await;
        churn.await.unwrap();

        assert_eq!(result.status, RunStatus::Passed, "{:?}", result.error);
        assert_eq!(backend.capture_screen().await.unwrap(), "frame 14");
    }

    #[tokio::test]
    async fn test_send_keys_splits_on_spaces() {
        let mut backend = FakeBackend::new();
        let step = step(json!({"type": "sendKeys", "keys": "Down Down Enter"}));
        run(&mut backend, &no_captures(), &step).await;

        assert_eq!(backend.sent_keys(), vec!["Down", "Down", "Enter"]);
    }

    #[tokio::test]
    async fn test_wait_for_timeout_names_matcher() {
        let mut backend = FakeBackend::new().with_screen("Booting...");
        let step = step(json!({"type": "waitFor", "contains": "Ready>", "id": "prompt"}));
        let (result, _) = run(&mut backend, &no_captures(), &step).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.id.as_deref(), Some("prompt"));
        assert_eq!(result.step_type, "waitFor");
        let error = result.error.unwrap();
        assert!(error.contains("contains \"Ready>\""), "{}", error);
        assert!(error.contains("100ms"), "{}", error);
    }

    #[tokio::test]
    async fn test_expect_reads_scrollback_scope() {
        let mut backend = FakeBackend::new()
            .with_screen("now")
            .with_scrollback("earlier\nnow");
        let on_screen = step(json!({"type": "expect", "contains": "earlier"}));
        let in_history =
            step(json!({"type": "expect", "contains": "earlier", "scope": "scrollback"}));

        let (result, _) = run(&mut backend, &no_captures(), &on_screen).await;
        assert_eq!(result.status, RunStatus::Failed);
        let (result, _) = run(&mut backend, &no_captures(), &in_history).await;
        assert_eq!(result.status, RunStatus::Passed);
    }

    #[tokio::test]
    async fn test_expect_count_bounds() {
        let mut backend = FakeBackend::new().with_screen("ok ok ok");
        let pass = step(json!({"type": "expectCount", "contains": "ok", "equals": 3}));
        let fail = step(json!({"type": "expectCount", "contains": "ok", "atMost": 2}));

        assert_eq!(run(&mut backend, &no_captures(), &pass).await.0.status, RunStatus::Passed);
        let (result, _) = run(&mut backend, &no_captures(), &fail).await;
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.error.unwrap().starts_with("Expectation failed"));
    }

    #[tokio::test]
    async fn test_mouse_and_scroll_are_unsupported() {
        let mut backend = FakeBackend::new();
        let mouse =
            step(json!({"type": "mouse", "action": "click", "button": "left", "x": 1, "y": 1}));
        let scroll = step(json!({"type": "scroll", "direction": "up"}));

        let (result, _) = run(&mut backend, &no_captures(), &mouse).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Step type 'mouse' is not supported by the fake backend")
        );
        let (result, _) = run(&mut backend, &no_captures(), &scroll).await;
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_capture_writes_artifact() {
        let dir = TempDir::new().unwrap();
        let settings = ArtifactSettings {
            captures_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let captures = CaptureWriter::new("demo", &settings).unwrap();
        let mut backend = FakeBackend::new().with_screen("Ready>");
        let step = step(json!({"type": "capture", "name": "prompt", "format": "json"}));

        let (result, artifacts) = run(&mut backend, &captures, &step).await;

        assert_eq!(result.status, RunStatus::Passed);
        let expected = dir.path().join("demo-main-prompt.json");
        assert_eq!(artifacts, vec![expected.to_string_lossy().into_owned()]);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(expected).unwrap()).unwrap();
        assert_eq!(written, json!({"screen": "Ready>"}));
    }

    #[tokio::test]
    async fn test_capture_without_directory_is_discarded() {
        let mut backend = FakeBackend::new().with_screen("Ready>");
        let step = step(json!({"type": "capture"}));
        let (result, artifacts) = run(&mut backend, &no_captures(), &step).await;

        assert_eq!(result.status, RunStatus::Passed);
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_transcript_scope() {
        let mut backend = FakeBackend::new();
        run(&mut backend, &no_captures(), &Step::line("hello")).await;

        let step = step(json!({"type": "waitFor", "contains": "hello", "scope": "transcript"}));
        let (result, _) = run(&mut backend, &no_captures(), &step).await;
        assert_eq!(result.status, RunStatus::Passed);
    }
}
