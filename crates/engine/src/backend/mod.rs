//! Backend contract
//!
//! A [`Backend`] owns exactly one target process and the text surface it
//! renders to. The engine calls it strictly one operation at a time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use tuimuppet_common::defaults;
use tuimuppet_common::{BackendKind, Error, LaunchSpec, Result};

use crate::stability::StabilityTracker;

pub mod fake;
pub mod pty;
pub mod tmux;

pub use fake::FakeBackend;
pub use pty::PtyBackend;
pub use tmux::TmuxBackend;

/// Driver for a single target process
#[async_trait]
pub trait Backend: Send {
    /// Short name used in error messages
    fn name(&self) -> &'static str;

    /// Start the target and return its pid
    async fn launch(&mut self, command: &str, args: &[String], cwd: Option<&Path>) -> Result<u32>;

    async fn is_running(&mut self, pid: u32) -> Result<bool>;

    /// Send key tokens such as `Enter`, `C-c` or `Up`
    async fn send_keys(&mut self, keys: &[String]) -> Result<()>;

    /// Type literal text without submitting it
    async fn send_text(&mut self, text: &str) -> Result<()>;

    async fn send_line(&mut self, text: &str) -> Result<()> {
        self.send_text(text).await?;
        self.send_keys(&["Enter".to_string()]).await
    }

    /// Inject text as a paste, bypassing line editing
    async fn paste(&mut self, text: &str) -> Result<()>;

    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;

    /// Currently rendered grid, control sequences stripped
    async fn capture_screen(&mut self) -> Result<String>;

    /// Last `lines` lines of history including the visible screen
    async fn capture_scrollback(&mut self, lines: usize) -> Result<String>;

    /// Raw output history with control sequences stripped
    async fn capture_transcript(&mut self) -> Result<String> {
        Err(Error::unsupported("transcript", self.name()))
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> Result<()>;

    /// Interval between screen samples when waiting for stability
    fn stability_sample(&self) -> Duration {
        Duration::from_millis(defaults::STABILITY_SAMPLE_MS)
    }

    /// Wait until the screen has not changed for `stable_for`
    async fn wait_for_stable(&mut self, stable_for: Duration, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let sample = self.stability_sample();
        let mut tracker = StabilityTracker::new();

        loop {
            let screen = self.capture_screen().await?;
            let now = Instant::now();
            if tracker.observe(screen.as_bytes(), now) >= stable_for {
                return Ok(());
            }
            if now >= deadline {
                return Err(Error::MatchTimeout {
                    matcher: format!("screen stable for {}ms", stable_for.as_millis()),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(sample.min(deadline - now)).await;
        }
    }

    /// Tear down the process or session. Idempotent and best-effort.
    async fn destroy(&mut self) -> Result<()>;
}

/// Construction options shared by the real backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// tmux binary; `TUIMUPPET_TMUX_BIN` or `/usr/bin/tmux` when unset
    pub tmux_bin: Option<PathBuf>,

    /// Prefix for tmux session names
    pub session_prefix: String,

    pub cols: u16,
    pub rows: u16,

    /// Transcript size that triggers trimming
    pub transcript_limit_bytes: usize,

    /// Bytes kept after trimming
    pub transcript_retain_bytes: usize,

    pub stability_sample_ms: u64,

    /// History kept by the terminal emulator
    pub scrollback_lines: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            tmux_bin: None,
            session_prefix: defaults::SESSION_PREFIX.to_string(),
            cols: defaults::TERMINAL_COLS,
            rows: defaults::TERMINAL_ROWS,
            transcript_limit_bytes: defaults::TRANSCRIPT_LIMIT_BYTES,
            transcript_retain_bytes: defaults::TRANSCRIPT_RETAIN_BYTES,
            stability_sample_ms: defaults::STABILITY_SAMPLE_MS,
            scrollback_lines: defaults::SCROLLBACK_LINES,
        }
    }
}

impl BackendOptions {
    /// Apply a launch spec's terminal size over these options
    pub fn for_launch(&self, launch: &LaunchSpec) -> Self {
        Self {
            cols: launch.cols.unwrap_or(self.cols),
            rows: launch.rows.unwrap_or(self.rows),
            ..self.clone()
        }
    }
}

/// Construct the backend named by a scenario's launch spec
pub fn build_backend(kind: BackendKind, options: &BackendOptions) -> Result<Box<dyn Backend>> {
    Ok(match kind {
        BackendKind::Tmux => Box::new(TmuxBackend::new(options.clone())?),
        BackendKind::Pty => Box::new(PtyBackend::new(options.clone())),
    })
}
