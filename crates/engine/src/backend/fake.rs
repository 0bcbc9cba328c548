//! In-memory backend with a scripted screen, used to test the engine
//! without a real process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use tuimuppet_common::{Error, Result};

const FAKE_PID: u32 = 1234;

type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    running: bool,
    screen: String,
    scrollback: String,
    transcript: String,
    size: (u16, u16),
    launches: Vec<(String, Vec<String>)>,
    sent_keys: Vec<String>,
    sent_text: Vec<String>,
    sent_lines: Vec<String>,
    pasted: Vec<String>,
    destroy_calls: usize,
}

/// Scripted backend. Clones share state, so a test can keep a handle and
/// change the screen while the engine is running.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    exit_after_keys: Vec<String>,
    exit_after_lines: Vec<String>,
    exit_after_paste: Vec<String>,
    fail_launch: bool,
    responder: Option<Responder>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(self, screen: impl Into<String>) -> Self {
        self.state.lock().screen = screen.into();
        self
    }

    pub fn with_scrollback(self, scrollback: impl Into<String>) -> Self {
        self.state.lock().scrollback = scrollback.into();
        self
    }

    /// Simulate exit once this space-joined key sequence is sent
    pub fn exit_after_keys(mut self, keys: impl Into<String>) -> Self {
        self.exit_after_keys.push(keys.into());
        self
    }

    pub fn exit_after_line(mut self, line: impl Into<String>) -> Self {
        self.exit_after_lines.push(line.into());
        self
    }

    pub fn exit_after_paste(mut self, text: impl Into<String>) -> Self {
        self.exit_after_paste.push(text.into());
        self
    }

    /// Make `launch` fail with a lifecycle error
    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Print the responder's output after every submitted line
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    pub fn set_screen(&self, screen: impl Into<String>) {
        self.state.lock().screen = screen.into();
    }

    pub fn set_scrollback(&self, scrollback: impl Into<String>) {
        self.state.lock().scrollback = scrollback.into();
    }

    /// Simulate the target exiting on its own
    pub fn exit(&self) {
        self.state.lock().running = false;
    }

    pub fn launches(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().launches.clone()
    }

    pub fn sent_keys(&self) -> Vec<String> {
        self.state.lock().sent_keys.clone()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.state.lock().sent_text.clone()
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.state.lock().sent_lines.clone()
    }

    pub fn pasted(&self) -> Vec<String> {
        self.state.lock().pasted.clone()
    }

    pub fn size(&self) -> (u16, u16) {
        self.state.lock().size
    }

    pub fn destroy_calls(&self) -> usize {
        self.state.lock().destroy_calls
    }

    fn print(state: &mut FakeState, text: &str) {
        if !state.screen.is_empty() {
            state.screen.push('\n');
        }
        state.screen.push_str(text);
        state.scrollback.push_str(text);
        state.scrollback.push('\n');
        state.transcript.push_str(text);
        state.transcript.push('\n');
    }
}

#[async_trait]
impl super::Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&mut self, command: &str, args: &[String], _cwd: Option<&Path>) -> Result<u32> {
        if self.fail_launch {
            return Err(Error::lifecycle(format!("failed to launch {}", command)));
        }
        let mut state = self.state.lock();
        state.launches.push((command.to_string(), args.to_vec()));
        state.running = true;
        Ok(FAKE_PID)
    }

    async fn is_running(&mut self, _pid: u32) -> Result<bool> {
        Ok(self.state.lock().running)
    }

    async fn send_keys(&mut self, keys: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        state.sent_keys.extend(keys.iter().cloned());
        if self.exit_after_keys.contains(&keys.join(" ")) {
            state.running = false;
        }
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.state.lock().sent_text.push(text.to_string());
        Ok(())
    }

    async fn send_line(&mut self, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.sent_lines.push(text.to_string());
        Self::print(&mut state, text);
        if let Some(reply) = self.responder.as_ref().and_then(|r| (**r)(text)) {
            Self::print(&mut state, &reply);
        }
        if self.exit_after_lines.iter().any(|l| l == text) {
            state.running = false;
        }
        Ok(())
    }

    async fn paste(&mut self, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.pasted.push(text.to_string());
        Self::print(&mut state, text);
        if self.exit_after_paste.iter().any(|p| p == text) {
            state.running = false;
        }
        Ok(())
    }

    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.state.lock().size = (cols, rows);
        Ok(())
    }

    async fn capture_screen(&mut self) -> Result<String> {
        Ok(self.state.lock().screen.clone())
    }

    async fn capture_scrollback(&mut self, lines: usize) -> Result<String> {
        let state = self.state.lock();
        let entries: Vec<&str> = state.scrollback.lines().filter(|l| !l.is_empty()).collect();
        let start = entries.len().saturating_sub(lines);
        Ok(entries[start..].join("\n"))
    }

    async fn capture_transcript(&mut self) -> Result<String> {
        Ok(self.state.lock().transcript.clone())
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.state.lock().running {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::MatchTimeout {
                    matcher: "process exit".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    fn stability_sample(&self) -> Duration {
        Duration::from_millis(5)
    }

    async fn destroy(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.destroy_calls += 1;
        state.running = false;
        Ok(())
    }
}
