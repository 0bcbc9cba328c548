//! Pseudo-terminal backend
//!
//! The target runs attached to a pty. A reader thread feeds its output into an
//! embedded terminal emulator (alacritty_terminal) and a bounded transcript.
//! A writer thread owns the pty master and serializes everything written to
//! the child: scripted input, resizes, and the emulator's own replies to
//! terminal queries (cursor position reports, device attributes). Line
//! editors often stall until those replies arrive. Replies are dropped once
//! the child is known to have exited.

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::{Config as TermConfig, Term, TermMode};
use alacritty_terminal::vte::ansi::{Processor, StdSyncHandler};
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use tuimuppet_common::defaults;
use tuimuppet_common::{Error, Result};

use super::{Backend, BackendOptions};
use crate::stability::StabilityTracker;

pub mod keys;
pub mod transcript;

use transcript::Transcript;

const READ_BUFFER: usize = 4096;
const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";

enum PtyCommand {
    Data(Vec<u8>),
    Resize(u16, u16),
    Shutdown,
}

/// Forwards the emulator's replies to the child until it has exited
#[derive(Clone)]
struct ResponseForwarder {
    input: mpsc::Sender<PtyCommand>,
    exited: Arc<AtomicBool>,
}

impl EventListener for ResponseForwarder {
    fn send_event(&self, event: Event) {
        if let Event::PtyWrite(text) = event {
            if self.exited.load(Ordering::Acquire) {
                trace!("Child exited, dropping terminal reply {:?}", text);
                return;
            }
            trace!("Forwarding terminal reply {:?}", text);
            let _ = self.input.send(PtyCommand::Data(text.into_bytes()));
        }
    }
}

#[derive(Clone, Copy)]
struct TermSize {
    cols: usize,
    rows: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.rows
    }

    fn screen_lines(&self) -> usize {
        self.rows
    }

    fn columns(&self) -> usize {
        self.cols
    }
}

type Emulator = Term<ResponseForwarder>;

/// Everything owned by one launched child
struct PtySession {
    child: Box<dyn Child + Send + Sync>,
    pid: u32,
    term: Arc<Mutex<Emulator>>,
    transcript: Arc<Mutex<Transcript>>,
    exited: Arc<AtomicBool>,
    input: mpsc::Sender<PtyCommand>,
    closed: bool,
}

impl PtySession {
    fn send(&self, bytes: Vec<u8>) -> Result<()> {
        if self.exited.load(Ordering::Acquire) {
            return Err(Error::lifecycle(format!("process {} has exited", self.pid)));
        }
        self.input
            .send(PtyCommand::Data(bytes))
            .map_err(|_| Error::lifecycle("pty writer has stopped"))
    }

    /// Poll the child without blocking; records exit in the shared flag
    fn poll_exit(&mut self) -> Result<bool> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                if !self.exited.swap(true, Ordering::AcqRel) {
                    info!("Process {} exited ({:?})", self.pid, status);
                }
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(Error::lifecycle(format!("Failed to poll process {}: {}", self.pid, e))),
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let running = matches!(self.child.try_wait(), Ok(None));
        self.exited.store(true, Ordering::Release);
        if running {
            debug!("Killing process {}", self.pid);
            if let Err(e) = self.child.kill() {
                debug!("Ignoring kill failure for {}: {}", self.pid, e);
            }
        }
        // The child leads its own session; take the rest of its group with it
        let _ = killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL);
        let _ = self.input.send(PtyCommand::Shutdown);
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct PtyBackend {
    options: BackendOptions,
    session: Option<PtySession>,
}

impl PtyBackend {
    pub fn new(options: BackendOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut PtySession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::lifecycle("pty process not started"))
    }

    /// Full history plus screen, trailing blank lines removed
    fn render_history(term: &Emulator) -> Vec<String> {
        let grid = term.grid();
        let history = grid.history_size() as i32;
        let screen = grid.screen_lines() as i32;
        let mut rows: Vec<String> = (-history..screen)
            .map(|line| render_line(term, line))
            .collect();
        trim_trailing_blank(&mut rows);
        rows
    }

    fn render_screen(term: &Emulator) -> String {
        let screen = term.grid().screen_lines() as i32;
        let mut rows: Vec<String> = (0..screen).map(|line| render_line(term, line)).collect();
        trim_trailing_blank(&mut rows);
        rows.join("\n")
    }
}

fn render_line(term: &Emulator, line: i32) -> String {
    let grid = term.grid();
    let row = &grid[Line(line)];
    let mut text = String::with_capacity(grid.columns());
    for col in 0..grid.columns() {
        let cell = &row[Column(col)];
        if cell
            .flags
            .intersects(Flags::WIDE_CHAR_SPACER | Flags::LEADING_WIDE_CHAR_SPACER)
        {
            continue;
        }
        text.push(cell.c);
        if let Some(extra) = cell.zerowidth() {
            text.extend(extra.iter());
        }
    }
    text.trim_end().to_string()
}

fn trim_trailing_blank(rows: &mut Vec<String>) {
    while rows.last().map_or(false, |row| row.is_empty()) {
        rows.pop();
    }
}

/// Hash of the visible grid and cursor position
fn screen_hash(term: &Emulator) -> String {
    let grid = term.grid();
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4];
    for line in 0..grid.screen_lines() as i32 {
        let row = &grid[Line(line)];
        for col in 0..grid.columns() {
            hasher.update(row[Column(col)].c.encode_utf8(&mut buf).as_bytes());
        }
    }
    let cursor = grid.cursor.point;
    hasher.update(cursor.line.0.to_le_bytes());
    hasher.update((cursor.column.0 as u64).to_le_bytes());
    hex::encode(hasher.finalize())
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    term: Arc<Mutex<Emulator>>,
    transcript: Arc<Mutex<Transcript>>,
    exited: Arc<AtomicBool>,
) {
    let mut processor = Processor::<StdSyncHandler>::new();
    let mut buf = [0u8; READ_BUFFER];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                transcript.lock().append(&buf[..n]);
                let mut term = term.lock();
                processor.advance(&mut *term, &buf[..n]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // EIO once the slave side is closed
            Err(e) => {
                debug!("pty read ended: {}", e);
                break;
            }
        }
    }
    exited.store(true, Ordering::Release);
    debug!("pty reader thread exited");
}

fn write_loop(
    mut writer: Box<dyn Write + Send>,
    master: Box<dyn MasterPty + Send>,
    commands: mpsc::Receiver<PtyCommand>,
) {
    while let Ok(command) = commands.recv() {
        match command {
            PtyCommand::Data(bytes) => {
                if let Err(e) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
                    debug!("pty write failed: {}", e);
                    break;
                }
            }
            PtyCommand::Resize(cols, rows) => {
                if let Err(e) = master.resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                }) {
                    warn!("pty resize to {}x{} failed: {}", cols, rows, e);
                }
            }
            PtyCommand::Shutdown => break,
        }
    }
    debug!("pty writer thread exited");
}

fn lifecycle(context: &str, err: impl std::fmt::Display) -> Error {
    Error::lifecycle(format!("{}: {}", context, err))
}

#[async_trait]
impl Backend for PtyBackend {
    fn name(&self) -> &'static str {
        "pty"
    }

    async fn launch(&mut self, command: &str, args: &[String], cwd: Option<&Path>) -> Result<u32> {
        if let Some(mut previous) = self.session.take() {
            previous.shutdown();
        }

        let (cols, rows) = (self.options.cols, self.options.rows);
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| lifecycle("Failed to open pty", e))?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| lifecycle(&format!("Failed to spawn {}", command), e))?;
        drop(pair.slave);

        let pid = child
            .process_id()
            .ok_or_else(|| Error::lifecycle(format!("No pid for spawned {}", command)))?;

        let master = pair.master;
        let reader = master
            .try_clone_reader()
            .map_err(|e| lifecycle("Failed to clone pty reader", e))?;
        let writer = master
            .take_writer()
            .map_err(|e| lifecycle("Failed to take pty writer", e))?;

        let (input, commands) = mpsc::channel();
        let exited = Arc::new(AtomicBool::new(false));
        let forwarder = ResponseForwarder {
            input: input.clone(),
            exited: exited.clone(),
        };
        let config = TermConfig {
            scrolling_history: self.options.scrollback_lines,
            ..TermConfig::default()
        };
        let size = TermSize {
            cols: cols as usize,
            rows: rows as usize,
        };
        let term = Arc::new(Mutex::new(Term::new(config, &size, forwarder)));
        let transcript = Arc::new(Mutex::new(Transcript::new(
            self.options.transcript_limit_bytes,
            self.options.transcript_retain_bytes,
        )));

        // Hand ownership to the session first so a failed thread spawn still kills the child
        let session = PtySession {
            child,
            pid,
            term: term.clone(),
            transcript: transcript.clone(),
            exited: exited.clone(),
            input,
            closed: false,
        };

        std::thread::Builder::new()
            .name(format!("pty-writer-{}", pid))
            .spawn(move || write_loop(writer, master, commands))?;
        std::thread::Builder::new()
            .name(format!("pty-reader-{}", pid))
            .spawn(move || read_loop(reader, term, transcript, exited))?;

        info!("Spawned {} (pid {}) on a {}x{} pty", command, pid, cols, rows);
        self.session = Some(session);
        Ok(pid)
    }

    async fn is_running(&mut self, pid: u32) -> Result<bool> {
        let session = self.session()?;
        if session.pid != pid {
            return Ok(false);
        }
        Ok(!session.poll_exit()?)
    }

    async fn send_keys(&mut self, keys: &[String]) -> Result<()> {
        let session = self.session()?;
        for key in keys {
            session.send(keys::encode(key))?;
        }
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.session()?.send(text.as_bytes().to_vec())
    }

    async fn paste(&mut self, text: &str) -> Result<()> {
        let session = self.session()?;
        let bracketed = session.term.lock().mode().contains(TermMode::BRACKETED_PASTE);
        let mut bytes = Vec::with_capacity(text.len() + 12);
        if bracketed {
            bytes.extend_from_slice(BRACKETED_PASTE_START);
        }
        bytes.extend_from_slice(text.as_bytes());
        if bracketed {
            bytes.extend_from_slice(BRACKETED_PASTE_END);
        }
        session.send(bytes)
    }

    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let session = self.session()?;
        session.term.lock().resize(TermSize {
            cols: cols as usize,
            rows: rows as usize,
        });
        session
            .input
            .send(PtyCommand::Resize(cols, rows))
            .map_err(|_| Error::lifecycle("pty writer has stopped"))
    }

    async fn capture_screen(&mut self) -> Result<String> {
        let session = self.session()?;
        let term = session.term.lock();
        Ok(Self::render_screen(&term))
    }

    async fn capture_scrollback(&mut self, lines: usize) -> Result<String> {
        let session = self.session()?;
        let rows = Self::render_history(&session.term.lock());
        let start = rows.len().saturating_sub(lines);
        Ok(rows[start..].join("\n"))
    }

    async fn capture_transcript(&mut self) -> Result<String> {
        let session = self.session()?;
        let text = session.transcript.lock().text();
        Ok(text)
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.session()?.poll_exit()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::MatchTimeout {
                    matcher: "process exit".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(Duration::from_millis(defaults::PROCESS_POLL_MS)).await;
        }
    }

    fn stability_sample(&self) -> Duration {
        Duration::from_millis(self.options.stability_sample_ms)
    }

    async fn wait_for_stable(&mut self, stable_for: Duration, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let sample = self.stability_sample();
        let mut tracker = StabilityTracker::new();

        loop {
            let hash = {
                let session = self.session()?;
                let term = session.term.lock();
                screen_hash(&term)
            };
            let now = Instant::now();
            if tracker.observe_hash(hash, now) >= stable_for {
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

    async fn destroy(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
            debug!(
                "Destroyed pty session for pid {} ({} transcript bytes)",
                session.pid,
                session.transcript.lock().len()
            );
        }
        Ok(())
    }
}
