//! tmux session backend
//!
//! Runs the target inside a detached tmux session and drives it with tmux
//! sub-commands. Every tmux invocation is bounded by a timeout.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tuimuppet_common::defaults;
use tuimuppet_common::{Error, Result};

use super::{Backend, BackendOptions};

/// Environment variable overriding the tmux binary
pub const TMUX_BIN_ENV: &str = "TUIMUPPET_TMUX_BIN";

const DEFAULT_TMUX_BIN: &str = "/usr/bin/tmux";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_START_TIMEOUT: Duration = Duration::from_millis(1500);

pub struct TmuxBackend {
    tmux: PathBuf,
    options: BackendOptions,
    session: Option<String>,
    /// Sessions started by this instance, part of every session name
    launched: u64,
}

impl TmuxBackend {
    /// Resolve the tmux binary: options, then `TUIMUPPET_TMUX_BIN`, then `/usr/bin/tmux`
    pub fn new(options: BackendOptions) -> Result<Self> {
        let tmux = match &options.tmux_bin {
            Some(path) => path.clone(),
            None => std::env::var_os(TMUX_BIN_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TMUX_BIN)),
        };

        if !tmux.is_absolute() {
            return Err(Error::lifecycle(format!(
                "{} must be an absolute path, got {}",
                TMUX_BIN_ENV,
                tmux.display()
            )));
        }
        if !tmux.exists() {
            return Err(Error::lifecycle(format!("tmux binary not found at {}", tmux.display())));
        }

        Ok(Self {
            tmux,
            options,
            session: None,
            launched: 0,
        })
    }

    /// Name of the active session, if any
    pub fn session_name(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Timestamp, per-instance counter and a random suffix
    fn next_session_name(&mut self) -> String {
        let counter = self.launched;
        self.launched += 1;
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}_{:x}_{}_{}",
            self.options.session_prefix,
            chrono::Utc::now().timestamp_millis(),
            counter,
            &suffix[..8]
        )
    }

    fn active_session(&self) -> Result<String> {
        self.session
            .clone()
            .ok_or_else(|| Error::lifecycle("tmux session not started"))
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("tmux {}", args.join(" "));
        let mut command = Command::new(&self.tmux);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(COMMAND_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                Error::lifecycle(format!(
                    "tmux {} did not finish within {}s",
                    args.first().copied().unwrap_or(""),
                    COMMAND_TIMEOUT.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::lifecycle(if stderr.is_empty() {
                "tmux command failed".to_string()
            } else {
                stderr
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn wait_for_session(&self, session: &str) -> Result<()> {
        let deadline = Instant::now() + SESSION_START_TIMEOUT;
        loop {
            if self.run(&["has-session", "-t", session]).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::lifecycle(format!(
                    "Timed out waiting for tmux session {}",
                    session
                )));
            }
            sleep(Duration::from_millis(defaults::PROCESS_POLL_MS)).await;
        }
    }

    async fn start_session(
        &self,
        session: &str,
        command: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<u32> {
        let cols = self.options.cols.to_string();
        let rows = self.options.rows.to_string();
        let cwd = cwd.map(|p| p.to_string_lossy().into_owned());

        let mut tmux_args = vec![
            "new-session",
            "-d",
            "-s",
            session,
            "-x",
            cols.as_str(),
            "-y",
            rows.as_str(),
        ];
        if let Some(cwd) = &cwd {
            tmux_args.push("-c");
            tmux_args.push(cwd);
        }
        tmux_args.push(command);
        tmux_args.extend(args.iter().map(String::as_str));
        self.run(&tmux_args).await?;

        self.wait_for_session(session).await?;

        let output = self
            .run(&["display-message", "-p", "-t", session, "#{pane_pid}"])
            .await?;
        output
            .trim()
            .parse::<u32>()
            .map_err(|_| {
                Error::lifecycle(format!("Failed to read tmux pane pid from {:?}", output))
            })
    }

    /// tmux removes a session once its only pane exits, so any lookup
    /// failure on the session, its window or its pane means the target is gone
    fn session_gone(err: &Error) -> bool {
        let message = err.to_string();
        message.contains("can't find session")
            || message.contains("can't find window")
            || message.contains("can't find pane")
            || message.contains("no server running")
            || message.contains("session not found")
    }

    async fn pane_exited(&self, session: &str) -> Result<bool> {
        if self.run(&["has-session", "-t", session]).await.is_err() {
            return Ok(true);
        }
        match self
            .run(&["list-panes", "-t", session, "-F", "#{pane_dead}"])
            .await
        {
            Ok(output) => Ok(output.lines().all(|line| line.trim() == "1")),
            Err(e) if Self::session_gone(&e) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Backend for TmuxBackend {
    fn name(&self) -> &'static str {
        "tmux"
    }

    async fn launch(&mut self, command: &str, args: &[String], cwd: Option<&Path>) -> Result<u32> {
        let session = self.next_session_name();
        self.session = Some(session.clone());
        info!("Starting tmux session {} for {}", session, command);

        match self.start_session(&session, command, args, cwd).await {
            Ok(pid) => Ok(pid),
            Err(e) => {
                if let Err(cleanup) = self.destroy().await {
                    warn!("Failed to clean up tmux session {}: {}", session, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn is_running(&mut self, pid: u32) -> Result<bool> {
        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            // Exists but owned by someone else
            Err(Errno::EPERM) => Ok(true),
            Err(e) => Err(Error::lifecycle(format!("Failed to probe pid {}: {}", pid, e))),
        }
    }

    async fn send_keys(&mut self, keys: &[String]) -> Result<()> {
        let session = self.active_session()?;
        for key in keys {
            self.run(&["send-keys", "-t", session.as_str(), key.as_str()]).await?;
        }
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        let session = self.active_session()?;
        self.run(&["send-keys", "-t", session.as_str(), "-l", "--", text])
            .await?;
        Ok(())
    }

    async fn paste(&mut self, text: &str) -> Result<()> {
        let session = self.active_session()?;
        self.run(&["set-buffer", "-b", session.as_str(), "--", text])
            .await?;
        self.run(&["paste-buffer", "-d", "-b", session.as_str(), "-t", session.as_str()])
            .await?;
        Ok(())
    }

    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let session = self.active_session()?;
        let (cols, rows) = (cols.to_string(), rows.to_string());
        self.run(&[
            "resize-window",
            "-t",
            session.as_str(),
            "-x",
            cols.as_str(),
            "-y",
            rows.as_str(),
        ])
        .await?;
        Ok(())
    }

    async fn capture_screen(&mut self) -> Result<String> {
        let session = self.active_session()?;
        self.run(&["capture-pane", "-p", "-t", session.as_str()]).await
    }

    async fn capture_scrollback(&mut self, lines: usize) -> Result<String> {
        let session = self.active_session()?;
        let start = format!("-{}", lines);
        self.run(&["capture-pane", "-p", "-t", session.as_str(), "-S", start.as_str()])
            .await
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> Result<()> {
        let session = self.active_session()?;
        let deadline = Instant::now() + timeout;
        loop {
            if self.pane_exited(&session).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::MatchTimeout {
                    matcher: "tmux pane exit".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            sleep(Duration::from_millis(defaults::POLL_MS)).await;
        }
    }

    fn stability_sample(&self) -> Duration {
        Duration::from_millis(self.options.stability_sample_ms)
    }

    async fn destroy(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            match self.run(&["kill-session", "-t", session.as_str()]).await {
                Ok(_) => info!("Destroyed tmux session {}", session),
                Err(e) if Self::session_gone(&e) => {}
                Err(e) => debug!("Ignoring kill-session failure for {}: {}", session, e),
            }
        }
        Ok(())
    }
}

impl Drop for TmuxBackend {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            warn!("tmux session {} was not destroyed, killing it", session);
            let _ = std::process::Command::new(&self.tmux)
                .args(["kill-session", "-t", session.as_str()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}
