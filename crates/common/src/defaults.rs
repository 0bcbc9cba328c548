//! Built-in defaults, used when neither a step nor the scenario sets a value

/// Matcher wait / readiness timeout
pub const WAIT_TIMEOUT_MS: u64 = 15_000;

/// Interval between matcher polls
pub const POLL_MS: u64 = 200;

/// Lines of history considered by scrollback matchers and captures
pub const SCROLLBACK_LINES: usize = 2_000;

/// Delay after typing a line
pub const POST_TYPE_MS: u64 = 0;

/// Interval between process liveness checks during startup and readiness
pub const PROCESS_POLL_MS: u64 = 100;

/// Terminal size used when the launch spec does not set one
pub const TERMINAL_COLS: u16 = 120;
pub const TERMINAL_ROWS: u16 = 40;

/// Raw transcript ceiling; once exceeded the transcript keeps only `TRANSCRIPT_RETAIN_BYTES`
pub const TRANSCRIPT_LIMIT_BYTES: usize = 2_000_000;
pub const TRANSCRIPT_RETAIN_BYTES: usize = 1_000_000;

/// Screen hash sampling interval for stability detection
pub const STABILITY_SAMPLE_MS: u64 = 50;

/// Prefix for multiplexer session names
pub const SESSION_PREFIX: &str = "tuimuppet";
