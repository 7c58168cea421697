//! Hardened runner for external tools.
//!
//! Every ffmpeg/ffprobe invocation goes through [`ProcessExecutor::run`],
//! which applies a hard timeout, classifies failures from stderr and retries
//! transient ones with exponential backoff. Children are spawned with
//! `kill_on_drop` so an abandoned future (timeout, worker shutdown) never
//! leaves an encoder running.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::ToolCommand;
use crate::error::{FailureKind, MediaError, MediaResult, ToolFailure};
use crate::metrics::{record_tool_retry, record_tool_run};

/// Number of characters of stderr kept for diagnostics.
pub const STDERR_TAIL_CHARS: usize = 2000;

/// Stderr fragments that mark a client-side error; matched case-insensitively.
const FATAL_PATTERNS: &[&str] = &[
    "no such file or directory",
    "invalid data found",
    "invalid argument",
    "permission denied",
    "unknown encoder",
    "encoder not found",
];

/// Retry and timeout settings for tool invocations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the delay for each further retry.
    pub backoff_factor: f64,
    /// Hard limit for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        self.base_delay
            .mul_f64(self.backoff_factor.powi(exponent))
    }
}

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Runs tool commands with timeout, retry and failure classification.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    policy: RetryPolicy,
}

impl ProcessExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a command until it succeeds, fails fatally, or runs out of retries.
    pub async fn run(&self, cmd: &ToolCommand) -> MediaResult<ToolOutput> {
        let tool = cmd.tool_name();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(tool = %tool, attempt, "Running {}", cmd.command_line());

            let mut failure = match self.run_once(cmd).await {
                Ok(output) => {
                    record_tool_run(&tool, "success");
                    return Ok(output);
                }
                Err(failure) => failure,
            };
            failure.attempts = attempt;

            if failure.kind == FailureKind::Fatal {
                warn!(
                    tool = %tool,
                    attempt,
                    exit_code = ?failure.exit_code,
                    "Tool failed with non-retryable error: {}",
                    failure.user_message
                );
                record_tool_run(&tool, "fatal");
                return Err(MediaError::ToolFailed(Box::new(failure)));
            }

            if attempt > self.policy.max_retries {
                warn!(
                    tool = %tool,
                    attempts = attempt,
                    "Tool failed, retries exhausted: {}",
                    failure.user_message
                );
                record_tool_run(&tool, "exhausted");
                return Err(MediaError::RetriesExhausted(Box::new(failure)));
            }

            let delay = self.policy.delay_for_retry(attempt);
            warn!(
                tool = %tool,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Transient tool failure, retrying: {}",
                failure.user_message
            );
            record_tool_retry(&tool);
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_once(&self, cmd: &ToolCommand) -> Result<ToolOutput, ToolFailure> {
        let command_line = cmd.command_line();

        let child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_failure(&command_line, e))?;

        let output = match tokio::time::timeout(self.policy.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolFailure {
                    kind: FailureKind::Retryable,
                    user_message: user_message_for(&e.to_string()).to_string(),
                    command: command_line,
                    stderr: e.to_string(),
                    exit_code: None,
                    attempts: 0,
                })
            }
            Err(_) => {
                // Dropping the wait future kills the child
                let secs = self.policy.timeout.as_secs_f64();
                return Err(ToolFailure {
                    kind: FailureKind::Retryable,
                    user_message: "Video processing took too long.".to_string(),
                    command: command_line,
                    stderr: format!("timed out after {:.1} seconds", secs),
                    exit_code: None,
                    attempts: 0,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            return Ok(ToolOutput {
                stdout: output.stdout,
                stderr,
            });
        }

        Err(ToolFailure {
            kind: classify_stderr(&stderr),
            user_message: user_message_for(&stderr).to_string(),
            command: command_line,
            stderr: truncate_stderr(&stderr, STDERR_TAIL_CHARS),
            exit_code: output.status.code(),
            attempts: 0,
        })
    }
}

fn spawn_failure(command_line: &str, e: std::io::Error) -> ToolFailure {
    let kind = match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => FailureKind::Fatal,
        _ => FailureKind::Retryable,
    };
    let user_message = match e.kind() {
        std::io::ErrorKind::NotFound => "A required video tool is not installed.",
        std::io::ErrorKind::PermissionDenied => {
            "The worker does not have permission to run a required video tool."
        }
        _ => "Video processing failed. Please try again.",
    };
    ToolFailure {
        kind,
        user_message: user_message.to_string(),
        command: command_line.to_string(),
        stderr: format!("failed to spawn: {}", e),
        exit_code: None,
        attempts: 0,
    }
}

/// Classify a failed run from its stderr.
pub fn classify_stderr(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();
    if FATAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::Fatal
    } else {
        FailureKind::Retryable
    }
}

/// Map stderr to a short message an end user can act on.
pub fn user_message_for(stderr: &str) -> &'static str {
    let lower = stderr.to_lowercase();
    let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if has(&["no such file or directory", "does not exist"]) {
        "An input file could not be found."
    } else if has(&["invalid data found", "moov atom not found", "corrupt", "end of file"]) {
        "The video file appears to be corrupted or in an unsupported format."
    } else if has(&["permission denied"]) {
        "The worker does not have permission to access a required file."
    } else if has(&["unknown encoder", "encoder not found", "unknown decoder"]) {
        "A required video codec is not available."
    } else if has(&["cannot allocate memory", "out of memory"]) {
        "The worker ran out of memory while processing the video."
    } else if has(&[
        "connection refused",
        "connection reset",
        "network is unreachable",
        "name or service not known",
    ]) {
        "A network error occurred while processing the video."
    } else {
        "Video processing failed. Please try again."
    }
}

/// Keep the last `max_chars` characters of stderr.
pub fn truncate_stderr(stderr: &str, max_chars: usize) -> String {
    let count = stderr.chars().count();
    if count <= max_chars {
        return stderr.to_string();
    }
    let tail: String = stderr.chars().skip(count - max_chars).collect();
    format!("...{}", tail)
}
