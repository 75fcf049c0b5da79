//! Async tmux command executor with semaphore-controlled concurrency
//!
//! Provides non-blocking tmux command execution with:
//! - Semaphore to limit concurrent commands (default: 16)
//! - Timeout handling
//! - Structured output parsing

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{LIST_PANES_FORMAT, Multiplexer, Pane};
use crate::error::{Result, TmuxError};

/// Default maximum concurrent tmux commands
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Default command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout for `new-session`, which has to start a shell
pub const CREATE_SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Async tmux command executor
///
/// Uses a semaphore to limit concurrent tmux commands, preventing
/// resource exhaustion when many bridges poll at once.
#[derive(Clone)]
pub struct TmuxExecutor {
    /// Semaphore for concurrency control
    semaphore: Arc<Semaphore>,
    /// Command timeout
    timeout: Duration,
}

impl TmuxExecutor {
    /// Create a new executor with default settings
    pub fn new() -> Self {
        Self::with_max_concurrent(DEFAULT_MAX_CONCURRENT)
    }

    /// Create an executor with custom concurrency limit
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if tmux is installed and accessible
    pub async fn check_installed(&self) -> Result<()> {
        let output = Command::new("tmux")
            .arg("-V")
            .output()
            .await
            .map_err(|_| TmuxError::NotInstalled)?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            debug!("tmux version: {}", version.trim());
            Ok(())
        } else {
            Err(TmuxError::NotInstalled.into())
        }
    }

    /// Execute a tmux command with the default timeout and return its output
    pub async fn execute(&self, args: &[&str]) -> Result<String> {
        self.execute_with_timeout(args, self.timeout).await
    }

    /// Execute a tmux command with an explicit timeout
    #[instrument(skip(self), fields(args = ?args))]
    pub async fn execute_with_timeout(&self, args: &[&str], limit: Duration) -> Result<String> {
        // Acquire semaphore permit
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TmuxError::SemaphoreError)?;

        let mut cmd = Command::new("tmux");
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    Err(TmuxError::CommandFailed {
                        command: format!("tmux {}", args.join(" ")),
                        stderr,
                    }
                    .into())
                }
            }
            Ok(Err(e)) => {
                warn!("tmux command failed: {}", e);
                Err(TmuxError::CommandFailed {
                    command: format!("tmux {}", args.join(" ")),
                    stderr: e.to_string(),
                }
                .into())
            }
            Err(_) => Err(TmuxError::Timeout(limit).into()),
        }
    }
}

/// Exact-match session target; a bare name would also match by prefix
fn session_target(session_name: &str) -> String {
    format!("={}", session_name)
}

/// Exact-match target for the active pane of a session
fn pane_target(session_name: &str) -> String {
    format!("={}:", session_name)
}

fn capture_args(target: &str, start: &str) -> Vec<String> {
    ["capture-pane", "-t", target, "-e", "-p", "-S", start]
        .map(String::from)
        .to_vec()
}

/// `--` ends option parsing so text starting with `-` is typed, not parsed
fn send_literal_args(target: &str, text: &str) -> Vec<String> {
    ["send-keys", "-t", target, "-l", "--", text]
        .map(String::from)
        .to_vec()
}

fn send_keys_args(target: &str, keys: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = ["send-keys", "-t", target].map(String::from).to_vec();
    args.extend(keys.iter().map(|k| k.to_string()));
    args
}

fn as_strs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Multiplexer for TmuxExecutor {
    async fn list_panes(&self) -> Result<Vec<Pane>> {
        // A missing server exits nonzero and counts as a failed scan
        let output = self
            .execute(&["list-panes", "-a", "-F", LIST_PANES_FORMAT])
            .await?;
        Ok(Pane::parse_listing(&output, Utc::now()))
    }

    async fn capture_pane(&self, session_name: &str, scrollback_lines: u32) -> Result<String> {
        let start = format!("-{}", scrollback_lines);
        let args = capture_args(&pane_target(session_name), &start);
        self.execute(&as_strs(&args)).await
    }

    async fn create_session(&self, session_name: &str, working_dir: &Path) -> Result<()> {
        let working_dir_str = working_dir.to_string_lossy();
        self.execute_with_timeout(
            &["new-session", "-d", "-s", session_name, "-c", &working_dir_str],
            CREATE_SESSION_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn kill_session(&self, session_name: &str) -> Result<()> {
        self.execute(&["kill-session", "-t", &session_target(session_name)])
            .await?;
        Ok(())
    }

    async fn send_literal(&self, session_name: &str, text: &str) -> Result<()> {
        let args = send_literal_args(&pane_target(session_name), text);
        self.execute(&as_strs(&args)).await?;
        Ok(())
    }

    async fn send_keys(&self, session_name: &str, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let args = send_keys_args(&pane_target(session_name), keys);
        self.execute(&as_strs(&args)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_executor_creation() {
        let executor = TmuxExecutor::new();
        assert_eq!(executor.timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_executor_with_custom_settings() {
        let executor =
            TmuxExecutor::with_max_concurrent(8).with_timeout(Duration::from_secs(10));

        assert_eq!(executor.timeout, Duration::from_secs(10));
        assert_eq!(executor.semaphore.available_permits(), 8);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let executor = TmuxExecutor::with_max_concurrent(0);
        assert_eq!(executor.semaphore.available_permits(), 1);
    }

    #[test]
    fn test_targets_are_exact_match() {
        assert_eq!(session_target("mt"), "=mt");
        assert_eq!(pane_target("mt-foo-1a2b"), "=mt-foo-1a2b:");
        assert_eq!(
            capture_args(&pane_target("s"), "-500"),
            vec!["capture-pane", "-t", "=s:", "-e", "-p", "-S", "-500"]
        );
        assert_eq!(
            send_keys_args(&pane_target("s"), &["C-c", "Enter"]),
            vec!["send-keys", "-t", "=s:", "C-c", "Enter"]
        );
    }

    #[test]
    fn test_dash_leading_text_is_not_an_option() {
        for text in ["- fix the tests", "-h", "--"] {
            let args = send_literal_args(&pane_target("s"), text);
            assert_eq!(args, vec!["send-keys", "-t", "=s:", "-l", "--", text]);
        }
    }

    #[tokio::test]
    async fn test_send_no_keys_is_noop() {
        // Must not shell out at all when there is nothing to send
        let executor = TmuxExecutor::new();
        assert!(executor.send_keys("missing", &[]).await.is_ok());
    }
}
