//! TmuxCommandRunner trait and TmuxExecutor (async subprocess wrapper).
//!
//! Commands are rendered into a single `sh -c` line with every argument
//! single-quoted, and each invocation is bounded by a timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::TmuxError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for executing tmux commands. Enables mock injection for testing.
#[async_trait]
pub trait TmuxCommandRunner: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<String, TmuxError>;

    /// Run with `input` written to the command's stdin.
    async fn run_with_input(&self, args: &[&str], input: &str) -> Result<String, TmuxError>;
}

#[async_trait]
impl<T: TmuxCommandRunner + ?Sized> TmuxCommandRunner for Arc<T> {
    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        (**self).run(args).await
    }

    async fn run_with_input(&self, args: &[&str], input: &str) -> Result<String, TmuxError> {
        (**self).run_with_input(args, input).await
    }
}

/// Quote `s` for a POSIX shell: `it's` becomes `'it'\''s'`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Real tmux executor using `tokio::process::Command`.
pub struct TmuxExecutor {
    tmux_bin: String,
    socket_path: Option<String>,
    timeout: Duration,
}

impl TmuxExecutor {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
            socket_path: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The shell line executed for `args`.
    pub fn command_line(&self, args: &[&str]) -> String {
        let mut parts = vec![shell_quote(&self.tmux_bin)];
        if let Some(ref path) = self.socket_path {
            parts.push("-S".to_string());
            parts.push(shell_quote(path));
        }
        parts.extend(args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }

    async fn exec(&self, args: &[&str], input: Option<&str>) -> Result<String, TmuxError> {
        let line = self.command_line(args);
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&line)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = async {
            let mut child = cmd.spawn()?;
            if let Some(input) = input {
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(input.as_bytes()).await?;
                    stdin.shutdown().await?;
                }
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                tracing::warn!(command = %line, "tmux command timed out");
                TmuxError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TmuxError::CommandFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new("tmux")
    }
}

#[async_trait]
impl TmuxCommandRunner for TmuxExecutor {
    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        self.exec(args, None).await
    }

    async fn run_with_input(&self, args: &[&str], input: &str) -> Result<String, TmuxError> {
        self.exec(args, Some(input)).await
    }
}
