//! Error types for the tmux backend.

use slackmux_core::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("invalid pane_id format: {0}")]
    InvalidHandle(String),

    #[error("tmux command failed: {0}")]
    CommandFailed(String),

    #[error("tmux command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("failed to parse list-panes line {line_num}: {detail}")]
    ParseError { line_num: usize, detail: String },

    #[error("tmux io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TmuxError> for BridgeError {
    fn from(err: TmuxError) -> Self {
        match err {
            TmuxError::InvalidHandle(handle) => Self::InvalidHandle(handle),
            other => Self::ExternalFailure(other.to_string()),
        }
    }
}
