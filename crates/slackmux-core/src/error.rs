//! Error taxonomy shared by every layer of the bridge.

use thiserror::Error;

use crate::snapshot::SnapshotError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed pane identifier. Always rejected before any state change.
    #[error("invalid pane_id format: {0}")]
    InvalidHandle(String),

    #[error("no mapping for {0}")]
    NoBinding(String),

    /// Chat client or tmux call failed or timed out.
    #[error("{0}")]
    ExternalFailure(String),

    #[error("failed to persist thread map: {0}")]
    PersistenceFailure(String),
}

impl From<SnapshotError> for BridgeError {
    fn from(err: SnapshotError) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}
