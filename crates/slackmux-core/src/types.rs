use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

// ─── Pane Handle ──────────────────────────────────────────────────

/// Returns `true` for tmux pane ids of the form `%<digits>`.
pub fn is_valid_pane_handle(handle: &str) -> bool {
    handle
        .strip_prefix('%')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

pub fn validate_pane_handle(handle: &str) -> Result<(), BridgeError> {
    if is_valid_pane_handle(handle) {
        Ok(())
    } else {
        Err(BridgeError::InvalidHandle(handle.to_string()))
    }
}

// ─── Pane Binding ─────────────────────────────────────────────────

/// Live association between a pane handle and a Slack thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneBinding {
    pub pane_handle: String,
    pub name: String,
    pub session: String,
    pub thread_ref: String,
    pub channel_ref: String,
    /// Used by the TTL sweep.
    pub created_at: DateTime<Utc>,
}

impl PaneBinding {
    pub fn new(
        pane_handle: impl Into<String>,
        session: impl Into<String>,
        name: impl Into<String>,
        thread_ref: impl Into<String>,
        channel_ref: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pane_handle: pane_handle.into(),
            name: name.into(),
            session: session.into(),
            thread_ref: thread_ref.into(),
            channel_ref: channel_ref.into(),
            created_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }
}

// ─── Thread Record ────────────────────────────────────────────────

/// Durable association between a `(session, name)` identity and a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub name: String,
    pub session: String,
    /// Last known pane handle. Rotates whenever tmux reopens the pane.
    #[serde(default, rename = "pane_id", skip_serializing_if = "Option::is_none")]
    pub pane_handle: Option<String>,
    #[serde(rename = "thread_ts")]
    pub thread_ref: String,
    #[serde(rename = "channel_id")]
    pub channel_ref: String,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ThreadRecord {
    /// Composite snapshot key for this record.
    pub fn key(&self) -> String {
        composite_key(&self.session, &self.name, self.pane_handle.as_deref())
    }

    pub fn is_identity(&self, session: &str, name: &str) -> bool {
        self.session == session && self.name == name
    }
}

/// `session:name:handle`, or `session:name` when no handle is known.
///
/// Backslashes and `:` inside a part are escaped so distinct identities
/// never share a key.
pub fn composite_key(session: &str, name: &str, pane_handle: Option<&str>) -> String {
    let (session, name) = (escape_key_part(session), escape_key_part(name));
    match pane_handle {
        Some(handle) => format!("{session}:{name}:{}", escape_key_part(handle)),
        None => format!("{session}:{name}"),
    }
}

fn escape_key_part(part: &str) -> String {
    part.replace('\\', "\\\\").replace(':', "\\:")
}
