//! Map free-text Slack replies to terminal input.

const AFFIRMATIVES: &[&str] = &["y", "yes", "ok", "approve", "go", "yeah", "yep", "sure"];
const NEGATIVES: &[&str] = &["n", "no", "deny", "reject", "nope"];

pub const APPROVE_KEYS: &str = "y";
pub const DENY_KEYS: &str = "n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Approve,
    Deny,
    /// Forwarded to the pane verbatim.
    Text(String),
}

impl Reply {
    /// The text to type into the pane.
    pub fn keys(&self) -> &str {
        match self {
            Self::Approve => APPROVE_KEYS,
            Self::Deny => DENY_KEYS,
            Self::Text(text) => text,
        }
    }
}

pub fn classify_reply(text: &str) -> Reply {
    let lower = text.trim().to_lowercase();
    if AFFIRMATIVES.contains(&lower.as_str()) {
        Reply::Approve
    } else if NEGATIVES.contains(&lower.as_str()) {
        Reply::Deny
    } else {
        Reply::Text(text.to_string())
    }
}
