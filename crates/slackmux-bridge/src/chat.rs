//! Chat platform seam.

use async_trait::async_trait;
use slackmux_core::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The platform answered but refused the call (`ok: false`).
    #[error("slack api error: {0}")]
    Api(String),

    #[error("slack transport error: {0}")]
    Transport(String),
}

impl From<ChatError> for BridgeError {
    fn from(err: ChatError) -> Self {
        Self::ExternalFailure(err.to_string())
    }
}

/// Outbound half of the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a top-level message and return its thread ref.
    async fn post_message(&self, channel: &str, text: &str) -> Result<String, ChatError>;

    async fn post_threaded_message(
        &self,
        channel: &str,
        thread_ref: &str,
        text: &str,
    ) -> Result<(), ChatError>;
}

/// A message received from the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub thread_ref: Option<String>,
    pub channel: String,
    pub text: Option<String>,
    pub is_bot: bool,
    pub subtype: Option<String>,
}

impl InboundMessage {
    /// A human reply inside a thread: `(thread_ref, text)`.
    ///
    /// Bot posts, edits and other subtyped events, top-level messages and
    /// empty messages yield `None`.
    pub fn routable(&self) -> Option<(&str, &str)> {
        if self.is_bot || self.subtype.is_some() {
            return None;
        }
        let thread_ref = self.thread_ref.as_deref().filter(|t| !t.is_empty())?;
        let text = self.text.as_deref().filter(|t| !t.is_empty())?;
        Some((thread_ref, text))
    }
}
