//! Keystroke delivery into a tmux pane.
//!
//! Short single-line payloads are typed with `send-keys -l` so tmux never
//! interprets them as key names. Anything longer, or containing a newline,
//! is staged in a named paste buffer and pasted in one shot. Both paths end
//! with an explicit `Enter`.

use std::time::Duration;

use slackmux_core::is_valid_pane_handle;

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

/// Payloads longer than this (in chars) go through the paste buffer.
pub const LITERAL_MAX_CHARS: usize = 200;

/// tmux completes `paste-buffer` asynchronously; submitting immediately can
/// race the paste.
pub const PASTE_SETTLE: Duration = Duration::from_millis(200);

pub const PASTE_BUFFER: &str = "slackmux-reply";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    Literal,
    Paste,
}

pub fn delivery_path(text: &str) -> DeliveryPath {
    if text.contains('\n') || text.chars().count() > LITERAL_MAX_CHARS {
        DeliveryPath::Paste
    } else {
        DeliveryPath::Literal
    }
}

/// Type `text` into `pane` and submit it.
pub async fn send_text<R: TmuxCommandRunner + ?Sized>(
    runner: &R,
    pane: &str,
    text: &str,
) -> Result<DeliveryPath, TmuxError> {
    if !is_valid_pane_handle(pane) {
        return Err(TmuxError::InvalidHandle(pane.to_string()));
    }

    let path = delivery_path(text);
    match path {
        DeliveryPath::Literal => {
            runner.run(&["send-keys", "-t", pane, "-l", "--", text]).await?;
        }
        DeliveryPath::Paste => {
            runner
                .run_with_input(&["load-buffer", "-b", PASTE_BUFFER, "-"], text)
                .await?;
            runner
                .run(&["paste-buffer", "-b", PASTE_BUFFER, "-d", "-t", pane])
                .await?;
            tokio::time::sleep(PASTE_SETTLE).await;
        }
    }
    runner.run(&["send-keys", "-t", pane, "Enter"]).await?;

    tracing::debug!(pane, ?path, chars = text.chars().count(), "keys delivered");
    Ok(path)
}
