//! Listing of panes tagged as bridged sessions.
//!
//! Panes opt in by setting a pane user option (default `@cspace`) to
//! `claude:<name>`. Used at startup to re-bind panes that are still alive.

use serde::{Deserialize, Serialize};
use slackmux_core::is_valid_pane_handle;

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;

pub const DEFAULT_TAG_OPTION: &str = "@cspace";
const TAG_PREFIX: &str = "claude:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedPane {
    pub handle: String,
    pub name: String,
}

/// Execute `tmux list-panes -s -t <session>` and keep tagged panes.
///
/// An empty `Ok` means the session has no tagged panes; a failed query is
/// an `Err`, never an empty list.
pub async fn list_tagged_panes<R: TmuxCommandRunner + ?Sized>(
    runner: &R,
    session: &str,
    tag_option: &str,
) -> Result<Vec<TaggedPane>, TmuxError> {
    let format = format!("#{{pane_id}}\t#{{{tag_option}}}");
    let output = runner
        .run(&["list-panes", "-s", "-t", session, "-F", &format])
        .await?;
    parse_tagged_panes(&output)
}

pub fn parse_tagged_panes(output: &str) -> Result<Vec<TaggedPane>, TmuxError> {
    let mut panes = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (handle, tag) = line.split_once('\t').ok_or_else(|| TmuxError::ParseError {
            line_num: idx + 1,
            detail: "expected <pane_id>\\t<tag>".to_string(),
        })?;
        if !is_valid_pane_handle(handle) {
            return Err(TmuxError::ParseError {
                line_num: idx + 1,
                detail: format!("bad pane id {handle:?}"),
            });
        }
        if let Some(name) = tag.strip_prefix(TAG_PREFIX) {
            if !name.is_empty() {
                panes.push(TaggedPane {
                    handle: handle.to_string(),
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(panes)
}
