//! slackmux-tmux: tmux IO boundary.
//! Subprocess execution with timeouts, keystroke delivery, and tagged pane
//! listing. No mapping state lives here.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod pane_list;

pub use dispatch::{DeliveryPath, LITERAL_MAX_CHARS, delivery_path, send_text};
pub use error::TmuxError;
pub use executor::{TmuxCommandRunner, TmuxExecutor, shell_quote};
pub use pane_list::{DEFAULT_TAG_OPTION, TaggedPane, list_tagged_panes, parse_tagged_panes};
