//! slackmux-core: session mapping state for the Slack <-> tmux bridge.
//! Active pane bindings, the durable thread store, and reply classification.
//! No IO beyond the snapshot file boundary.

pub mod error;
pub mod pane_map;
pub mod reply;
pub mod snapshot;
pub mod thread_store;
pub mod types;

pub use error::BridgeError;
pub use pane_map::ActivePaneMap;
pub use reply::{Reply, classify_reply};
pub use snapshot::{JsonFileSnapshot, MemorySnapshot, SnapshotError, SnapshotStore};
pub use thread_store::ThreadStore;
pub use types::{PaneBinding, ThreadRecord, is_valid_pane_handle, validate_pane_handle};
