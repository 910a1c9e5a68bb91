//! slackmux-bridge: reconnection orchestrator, reply router and sweeper.
//!
//! Owns the shared `BridgeState` and drives the chat and tmux seams defined
//! as traits so tests can substitute fakes.

pub mod bridge;
pub mod chat;
mod notice;
pub mod router;
pub mod sweep;

pub use bridge::{
    Bridge, BridgeState, CloseOutcome, ConnectOutcome, ConnectStatus, Health, NotifyKind,
};
pub use chat::{ChatClient, ChatError, InboundMessage};
pub use router::{ReplyRouter, RouteOutcome};
pub use sweep::{DEFAULT_SWEEP_INTERVAL, spawn_sweeper};
