//! Reply router: thread replies become keystrokes in the owning pane.
//!
//! Messages are handled one at a time in arrival order. The state lock is
//! not held while keystrokes are dispatched.

use std::sync::Arc;

use slackmux_core::{BridgeError, PaneBinding, classify_reply};
use slackmux_tmux::{DeliveryPath, TmuxCommandRunner, send_text};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Bridge, BridgeState};
use crate::chat::InboundMessage;
use crate::notice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not a human reply inside a thread.
    Ignored,
    /// Thread is neither bound nor persisted.
    UnknownThread,
    Delivered {
        pane_handle: String,
        keys: String,
        path: DeliveryPath,
    },
    DeliveryFailed {
        pane_handle: String,
        error: String,
    },
    /// Persisted but unbound thread; the one-time warning was posted.
    WarnedDisconnected,
    /// Persisted but unbound thread that was already warned.
    AlreadyWarned,
}

pub struct ReplyRouter {
    bridge: Bridge,
    runner: Arc<dyn TmuxCommandRunner>,
}

impl ReplyRouter {
    pub fn new(bridge: Bridge, runner: Arc<dyn TmuxCommandRunner>) -> Self {
        Self { bridge, runner }
    }

    /// Route one inbound message.
    ///
    /// Dispatch failures are reported into the thread and returned as
    /// `DeliveryFailed`; `Err` only means the disconnected warning could not
    /// be posted (it will be retried on the next reply).
    pub async fn route(&self, msg: &InboundMessage) -> Result<RouteOutcome, BridgeError> {
        let Some((thread_ref, text)) = msg.routable() else {
            return Ok(RouteOutcome::Ignored);
        };

        let binding = {
            let mut st = self.bridge.state().await;
            match st.panes.lookup_by_thread(thread_ref).cloned() {
                Some(binding) => {
                    st.warned.remove(thread_ref);
                    binding
                }
                None => return self.warn_disconnected(&mut st, thread_ref).await,
            }
        };

        let reply = classify_reply(text);
        let keys = reply.keys();
        match send_text(&*self.runner, &binding.pane_handle, keys).await {
            Ok(path) => {
                tracing::info!(
                    name = %binding.name,
                    pane = %binding.pane_handle,
                    ?path,
                    "reply delivered"
                );
                self.post(&binding, &notice::sent(&binding.name, keys)).await;
                Ok(RouteOutcome::Delivered {
                    pane_handle: binding.pane_handle,
                    keys: keys.to_string(),
                    path,
                })
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(
                    name = %binding.name,
                    pane = %binding.pane_handle,
                    "reply delivery failed: {error}"
                );
                self.post(&binding, &notice::send_failed(&binding.pane_handle, &error))
                    .await;
                Ok(RouteOutcome::DeliveryFailed {
                    pane_handle: binding.pane_handle,
                    error,
                })
            }
        }
    }

    /// Consume inbound messages until the channel closes or `cancel` fires.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                msg = inbound.recv() => {
                    let Some(msg) = msg else { break };
                    match self.route(&msg).await {
                        Ok(outcome) => tracing::debug!(?outcome, "routed"),
                        Err(e) => tracing::warn!("reply routing failed: {e}"),
                    }
                }
            }
        }
        tracing::info!("reply router stopped");
    }

    async fn warn_disconnected(
        &self,
        st: &mut BridgeState,
        thread_ref: &str,
    ) -> Result<RouteOutcome, BridgeError> {
        let Some(record) = st.threads.lookup_by_thread_ref(thread_ref).cloned() else {
            tracing::debug!(thread = thread_ref, "reply in unknown thread ignored");
            return Ok(RouteOutcome::UnknownThread);
        };
        if st.warned.contains(thread_ref) {
            return Ok(RouteOutcome::AlreadyWarned);
        }

        self.bridge
            .chat()
            .post_threaded_message(
                &record.channel_ref,
                thread_ref,
                &notice::disconnected(&record.name, &record.session),
            )
            .await?;
        st.warned.insert(thread_ref.to_string());
        tracing::info!(
            session = %record.session,
            name = %record.name,
            thread = thread_ref,
            "reply to disconnected session"
        );
        Ok(RouteOutcome::WarnedDisconnected)
    }

    async fn post(&self, binding: &PaneBinding, text: &str) {
        if let Err(e) = self
            .bridge
            .chat()
            .post_threaded_message(&binding.channel_ref, &binding.thread_ref, text)
            .await
        {
            tracing::warn!(thread = %binding.thread_ref, "failed to post delivery status: {e}");
        }
    }
}
