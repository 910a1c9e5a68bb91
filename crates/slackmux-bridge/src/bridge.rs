//! Reconnection orchestrator.
//!
//! Decides whether a pane gets a fresh thread or is re-attached to an
//! existing one, and keeps the active pane map and the thread store in step.
//!
//! Every operation holds the state lock for its whole duration, chat call
//! included: two connects for one identity never both create a thread.
//! Remote calls happen before any local mutation, so a failed post leaves
//! both tables untouched.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slackmux_core::{
    ActivePaneMap, BridgeError, PaneBinding, ThreadRecord, ThreadStore, validate_pane_handle,
};
use slackmux_tmux::TaggedPane;
use tokio::sync::{Mutex, MutexGuard};

use crate::chat::ChatClient;
use crate::notice;

/// Mutable bridge state guarded by one lock.
pub struct BridgeState {
    pub panes: ActivePaneMap,
    pub threads: ThreadStore,
    /// Threads that already got a "disconnected" warning since their last binding.
    pub warned: HashSet<String>,
}

impl BridgeState {
    pub fn new(threads: ThreadStore) -> Self {
        Self {
            panes: ActivePaneMap::new(),
            threads,
            warned: HashSet::new(),
        }
    }

    /// Persisted record for an identity: exact triple first, then the name fallback.
    pub fn resolve_record(&self, session: &str, name: &str, pane: &str) -> Option<ThreadRecord> {
        self.threads
            .exact_lookup(session, name, pane)
            .or_else(|| {
                self.threads
                    .fallback_lookup_by_name(session, name, &self.panes)
            })
            .cloned()
    }

    /// Re-key `record` under `pane` if needed, then bind the pane to its thread.
    fn attach(
        &mut self,
        record: &ThreadRecord,
        session: &str,
        name: &str,
        pane: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        if record.pane_handle.as_deref() != Some(pane) {
            self.threads.migrate_handle(record, pane, now)?;
        }
        self.establish(PaneBinding::new(
            pane,
            session,
            name,
            &record.thread_ref,
            &record.channel_ref,
            now,
        ))
    }

    fn establish(&mut self, binding: PaneBinding) -> Result<(), BridgeError> {
        let thread_ref = binding.thread_ref.clone();
        self.panes.bind(binding)?;
        self.warned.remove(&thread_ref);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStatus {
    Created,
    Reconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub thread_ref: String,
    pub status: ConnectStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// Approval request or other mid-turn event.
    #[default]
    Notification,
    /// The agent finished its turn.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOutcome {
    pub was_bound: bool,
    pub purged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub bindings: usize,
    pub records: usize,
    pub uptime_secs: f64,
}

#[derive(Clone)]
pub struct Bridge {
    state: Arc<Mutex<BridgeState>>,
    chat: Arc<dyn ChatClient>,
    channel_ref: String,
    started_at: Instant,
}

impl Bridge {
    pub fn new(
        threads: ThreadStore,
        chat: Arc<dyn ChatClient>,
        channel_ref: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(BridgeState::new(threads))),
            chat,
            channel_ref: channel_ref.into(),
            started_at: Instant::now(),
        }
    }

    pub async fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().await
    }

    pub(crate) fn chat(&self) -> &dyn ChatClient {
        &*self.chat
    }

    pub fn channel_ref(&self) -> &str {
        &self.channel_ref
    }

    /// Always open a new thread for the pane.
    pub async fn create_thread(
        &self,
        session: &str,
        name: &str,
        pane: &str,
    ) -> Result<String, BridgeError> {
        validate_pane_handle(pane)?;
        let mut st = self.state.lock().await;
        self.open_thread(&mut st, session, name, pane).await
    }

    /// Bind the pane to its identity's existing thread, or open one.
    pub async fn connect(
        &self,
        session: &str,
        name: &str,
        pane: &str,
    ) -> Result<ConnectOutcome, BridgeError> {
        validate_pane_handle(pane)?;
        let mut st = self.state.lock().await;

        let Some(record) = st.resolve_record(session, name, pane) else {
            tracing::info!(session, name, pane, "no existing thread, creating new");
            let thread_ref = self.open_thread(&mut st, session, name, pane).await?;
            return Ok(ConnectOutcome {
                thread_ref,
                status: ConnectStatus::Created,
            });
        };

        self.chat
            .post_threaded_message(
                &record.channel_ref,
                &record.thread_ref,
                &notice::reconnected(name),
            )
            .await?;
        st.attach(&record, session, name, pane, Utc::now())?;

        tracing::info!(
            session,
            name,
            pane,
            previous_pane = record.pane_handle.as_deref().unwrap_or("-"),
            thread = %record.thread_ref,
            "reconnected to existing thread"
        );
        Ok(ConnectOutcome {
            thread_ref: record.thread_ref,
            status: ConnectStatus::Reconnected,
        })
    }

    /// Post an event from the pane into its thread.
    ///
    /// An unbound pane with a known identity is re-attached silently.
    pub async fn notify(
        &self,
        pane: &str,
        session: Option<&str>,
        name: Option<&str>,
        message: &str,
        kind: NotifyKind,
    ) -> Result<(), BridgeError> {
        validate_pane_handle(pane)?;
        let mut st = self.state.lock().await;

        let (target, revived) = match st.panes.lookup_by_handle(pane) {
            Some(binding) => (binding.clone(), None),
            None => {
                let found = session
                    .zip(name)
                    .filter(|(s, n)| !s.is_empty() && !n.is_empty())
                    .and_then(|(s, n)| st.resolve_record(s, n, pane).map(|r| (s, n, r)));
                let Some((session, name, record)) = found else {
                    tracing::info!(pane, ?kind, "event received but no thread mapping");
                    return Err(BridgeError::NoBinding(format!("pane {pane}")));
                };
                let binding = PaneBinding::new(
                    pane,
                    session,
                    name,
                    &record.thread_ref,
                    &record.channel_ref,
                    Utc::now(),
                );
                (binding, Some(record))
            }
        };

        let text = match kind {
            NotifyKind::Notification => notice::notification(&target.name, message),
            NotifyKind::Stop => notice::finished(&target.name, message),
        };
        self.chat
            .post_threaded_message(&target.channel_ref, &target.thread_ref, &text)
            .await?;

        if let Some(record) = revived {
            st.attach(
                &record,
                &target.session,
                &target.name,
                pane,
                target.created_at,
            )?;
            tracing::info!(
                session = %target.session,
                name = %target.name,
                pane,
                "auto-reconnected via notify"
            );
        }

        tracing::info!(
            name = %target.name,
            ?kind,
            preview = %notice::preview(message),
            "event posted"
        );
        Ok(())
    }

    /// Rename an identity. Returns whether any persisted record moved.
    pub async fn rename(
        &self,
        pane: &str,
        session: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<bool, BridgeError> {
        validate_pane_handle(pane)?;
        let mut st = self.state.lock().await;

        if let Some(binding) = st.panes.lookup_by_handle(pane).cloned() {
            self.chat
                .post_threaded_message(
                    &binding.channel_ref,
                    &binding.thread_ref,
                    &notice::renamed(old_name, new_name),
                )
                .await?;
        }

        let renamed = st.threads.rename(session, old_name, new_name, Utc::now())?;
        if let Some(binding) = st.panes.lookup_by_handle_mut(pane) {
            binding.name = new_name.to_string();
        }

        tracing::info!(session, old_name, new_name, renamed, "renamed");
        Ok(renamed)
    }

    /// Detach the pane. `permanent` also forgets the identity's threads.
    ///
    /// `session` and `name` default to the live binding's.
    pub async fn close(
        &self,
        pane: &str,
        session: Option<&str>,
        name: Option<&str>,
        permanent: bool,
    ) -> Result<CloseOutcome, BridgeError> {
        validate_pane_handle(pane)?;
        let mut st = self.state.lock().await;

        let binding = st.panes.lookup_by_handle(pane).cloned();
        let session = session
            .filter(|s| !s.is_empty())
            .or(binding.as_ref().map(|b| b.session.as_str()));
        let name = name
            .filter(|n| !n.is_empty())
            .or(binding.as_ref().map(|b| b.name.as_str()));

        match binding {
            Some(ref b) => {
                self.chat
                    .post_threaded_message(
                        &b.channel_ref,
                        &b.thread_ref,
                        &notice::closed(name.unwrap_or(&b.name)),
                    )
                    .await?;
            }
            None => tracing::info!(pane, "close received but no thread mapping"),
        }

        let purged = match (permanent, session, name) {
            (true, Some(session), Some(name)) => {
                let threads: Vec<String> = st
                    .threads
                    .records()
                    .filter(|r| r.is_identity(session, name))
                    .map(|r| r.thread_ref.clone())
                    .collect();
                let purged = st.threads.remove_all_by_name(session, name)?;
                for thread_ref in &threads {
                    st.warned.remove(thread_ref);
                }
                purged
            }
            _ => false,
        };
        let was_bound = st.panes.unbind(pane);

        tracing::info!(
            pane,
            session = session.unwrap_or("?"),
            name = name.unwrap_or("?"),
            permanent,
            purged,
            "session closed"
        );
        Ok(CloseOutcome { was_bound, purged })
    }

    /// Bind live tagged panes that already have a persisted thread.
    ///
    /// Makes no chat calls. Returns how many panes were bound.
    pub async fn restore_live_panes(&self, session: &str, panes: &[TaggedPane]) -> usize {
        let mut st = self.state.lock().await;
        let now = Utc::now();
        let mut restored = 0;

        for pane in panes {
            if st.panes.is_claimed(&pane.handle) {
                continue;
            }
            let Some(record) = st.resolve_record(session, &pane.name, &pane.handle) else {
                tracing::debug!(
                    session,
                    name = %pane.name,
                    pane = %pane.handle,
                    "no persisted thread"
                );
                continue;
            };
            // Never steal a thread from a pane restored earlier in this pass.
            let stolen = record
                .pane_handle
                .as_deref()
                .is_some_and(|h| h != pane.handle && st.panes.is_claimed(h));
            if stolen {
                tracing::warn!(
                    session,
                    name = %pane.name,
                    pane = %pane.handle,
                    "duplicate live pane for identity, skipped"
                );
                continue;
            }

            match st.attach(&record, session, &pane.name, &pane.handle, now) {
                Ok(()) => {
                    restored += 1;
                    tracing::info!(
                        session,
                        name = %pane.name,
                        pane = %pane.handle,
                        "restored live pane"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        session,
                        name = %pane.name,
                        pane = %pane.handle,
                        "restore failed: {e}"
                    );
                }
            }
        }
        restored
    }

    /// Drop bindings older than `ttl`. Returns the reaped handles.
    pub async fn sweep_expired(&self, ttl: chrono::Duration) -> Vec<String> {
        self.state.lock().await.panes.sweep_expired(Utc::now(), ttl)
    }

    pub async fn health(&self) -> Health {
        let st = self.state.lock().await;
        Health {
            bindings: st.panes.len(),
            records: st.threads.len(),
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }

    async fn open_thread(
        &self,
        st: &mut BridgeState,
        session: &str,
        name: &str,
        pane: &str,
    ) -> Result<String, BridgeError> {
        let thread_ref = self
            .chat
            .post_message(&self.channel_ref, &notice::new_session(name))
            .await?;

        let now = Utc::now();
        st.threads.record_thread(ThreadRecord {
            name: name.to_string(),
            session: session.to_string(),
            pane_handle: Some(pane.to_string()),
            thread_ref: thread_ref.clone(),
            channel_ref: self.channel_ref.clone(),
            updated_at: now,
        })?;
        st.establish(PaneBinding::new(
            pane,
            session,
            name,
            &thread_ref,
            &self.channel_ref,
            now,
        ))?;

        tracing::info!(session, name, pane, thread = %thread_ref, "thread created");
        Ok(thread_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatError;
    use async_trait::async_trait;
    use slackmux_core::snapshot::Records;
    use slackmux_core::{MemorySnapshot, SnapshotError, SnapshotStore};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Post {
        thread_ref: Option<String>,
        text: String,
    }

    #[derive(Default)]
    struct FakeChat {
        posts: StdMutex<Vec<Post>>,
        next_ts: AtomicU64,
        fail: AtomicBool,
    }

    impl FakeChat {
        fn posts(&self) -> Vec<Post> {
            self.posts.lock().expect("lock").clone()
        }

        fn top_level_count(&self) -> usize {
            self.posts().iter().filter(|p| p.thread_ref.is_none()).count()
        }

        fn fail(&self, on: bool) {
            self.fail.store(on, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ChatClient for FakeChat {
        async fn post_message(&self, _channel: &str, text: &str) -> Result<String, ChatError> {
            tokio::task::yield_now().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChatError::Transport("connection reset".into()));
            }
            let n = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
            self.posts.lock().expect("lock").push(Post {
                thread_ref: None,
                text: text.to_string(),
            });
            Ok(format!("1700000000.{n:06}"))
        }

        async fn post_threaded_message(
            &self,
            _channel: &str,
            thread_ref: &str,
            text: &str,
        ) -> Result<(), ChatError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChatError::Api("ratelimited".into()));
            }
            self.posts.lock().expect("lock").push(Post {
                thread_ref: Some(thread_ref.to_string()),
                text: text.to_string(),
            });
            Ok(())
        }
    }

    struct ReadOnlySnapshot;

    impl SnapshotStore for ReadOnlySnapshot {
        fn load(&self) -> Result<Records, SnapshotError> {
            Ok(Records::new())
        }
        fn save(&self, _records: &Records) -> Result<(), SnapshotError> {
            Err(SnapshotError::Io(std::io::Error::other("read-only filesystem")))
        }
    }

    fn bridge() -> (Bridge, Arc<FakeChat>) {
        let chat = Arc::new(FakeChat::default());
        let threads = ThreadStore::open(Box::new(MemorySnapshot::new()));
        (Bridge::new(threads, chat.clone(), "C1"), chat)
    }

    #[tokio::test]
    async fn create_thread_records_and_binds() {
        let (bridge, chat) = bridge();
        let thread = bridge
            .create_thread("main", "api", "%1")
            .await
            .expect("create");

        let st = bridge.state().await;
        assert_eq!(st.panes.lookup_by_handle("%1").expect("bound").thread_ref, thread);
        assert_eq!(
            st.threads.exact_lookup("main", "api", "%1").expect("recorded").thread_ref,
            thread
        );
        assert_eq!(chat.posts()[0].text, "*[api]* New Claude Code session");
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_same_triple() {
        let (bridge, chat) = bridge();
        let first = bridge.connect("main", "api", "%1").await.expect("first");
        let second = bridge.connect("main", "api", "%1").await.expect("second");

        assert_eq!(first.status, ConnectStatus::Created);
        assert_eq!(second.status, ConnectStatus::Reconnected);
        assert_eq!(first.thread_ref, second.thread_ref);
        assert_eq!(chat.top_level_count(), 1);
        assert_eq!(bridge.state().await.threads.len(), 1);
    }

    #[tokio::test]
    async fn connect_with_new_handle_migrates_key() {
        let (bridge, chat) = bridge();
        let created = bridge.connect("main", "api", "%1").await.expect("create");
        bridge.close("%1", None, None, false).await.expect("close");

        let again = bridge.connect("main", "api", "%7").await.expect("reconnect");
        assert_eq!(again.status, ConnectStatus::Reconnected);
        assert_eq!(again.thread_ref, created.thread_ref);
        assert_eq!(chat.top_level_count(), 1);

        let st = bridge.state().await;
        assert!(st.threads.exact_lookup("main", "api", "%1").is_none());
        assert!(st.threads.exact_lookup("main", "api", "%7").is_some());
        assert_eq!(st.threads.len(), 1);
        let last = chat.posts().pop().expect("posted");
        assert_eq!(last.text, "*[api]* Reconnected");
    }

    #[tokio::test]
    async fn concurrent_connects_create_one_thread() {
        let (bridge, chat) = bridge();
        let (a, b) = tokio::join!(
            bridge.connect("main", "api", "%1"),
            bridge.connect("main", "api", "%1"),
        );
        let (a, b) = (a.expect("a"), b.expect("b"));
        assert_eq!(a.thread_ref, b.thread_ref);
        assert_eq!(chat.top_level_count(), 1);
    }

    #[tokio::test]
    async fn failed_create_changes_nothing() {
        let (bridge, chat) = bridge();
        chat.fail(true);
        let err = bridge.connect("main", "api", "%1").await.expect_err("fails");
        assert!(matches!(err, BridgeError::ExternalFailure(_)));

        let st = bridge.state().await;
        assert!(st.panes.is_empty());
        assert!(st.threads.is_empty());
    }

    #[tokio::test]
    async fn failed_reconnect_notice_leaves_pane_unbound() {
        let (bridge, chat) = bridge();
        bridge.connect("main", "api", "%1").await.expect("create");
        bridge.close("%1", None, None, false).await.expect("close");

        chat.fail(true);
        let err = bridge.connect("main", "api", "%2").await.expect_err("fails");
        assert!(matches!(err, BridgeError::ExternalFailure(_)));

        let st = bridge.state().await;
        assert!(st.panes.is_empty());
        assert!(st.threads.exact_lookup("main", "api", "%1").is_some(), "key not migrated");
    }

    #[tokio::test]
    async fn persistence_failure_leaves_pane_unbound() {
        let chat = Arc::new(FakeChat::default());
        let bridge = Bridge::new(ThreadStore::open(Box::new(ReadOnlySnapshot)), chat, "C1");
        let err = bridge
            .create_thread("main", "api", "%1")
            .await
            .expect_err("save fails");
        assert!(matches!(err, BridgeError::PersistenceFailure(_)));
        assert!(bridge.state().await.panes.is_empty());
    }

    #[tokio::test]
    async fn invalid_handle_makes_no_calls() {
        let (bridge, chat) = bridge();
        for result in [
            bridge.connect("main", "api", "main:0.1").await.map(|_| ()),
            bridge.create_thread("main", "api", "1").await.map(|_| ()),
            bridge
                .notify("%x", None, None, "hi", NotifyKind::Notification)
                .await,
        ] {
            assert!(matches!(result, Err(BridgeError::InvalidHandle(_))));
        }
        assert!(chat.posts().is_empty());
    }

    #[tokio::test]
    async fn notify_formats_by_kind() {
        let (bridge, chat) = bridge();
        let thread = bridge.create_thread("main", "api", "%1").await.expect("create");

        bridge
            .notify("%1", None, None, "Allow Bash(ls)?", NotifyKind::Notification)
            .await
            .expect("notify");
        bridge
            .notify("%1", None, None, "All tests pass", NotifyKind::Stop)
            .await
            .expect("stop");

        let posts = chat.posts();
        assert_eq!(posts[1].thread_ref.as_deref(), Some(thread.as_str()));
        assert_eq!(posts[1].text, "*[api]* Allow Bash(ls)?");
        assert_eq!(posts[2].text, "*[api]* Claude finished:\nAll tests pass");
    }

    #[tokio::test]
    async fn notify_auto_reconnects_silently() {
        let (bridge, chat) = bridge();
        let thread = bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.close("%1", None, None, false).await.expect("close");

        bridge
            .notify("%4", Some("main"), Some("api"), "waiting", NotifyKind::Notification)
            .await
            .expect("notify");

        let posts = chat.posts();
        let last = posts.last().expect("posted");
        assert_eq!(last.text, "*[api]* waiting");
        assert!(!posts.iter().any(|p| p.text.ends_with("Reconnected")));

        let st = bridge.state().await;
        assert_eq!(st.panes.lookup_by_handle("%4").expect("bound").thread_ref, thread);
        assert!(st.threads.exact_lookup("main", "api", "%4").is_some());
    }

    #[tokio::test]
    async fn notify_without_binding_or_identity_is_no_binding() {
        let (bridge, _) = bridge();
        let err = bridge
            .notify("%3", None, None, "hi", NotifyKind::Stop)
            .await
            .expect_err("unbound");
        assert!(matches!(err, BridgeError::NoBinding(_)));

        let err = bridge
            .notify("%3", Some("main"), Some("ghost"), "hi", NotifyKind::Stop)
            .await
            .expect_err("unknown identity");
        assert!(matches!(err, BridgeError::NoBinding(_)));
    }

    #[tokio::test]
    async fn rename_moves_records_and_binding() {
        let (bridge, chat) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");

        assert!(bridge.rename("%1", "main", "api", "gateway").await.expect("rename"));
        assert_eq!(
            chat.posts().last().expect("posted").text,
            "*[gateway]* Renamed from _api_"
        );

        let st = bridge.state().await;
        assert_eq!(st.panes.lookup_by_handle("%1").expect("bound").name, "gateway");
        assert!(st.threads.exact_lookup("main", "gateway", "%1").is_some());
        assert!(st.threads.exact_lookup("main", "api", "%1").is_none());
    }

    #[tokio::test]
    async fn rename_unknown_identity_is_noop() {
        let (bridge, chat) = bridge();
        assert!(!bridge.rename("%9", "main", "a", "b").await.expect("rename"));
        assert!(chat.posts().is_empty());
    }

    #[tokio::test]
    async fn close_non_permanent_keeps_records() {
        let (bridge, chat) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");

        let out = bridge.close("%1", None, None, false).await.expect("close");
        assert_eq!(
            out,
            CloseOutcome {
                was_bound: true,
                purged: false,
            }
        );
        assert_eq!(chat.posts().last().expect("posted").text, "*[api]* Session closed");

        let st = bridge.state().await;
        assert!(st.panes.is_empty());
        assert_eq!(st.threads.len(), 1);
    }

    #[tokio::test]
    async fn permanent_close_purges_every_variant() {
        let (bridge, _) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.create_thread("main", "api", "%2").await.expect("create");
        bridge.create_thread("main", "web", "%3").await.expect("create");

        let out = bridge.close("%2", None, None, true).await.expect("close");
        assert!(out.purged);

        let st = bridge.state().await;
        assert_eq!(st.threads.len(), 1);
        assert!(st.threads.exact_lookup("main", "web", "%3").is_some());
        assert!(st.panes.lookup_by_handle("%1").is_some(), "other panes stay bound");
    }

    #[tokio::test]
    async fn permanent_close_without_binding_still_purges() {
        let (bridge, chat) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.close("%1", None, None, false).await.expect("close");
        let posted = chat.posts().len();

        let out = bridge
            .close("%1", Some("main"), Some("api"), true)
            .await
            .expect("close");
        assert_eq!(
            out,
            CloseOutcome {
                was_bound: false,
                purged: true,
            }
        );
        assert_eq!(chat.posts().len(), posted, "no notice without a binding");
        assert!(bridge.state().await.threads.is_empty());
    }

    #[tokio::test]
    async fn permanent_close_forgets_disconnected_warning() {
        let (bridge, _) = bridge();
        let thread = bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.close("%1", None, None, false).await.expect("close");
        bridge.state().await.warned.insert(thread.clone());

        bridge
            .close("%1", Some("main"), Some("api"), true)
            .await
            .expect("close");
        let st = bridge.state().await;
        assert!(st.threads.is_empty());
        assert!(!st.warned.contains(&thread));
    }

    #[tokio::test]
    async fn restore_binds_live_panes_without_posting() {
        let (bridge, chat) = bridge();
        let api = bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.create_thread("main", "web", "%2").await.expect("create");
        {
            let mut st = bridge.state().await;
            st.panes.unbind("%1");
            st.panes.unbind("%2");
        }
        let posted = chat.posts().len();

        let live = vec![
            TaggedPane {
                handle: "%5".into(),
                name: "api".into(),
            },
            TaggedPane {
                handle: "%2".into(),
                name: "web".into(),
            },
            TaggedPane {
                handle: "%6".into(),
                name: "new".into(),
            },
        ];
        assert_eq!(bridge.restore_live_panes("main", &live).await, 2);
        assert_eq!(chat.posts().len(), posted);

        let st = bridge.state().await;
        assert_eq!(st.panes.lookup_by_handle("%5").expect("api").thread_ref, api);
        assert!(st.panes.lookup_by_handle("%2").is_some());
        assert!(st.panes.lookup_by_handle("%6").is_none());
        assert!(st.threads.exact_lookup("main", "api", "%5").is_some());
    }

    #[tokio::test]
    async fn restore_skips_duplicate_live_pane() {
        let (bridge, _) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.state().await.panes.unbind("%1");

        let live = vec![
            TaggedPane {
                handle: "%1".into(),
                name: "api".into(),
            },
            TaggedPane {
                handle: "%8".into(),
                name: "api".into(),
            },
        ];
        assert_eq!(bridge.restore_live_panes("main", &live).await, 1);
        let st = bridge.state().await;
        assert!(st.panes.lookup_by_handle("%1").is_some());
        assert!(st.panes.lookup_by_handle("%8").is_none());
    }

    #[tokio::test]
    async fn health_counts() {
        let (bridge, _) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");
        bridge.create_thread("main", "web", "%2").await.expect("create");
        bridge.close("%2", None, None, false).await.expect("close");

        let health = bridge.health().await;
        assert_eq!(health.bindings, 1);
        assert_eq!(health.records, 2);
        assert!(health.uptime_secs >= 0.0);
    }

    #[tokio::test]
    async fn sweep_reaps_only_expired() {
        let (bridge, _) = bridge();
        bridge.create_thread("main", "api", "%1").await.expect("create");
        {
            let mut st = bridge.state().await;
            let binding = st.panes.lookup_by_handle_mut("%1").expect("bound");
            binding.created_at -= chrono::Duration::hours(25);
        }
        bridge.create_thread("main", "web", "%2").await.expect("create");

        let reaped = bridge.sweep_expired(chrono::Duration::hours(24)).await;
        assert_eq!(reaped, vec!["%1".to_string()]);
        assert_eq!(bridge.health().await.bindings, 1);
    }
}
