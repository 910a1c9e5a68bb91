//! Durable `(session, name, pane)` -> thread table.
//!
//! Every mutation builds the next table, writes it through the snapshot
//! store, and only then swaps it in. A failed write leaves the in-memory
//! table exactly as it was and surfaces `PersistenceFailure`.
//!
//! ## Fallback lookup
//!
//! tmux assigns a fresh pane id every time a pane is reopened, so lookups by
//! the exact triple miss after churn. `fallback_lookup_by_name` ignores the
//! handle and ranks candidates:
//!
//! 1. records whose handle is not claimed by a live binding
//! 2. most recent `updated_at`
//! 3. lexicographically smallest key

use std::cmp::Reverse;

use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::pane_map::ActivePaneMap;
use crate::snapshot::{Records, SnapshotStore};
use crate::types::{ThreadRecord, composite_key};

pub struct ThreadStore {
    records: Records,
    snapshot: Box<dyn SnapshotStore>,
}

impl ThreadStore {
    /// Load the table from `snapshot`. An unreadable snapshot starts empty.
    pub fn open(snapshot: Box<dyn SnapshotStore>) -> Self {
        let records = match snapshot.load() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("thread map unreadable, starting empty: {e}");
                Records::new()
            }
        };
        tracing::debug!(records = records.len(), "thread map loaded");
        Self { records, snapshot }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ThreadRecord> {
        self.records.values()
    }

    // ─── Lookups ──────────────────────────────────────────────────

    pub fn exact_lookup(
        &self,
        session: &str,
        name: &str,
        pane_handle: &str,
    ) -> Option<&ThreadRecord> {
        self.records
            .get(&composite_key(session, name, Some(pane_handle)))
            .filter(|r| r.is_identity(session, name))
    }

    pub fn fallback_lookup_by_name(
        &self,
        session: &str,
        name: &str,
        active: &ActivePaneMap,
    ) -> Option<&ThreadRecord> {
        self.records
            .values()
            .filter(|r| r.is_identity(session, name))
            .max_by_key(|r| {
                let unclaimed = r
                    .pane_handle
                    .as_deref()
                    .is_none_or(|handle| !active.is_claimed(handle));
                (unclaimed, r.updated_at, Reverse(r.key()))
            })
    }

    pub fn lookup_by_thread_ref(&self, thread_ref: &str) -> Option<&ThreadRecord> {
        self.records.values().find(|r| r.thread_ref == thread_ref)
    }

    // ─── Mutations ────────────────────────────────────────────────

    /// Write or overwrite the record under its composite key.
    pub fn record_thread(&mut self, record: ThreadRecord) -> Result<(), BridgeError> {
        let mut next = self.records.clone();
        next.insert(record.key(), record);
        self.commit(next)
    }

    /// Re-key `from` under `new_handle` in a single snapshot write.
    pub fn migrate_handle(
        &mut self,
        from: &ThreadRecord,
        new_handle: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        let mut next = self.records.clone();
        next.remove(&from.key());
        let moved = ThreadRecord {
            pane_handle: Some(new_handle.to_string()),
            updated_at: now,
            ..from.clone()
        };
        next.insert(moved.key(), moved);
        self.commit(next)
    }

    pub fn remove_exact(
        &mut self,
        session: &str,
        name: &str,
        pane_handle: &str,
    ) -> Result<bool, BridgeError> {
        let key = composite_key(session, name, Some(pane_handle));
        if !self.records.contains_key(&key) {
            return Ok(false);
        }
        let mut next = self.records.clone();
        next.remove(&key);
        self.commit(next)?;
        Ok(true)
    }

    /// Remove every record for `(session, name)` regardless of pane handle.
    pub fn remove_all_by_name(&mut self, session: &str, name: &str) -> Result<bool, BridgeError> {
        let mut next = self.records.clone();
        next.retain(|_, r| !r.is_identity(session, name));
        if next.len() == self.records.len() {
            return Ok(false);
        }
        self.commit(next)?;
        Ok(true)
    }

    /// Move every record under `old_name` to `new_name`, keeping handles and
    /// thread coordinates. Returns `false` without writing if none existed.
    pub fn rename(
        &mut self,
        session: &str,
        old_name: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BridgeError> {
        let moved: Vec<ThreadRecord> = self
            .records
            .values()
            .filter(|r| r.is_identity(session, old_name))
            .map(|r| ThreadRecord {
                name: new_name.to_string(),
                updated_at: now,
                ..r.clone()
            })
            .collect();
        if moved.is_empty() {
            return Ok(false);
        }

        let mut next = self.records.clone();
        next.retain(|_, r| !r.is_identity(session, old_name));
        for record in moved {
            next.insert(record.key(), record);
        }
        self.commit(next)?;
        Ok(true)
    }

    fn commit(&mut self, next: Records) -> Result<(), BridgeError> {
        self.snapshot.save(&next)?;
        self.records = next;
        Ok(())
    }
}
