//! Active pane map: live pane handle -> thread bindings.
//!
//! Entries are keyed by pane handle. A thread is claimed by at most one
//! handle at a time: binding a thread that another handle already holds
//! evicts the older claimant, since tmux never keeps two live panes for one
//! `(session, name)` identity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::types::{PaneBinding, validate_pane_handle};

/// Default sweep cadence for expired bindings.
pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

#[derive(Debug, Default)]
pub struct ActivePaneMap {
    bindings: HashMap<String, PaneBinding>,
}

impl ActivePaneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the binding for `binding.pane_handle`.
    ///
    /// Returns the handles whose claim on the same thread was evicted.
    pub fn bind(&mut self, binding: PaneBinding) -> Result<Vec<String>, BridgeError> {
        validate_pane_handle(&binding.pane_handle)?;

        let evicted: Vec<String> = self
            .bindings
            .iter()
            .filter(|(handle, b)| {
                b.thread_ref == binding.thread_ref && handle.as_str() != binding.pane_handle
            })
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in &evicted {
            self.bindings.remove(handle);
            tracing::debug!(
                pane = %handle,
                thread = %binding.thread_ref,
                new_pane = %binding.pane_handle,
                "evicted stale claim on thread"
            );
        }

        self.bindings.insert(binding.pane_handle.clone(), binding);
        Ok(evicted)
    }

    pub fn lookup_by_handle(&self, pane_handle: &str) -> Option<&PaneBinding> {
        self.bindings.get(pane_handle)
    }

    pub fn lookup_by_handle_mut(&mut self, pane_handle: &str) -> Option<&mut PaneBinding> {
        self.bindings.get_mut(pane_handle)
    }

    /// Linear scan; the table holds tens of entries.
    pub fn lookup_by_thread(&self, thread_ref: &str) -> Option<&PaneBinding> {
        self.bindings.values().find(|b| b.thread_ref == thread_ref)
    }

    pub fn unbind(&mut self, pane_handle: &str) -> bool {
        self.bindings.remove(pane_handle).is_some()
    }

    pub fn is_claimed(&self, pane_handle: &str) -> bool {
        self.bindings.contains_key(pane_handle)
    }

    /// Remove every binding older than `ttl`. Returns the reaped handles, sorted.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> Vec<String> {
        let mut expired: Vec<String> = self
            .bindings
            .values()
            .filter(|b| b.is_expired(now, ttl))
            .map(|b| b.pane_handle.clone())
            .collect();
        expired.sort();
        for handle in &expired {
            self.bindings.remove(handle);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaneBinding> {
        self.bindings.values()
    }
}
