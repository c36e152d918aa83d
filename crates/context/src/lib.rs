//! Per-user conversation context store.
//!
//! Bounded in-memory message history keyed by platform user id, with a
//! display name slot and TTL-based eviction. All state lives in memory; no
//! operation touches I/O. Role prefixes ("User:"/"Bot:") are the caller's
//! responsibility, not the store's.
//!
//! Mutations are append/evict per key with no cross-key interaction, so a
//! `RwLock<HashMap>` is sufficient. The periodic sweep may race a per-request
//! access: it only ever removes entries already past the idle threshold, and
//! an entry swept just as its user returns is recreated on next access.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use chatforge_core::Clock;

/// One user's conversation state.
#[derive(Debug, Clone)]
pub struct UserContext {
    /// Role-prefixed messages, oldest first. Never longer than the store's
    /// history bound.
    pub messages: VecDeque<String>,

    /// Last time this user touched the store.
    pub last_activity: DateTime<Utc>,

    /// Registered display name, if the user introduced themselves.
    pub display_name: Option<String>,
}

impl UserContext {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            messages: VecDeque::new(),
            last_activity: now,
            display_name: None,
        }
    }
}

/// The store. Cheap to clone via `Arc`; share one per process.
pub struct ContextStore {
    contexts: RwLock<HashMap<String, UserContext>>,
    clock: Arc<dyn Clock>,
    max_history: usize,
    expiration: Duration,
}

impl ContextStore {
    /// Create a store with the given bounds.
    pub fn new(clock: Arc<dyn Clock>, max_history: usize, expiration_hours: u64) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            clock,
            max_history,
            expiration: Duration::hours(expiration_hours as i64),
        }
    }

    /// Append a message to the user's history, evicting the oldest entry if
    /// the bound is exceeded. Creates the context on first access and
    /// refreshes the activity timestamp.
    pub async fn append(&self, user_id: &str, message: impl Into<String>) {
        let now = self.clock.now();
        let mut contexts = self.contexts.write().await;
        let ctx = contexts
            .entry(user_id.to_string())
            .or_insert_with(|| UserContext::new(now));
        ctx.last_activity = now;
        ctx.messages.push_back(message.into());
        while ctx.messages.len() > self.max_history {
            ctx.messages.pop_front();
        }
    }

    /// The user's history joined in insertion order, ready to embed in a
    /// prompt. Empty string for an unknown user.
    pub async fn history(&self, user_id: &str) -> String {
        let now = self.clock.now();
        let mut contexts = self.contexts.write().await;
        match contexts.get_mut(user_id) {
            Some(ctx) => {
                ctx.last_activity = now;
                ctx.messages
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
            None => String::new(),
        }
    }

    /// Register the user's display name.
    pub async fn set_name(&self, user_id: &str, name: impl Into<String>) {
        let now = self.clock.now();
        let mut contexts = self.contexts.write().await;
        let ctx = contexts
            .entry(user_id.to_string())
            .or_insert_with(|| UserContext::new(now));
        ctx.last_activity = now;
        ctx.display_name = Some(name.into());
    }

    /// The user's registered display name, if any.
    pub async fn display_name(&self, user_id: &str) -> Option<String> {
        let contexts = self.contexts.read().await;
        contexts.get(user_id).and_then(|c| c.display_name.clone())
    }

    /// A snapshot of the user's context, creating it on first access and
    /// refreshing the activity timestamp.
    pub async fn get(&self, user_id: &str) -> UserContext {
        let now = self.clock.now();
        let mut contexts = self.contexts.write().await;
        let ctx = contexts
            .entry(user_id.to_string())
            .or_insert_with(|| UserContext::new(now));
        ctx.last_activity = now;
        ctx.clone()
    }

    /// Remove every context idle longer than the expiration window.
    /// Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, ctx| now - ctx.last_activity <= self.expiration);
        let removed = before - contexts.len();
        if removed > 0 {
            info!(removed, "Swept expired user contexts");
        }
        removed
    }

    /// Number of live contexts.
    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    /// Spawn the periodic sweep task. Runs for the life of the returned
    /// handle; call [`SweepHandle::stop`] (or drop it) to cancel.
    pub fn start_sweep(self: &Arc<Self>, interval: std::time::Duration) -> SweepHandle {
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would sweep an empty store.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep().await;
                debug!(removed, "Periodic context sweep completed");
            }
        });
        SweepHandle { task }
    }
}

/// Guard for the background sweep task. Aborts the task when stopped or
/// dropped.
pub struct SweepHandle {
    task: tokio::task::JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweep task.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
