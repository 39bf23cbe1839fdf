//! Cancellable one-shot timers keyed by (group, purpose).
//!
//! Arming a key that already has a pending timer aborts the old one first, so
//! at most one timer per key is ever live.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;

use crate::error::ScheduleError;
use crate::model::GroupId;
use crate::session::lock;

/// Purpose key for scheduled exam starts.
pub const SCHEDULED_START: &str = "scheduled_start";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScheduleKey {
    group: GroupId,
    purpose: String,
}

struct ScheduleEntry {
    id: u64,
    fire_at: DateTime<Utc>,
    handle: AbortHandle,
}

type Entries = Arc<Mutex<HashMap<ScheduleKey, ScheduleEntry>>>;

#[derive(Default)]
pub struct Scheduler {
    entries: Entries,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` at `fire_at`, replacing any pending timer for the key.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(
        &self,
        group: GroupId,
        purpose: &str,
        fire_at: DateTime<Utc>,
        action: F,
    ) -> Result<(), ScheduleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = (fire_at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or(ScheduleError::NotInFuture(fire_at))?;
        self.arm(group, purpose, fire_at, delay, action);
        Ok(())
    }

    fn arm<F, Fut>(
        &self,
        group: GroupId,
        purpose: &str,
        fire_at: DateTime<Utc>,
        delay: Duration,
        action: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = ScheduleKey {
            group,
            purpose: purpose.to_string(),
        };

        let mut entries = lock(&self.entries);
        let task_entries = Arc::clone(&self.entries);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut entries = lock(&task_entries);
                if entries.get(&task_key).is_some_and(|e| e.id == id) {
                    entries.remove(&task_key);
                }
            }
            tracing::info!(group = task_key.group, purpose = %task_key.purpose, "scheduled timer fired");
            action().await;
        });

        let entry = ScheduleEntry {
            id,
            fire_at,
            handle: task.abort_handle(),
        };
        if let Some(previous) = entries.insert(key, entry) {
            previous.handle.abort();
            tracing::debug!(group, purpose, "replaced pending timer");
        }
    }

    /// Cancel the pending timer for the key. Returns `false` if there was
    /// none, including when it already fired.
    pub fn cancel(&self, group: GroupId, purpose: &str) -> bool {
        let key = ScheduleKey {
            group,
            purpose: purpose.to_string(),
        };
        match lock(&self.entries).remove(&key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// When the pending timer for the key will fire.
    pub fn pending(&self, group: GroupId, purpose: &str) -> Option<DateTime<Utc>> {
        let key = ScheduleKey {
            group,
            purpose: purpose.to_string(),
        };
        lock(&self.entries).get(&key).map(|e| e.fire_at)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Abort every pending timer.
    pub fn shutdown(&self) {
        for (_, entry) in lock(&self.entries).drain() {
            entry.handle.abort();
        }
    }
}
