//! In-flight request tracking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::warn;

use clyppy_models::limits::{INFLIGHT_POLL_INTERVAL, INFLIGHT_WAIT_TIMEOUT, MAX_EMBEDS_PER_USER};

/// Process-local multisets of work in progress.
///
/// Counts rather than flags: the same source id can arrive again while a
/// first run drains, and each removal must take out exactly the one entry
/// its arrival added. Lock guards never cross an await.
#[derive(Debug, Default)]
pub struct InflightSets {
    embedding: Mutex<HashMap<String, usize>>,
    downloading: Mutex<HashMap<String, usize>>,
    embedding_users: Mutex<HashMap<u64, usize>>,
}

impl InflightSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any embed for `source_id` is running right now.
    pub fn is_embedding(&self, source_id: &str) -> bool {
        lock(&self.embedding).contains_key(source_id)
    }

    pub fn begin_embedding(&self, source_id: &str) {
        bump(&mut lock(&self.embedding), source_id.to_string());
    }

    pub fn end_embedding(&self, source_id: &str) {
        drop_one(&mut lock(&self.embedding), source_id);
    }

    pub fn is_downloading(&self, source_id: &str) -> bool {
        lock(&self.downloading).contains_key(source_id)
    }

    pub fn begin_download(&self, source_id: &str) {
        bump(&mut lock(&self.downloading), source_id.to_string());
    }

    pub fn end_download(&self, source_id: &str) {
        drop_one(&mut lock(&self.downloading), source_id);
    }

    /// Slash commands running for one user.
    pub fn user_count(&self, user_id: u64) -> usize {
        lock(&self.embedding_users)
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn begin_user(&self, user_id: u64) {
        bump(&mut lock(&self.embedding_users), user_id);
    }

    pub fn end_user(&self, user_id: u64) {
        drop_one(&mut lock(&self.embedding_users), &user_id);
    }

    /// Whether the user is at the concurrent slash-command cap.
    pub fn user_at_cap(&self, user_id: u64) -> bool {
        self.user_count(user_id) >= MAX_EMBEDS_PER_USER
    }

    /// Entries across the embed and download sets, for the shutdown drain.
    pub fn active_total(&self) -> usize {
        lock(&self.embedding).values().sum::<usize>()
            + lock(&self.downloading).values().sum::<usize>()
    }

    /// Wait until no embed for `source_id` is running, bounded by the
    /// standard in-flight timeout. Returns false on timeout.
    pub async fn wait_for_embedding_clear(&self, source_id: &str) -> bool {
        self.wait_for_embedding_clear_with(source_id, INFLIGHT_WAIT_TIMEOUT, INFLIGHT_POLL_INTERVAL)
            .await
    }

    pub async fn wait_for_embedding_clear_with(
        &self,
        source_id: &str,
        timeout: Duration,
        poll: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.is_embedding(source_id) {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
        true
    }
}

/// Poisoning cannot corrupt plain counters; keep serving after a panic
/// elsewhere instead of cascading it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn bump<K: Eq + Hash>(map: &mut HashMap<K, usize>, key: K) {
    *map.entry(key).or_insert(0) += 1;
}

fn drop_one<K, Q>(map: &mut HashMap<K, usize>, key: &Q)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + std::fmt::Debug + ?Sized,
{
    match map.get_mut(key) {
        Some(count) if *count > 1 => *count -= 1,
        Some(_) => {
            map.remove(key);
        }
        None => warn!(key = ?key, "in-flight removal for an absent entry"),
    }
}
