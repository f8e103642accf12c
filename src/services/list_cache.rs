//! Short-lived snapshot of the ids of active entities.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::errors::CacheResult;
use crate::domain::models::EntityKind;

/// Whether a list snapshot is held and still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListCacheStatus {
    /// Nothing cached.
    Empty,
    /// A snapshot within its TTL.
    Active,
    /// A snapshot past its TTL, refreshed on the next read.
    Expired,
}

impl ListCacheStatus {
    /// Lowercase label used in tables and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

/// Counts reported by [`ListCache::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListCacheStats {
    /// Entity kind the list covers.
    pub kind: EntityKind,
    /// State of the held snapshot.
    pub status: ListCacheStatus,
    /// Ids in the held snapshot, expired or not.
    pub cached_ids: usize,
    /// Snapshot lifetime.
    pub ttl_seconds: u64,
}

struct ListSnapshot {
    ids: Vec<String>,
    expires_at: Instant,
}

/// One list of active ids per entity kind, replaced wholesale on refresh.
///
/// Kept as a single guarded slot rather than a TTL map so that an expired
/// snapshot can still be reported as [`ListCacheStatus::Expired`].
pub struct ListCache {
    kind: EntityKind,
    ttl: Duration,
    snapshot: RwLock<Option<ListSnapshot>>,
    /// Bumped under the write lock by every invalidation.
    generation: AtomicU64,
}

impl ListCache {
    /// Empty list cache for `kind` whose snapshots live for `ttl`.
    pub fn new(kind: EntityKind, ttl: Duration) -> Self {
        Self {
            kind,
            ttl,
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Return the cached ids, calling `refresh` when there is no live
    /// snapshot. A failed refresh is returned as-is and leaves nothing cached.
    ///
    /// When an invalidation lands while `refresh` is running, the ids are
    /// returned but not stored, so the next read queries again.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> CacheResult<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<Vec<String>>>,
    {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if Instant::now() < snapshot.expires_at {
                return Ok(snapshot.ids.clone());
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let ids = match refresh().await {
            Ok(ids) => dedup_in_order(ids),
            Err(e) => {
                *self.snapshot.write().await = None;
                tracing::warn!(kind = %self.kind, error = %e, "List refresh failed");
                return Err(e);
            }
        };

        let mut snapshot = self.snapshot.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(kind = %self.kind, "Id list invalidated during refresh, not caching");
            return Ok(ids);
        }

        tracing::debug!(kind = %self.kind, count = ids.len(), "Refreshed id list");
        *snapshot = Some(ListSnapshot {
            ids: ids.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(ids)
    }

    /// Force the next read to refresh.
    pub async fn invalidate(&self) {
        let mut snapshot = self.snapshot.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if snapshot.take().is_some() {
            tracing::debug!(kind = %self.kind, "Invalidated id list");
        }
    }

    /// State of the held snapshot.
    pub async fn status(&self) -> ListCacheStatus {
        match self.snapshot.read().await.as_ref() {
            None => ListCacheStatus::Empty,
            Some(s) if Instant::now() < s.expires_at => ListCacheStatus::Active,
            Some(_) => ListCacheStatus::Expired,
        }
    }

    /// Drop an expired snapshot. Returns whether one was dropped.
    pub async fn cleanup_expired(&self) -> bool {
        let mut snapshot = self.snapshot.write().await;
        if snapshot.as_ref().is_some_and(|s| Instant::now() >= s.expires_at) {
            *snapshot = None;
            return true;
        }
        false
    }

    /// Status, size and TTL of the list.
    pub async fn stats(&self) -> ListCacheStats {
        let status = self.status().await;
        let cached_ids = self.snapshot.read().await.as_ref().map_or(0, |s| s.ids.len());
        ListCacheStats {
            kind: self.kind,
            status,
            cached_ids,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

fn dedup_in_order(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
