//! Per-kind cache of built instances.
//!
//! Entries are keyed by entity id, call context and configuration
//! fingerprint. A configuration change produces a new key, so entries are
//! never updated in place; stale variants simply stop being looked up and
//! age out through the TTL or an explicit invalidation.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::fingerprint::fingerprint;
use crate::domain::models::{CallContext, EntityKind, EntitySnapshot};

/// Identity of one cached instance.
///
/// Hashing uses the structured fields, so ids containing the display
/// separator cannot alias one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Id of the entity the instance was built from.
    pub entity_id: String,
    /// Call context the instance was built for.
    pub context: CallContext,
    /// Configuration fingerprint at build time.
    pub fingerprint: String,
}

impl CacheKey {
    /// Key for the instance built from `snapshot` under `ctx`.
    pub fn new(entity_id: &str, ctx: &CallContext, snapshot: &EntitySnapshot) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            context: ctx.clone(),
            fingerprint: fingerprint(snapshot),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.entity_id,
            self.context.context_key(),
            self.fingerprint
        )
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<I> {
    value: I,
    created_at: Instant,
    owner_ref: Option<String>,
}

impl<I> CacheEntry<I> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// Entry counts reported by [`EntityCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityCacheStats {
    /// Entity kind the cache holds.
    pub kind: EntityKind,
    /// Entries held, expired ones included.
    pub total: usize,
    /// Entries within their TTL.
    pub active: usize,
    /// Entries past their TTL not yet swept.
    pub expired: usize,
    /// Entry lifetime.
    pub ttl_seconds: u64,
}

/// TTL cache of built instances for one entity kind.
///
/// A plain guarded map rather than a TTL cache library: [`stats`] has to
/// count expired entries that have not been swept yet.
///
/// [`stats`]: EntityCache::stats
pub struct EntityCache<I> {
    kind: EntityKind,
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry<I>>>,
}

impl<I> EntityCache<I>
where
    I: Clone + Send + Sync,
{
    /// Empty cache for `kind` whose entries live for `ttl`.
    pub fn new(kind: EntityKind, ttl: Duration) -> Self {
        Self {
            kind,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Entity kind this cache holds.
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Entry lifetime.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up the instance built from `snapshot` for `ctx`.
    ///
    /// An expired entry found on the way is removed. A cold miss has no side
    /// effects.
    pub async fn get(&self, entity_id: &str, ctx: &CallContext, snapshot: &EntitySnapshot) -> Option<I> {
        let key = CacheKey::new(entity_id, ctx, snapshot);

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => {
                    tracing::debug!(kind = %self.kind, key = %key, "Cache miss");
                    return None;
                }
                Some(entry) if !entry.is_expired(Instant::now(), self.ttl) => {
                    tracing::debug!(kind = %self.kind, key = %key, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.is_expired(Instant::now(), self.ttl))
        {
            entries.remove(&key);
            tracing::debug!(kind = %self.kind, key = %key, "Removed expired entry");
        }
        None
    }

    /// Store a freshly built instance, replacing an entry with the same key.
    pub async fn put(&self, value: I, entity_id: &str, ctx: &CallContext, snapshot: &EntitySnapshot) {
        let key = CacheKey::new(entity_id, ctx, snapshot);
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            owner_ref: snapshot.owner_ref.clone(),
        };

        tracing::debug!(kind = %self.kind, key = %key, "Cached instance");
        self.entries.write().await.insert(key, entry);
    }

    /// Remove every variant of `entity_id`.
    pub async fn invalidate_entity(&self, entity_id: &str) -> usize {
        let removed = self.remove_where(|key, _| key.entity_id == entity_id).await.len();
        if removed > 0 {
            tracing::info!(kind = %self.kind, entity_id, removed, "Invalidated entity");
        }
        removed
    }

    /// Remove every variant of every id in `entity_ids`.
    pub async fn invalidate_entities(&self, entity_ids: &[String]) -> usize {
        if entity_ids.is_empty() {
            return 0;
        }
        let removed = self
            .remove_where(|key, _| entity_ids.iter().any(|id| *id == key.entity_id))
            .await
            .len();
        tracing::info!(kind = %self.kind, count = entity_ids.len(), removed, "Invalidated entities");
        removed
    }

    /// Remove entries owned by `owner_ref` or built for it as the acting user.
    ///
    /// Returns the removed keys so callers can drop whatever was assembled
    /// from those entities.
    pub async fn invalidate_owner(&self, owner_ref: &str) -> Vec<CacheKey> {
        let removed = self
            .remove_where(|key, entry| {
                entry.owner_ref.as_deref() == Some(owner_ref) || key.context.actor_id.as_deref() == Some(owner_ref)
            })
            .await;
        if !removed.is_empty() {
            tracing::info!(kind = %self.kind, owner_ref, removed = removed.len(), "Invalidated owner");
        }
        removed
    }

    /// Remove every entry. Returns how many were held.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        tracing::info!(kind = %self.kind, removed, "Cleared cache");
        removed
    }

    /// Drop every entry whose TTL has elapsed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let removed = self.remove_where(|_, entry| entry.is_expired(now, ttl)).await.len();
        if removed > 0 {
            tracing::debug!(kind = %self.kind, removed, "Swept expired entries");
        }
        removed
    }

    /// Entry counts split by expiry, computed without sweeping.
    pub async fn stats(&self) -> EntityCacheStats {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let expired = entries
            .values()
            .filter(|entry| entry.is_expired(now, self.ttl))
            .count();

        EntityCacheStats {
            kind: self.kind,
            total: entries.len(),
            active: entries.len() - expired,
            expired,
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    /// Rendered keys currently held, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().map(ToString::to_string).collect();
        keys.sort();
        keys
    }

    async fn remove_where<F>(&self, mut predicate: F) -> Vec<CacheKey>
    where
        F: FnMut(&CacheKey, &CacheEntry<I>) -> bool,
    {
        let mut entries = self.entries.write().await;
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|&(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        doomed
    }
}
