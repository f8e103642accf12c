//! Cache of objects assembled from several entities (teams).
//!
//! A composite holds shared handles to its member instances; the members
//! themselves stay owned by the entity cache. Each entry remembers the
//! fingerprint every member had when it was assembled, and a lookup whose
//! members have moved on since counts as a miss.

use moka::future::Cache;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::fingerprint::fingerprint;
use crate::domain::errors::CacheResult;
use crate::domain::models::{CallContext, EntitySnapshot};

/// Sorted, de-duplicated member set plus the rendered call context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    members: Vec<String>,
    context: String,
}

impl CompositeKey {
    /// Key for `member_ids` in any order, under `ctx`.
    pub fn new(member_ids: &[String], ctx: &CallContext) -> Self {
        let mut members = member_ids.to_vec();
        members.sort();
        members.dedup();
        Self {
            members,
            context: ctx.context_key(),
        }
    }

    /// Member ids, sorted.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Whether `entity_id` is one of the members. Exact match only.
    pub fn contains(&self, entity_id: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(entity_id)).is_ok()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.members.join(","), self.context)
    }
}

struct CompositeEntry<I> {
    /// Member fingerprints at assembly time, `None` for members the store
    /// did not know.
    fingerprints: HashMap<String, Option<String>>,
    instances: HashMap<String, I>,
}

impl<I: Clone> CompositeEntry<I> {
    fn is_current(&self, current: &HashMap<String, String>) -> bool {
        self.fingerprints
            .iter()
            .all(|(id, stored)| stored.as_ref() == current.get(id))
    }

    fn ordered(&self, member_ids: &[String]) -> Vec<I> {
        unique_in_order(member_ids)
            .into_iter()
            .filter_map(|id| self.instances.get(id).cloned())
            .collect()
    }
}

/// Counts reported by [`CompositeCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompositeCacheStats {
    /// Live composite entries.
    pub cached_composites: usize,
    /// Member handles held across those entries.
    pub total_members: usize,
}

/// TTL cache of composites keyed by member set and call context.
pub struct CompositeCache<I> {
    ttl: Duration,
    entries: Cache<CompositeKey, Arc<CompositeEntry<I>>>,
    /// Bumped by every invalidation; a build that straddles one is not stored.
    generation: AtomicU64,
}

impl<I> CompositeCache<I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder().time_to_live(ttl).build();
        Self {
            ttl,
            entries,
            generation: AtomicU64::new(0),
        }
    }

    /// Entry lifetime.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the members of the composite over `member_ids`, resolving and
    /// caching it on a miss.
    ///
    /// `snapshots` are the current snapshots of the members; an entry built
    /// against other versions is rebuilt. Members come back in the order of
    /// `member_ids`. Members that fail to resolve are skipped with a
    /// warning, and nothing is cached unless at least one member resolved.
    pub async fn build<F, Fut>(
        &self,
        member_ids: &[String],
        snapshots: &[EntitySnapshot],
        ctx: &CallContext,
        mut resolve: F,
    ) -> Vec<I>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = CacheResult<I>>,
    {
        if member_ids.is_empty() {
            return Vec::new();
        }

        let key = CompositeKey::new(member_ids, ctx);
        let current: HashMap<String, String> = snapshots
            .iter()
            .map(|snapshot| (snapshot.id.clone(), fingerprint(snapshot)))
            .collect();

        if let Some(entry) = self.entries.get(&key).await {
            if entry.is_current(&current) {
                tracing::debug!(key = %key, "Composite cache hit");
                return entry.ordered(member_ids);
            }
            tracing::debug!(key = %key, "Composite member changed, rebuilding");
            self.entries.invalidate(&key).await;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let mut members = Vec::with_capacity(key.members.len());
        let mut instances = HashMap::with_capacity(key.members.len());
        for id in unique_in_order(member_ids) {
            match resolve(id.clone()).await {
                Ok(instance) => {
                    instances.insert(id.clone(), instance.clone());
                    members.push(instance);
                }
                Err(e) => {
                    tracing::warn!(member_id = %id, error = %e, "Skipping composite member");
                }
            }
        }

        if members.is_empty() {
            tracing::warn!(key = %key, "No composite members resolved, not caching");
            return members;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(key = %key, "Composite invalidated while building, not caching");
            return members;
        }

        let fingerprints = key
            .members
            .iter()
            .map(|id| (id.clone(), current.get(id).cloned()))
            .collect();
        let entry = Arc::new(CompositeEntry { fingerprints, instances });
        self.entries.insert(key.clone(), entry).await;

        // An invalidation that ran between the check above and the insert
        // may have missed the new entry.
        if self.generation.load(Ordering::SeqCst) != generation {
            self.entries.invalidate(&key).await;
            return members;
        }

        tracing::info!(key = %key, members = members.len(), "Cached composite");
        members
    }

    /// Drop every composite that has `entity_id` as a member.
    pub async fn invalidate_member(&self, entity_id: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let keys: Vec<Arc<CompositeKey>> = self
            .entries
            .iter()
            .filter(|(key, _)| key.contains(entity_id))
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.entries.invalidate(key.as_ref()).await;
        }

        if !keys.is_empty() {
            tracing::info!(entity_id, removed = keys.len(), "Invalidated composites");
        }
        keys.len()
    }

    /// Drop every composite. Returns how many were live.
    pub async fn clear(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let removed = self.entries.iter().count();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        removed
    }

    /// Run pending evictions. Returns an approximate count of expired
    /// entries dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let before = self.entries.entry_count();
        self.entries.run_pending_tasks().await;
        let dropped = before.saturating_sub(self.entries.entry_count());
        usize::try_from(dropped).unwrap_or(usize::MAX)
    }

    /// Live entries and the member handles they hold.
    pub async fn stats(&self) -> CompositeCacheStats {
        self.entries.run_pending_tasks().await;
        let (cached_composites, total_members) = self
            .entries
            .iter()
            .fold((0, 0), |(count, members), (_, entry)| (count + 1, members + entry.instances.len()));
        CompositeCacheStats {
            cached_composites,
            total_members,
        }
    }
}

fn unique_in_order(ids: &[String]) -> Vec<&String> {
    let mut out: Vec<&String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
