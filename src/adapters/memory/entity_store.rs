//! In-process entity store and builder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::models::{CallContext, EntityKind, EntitySnapshot, Versioned};
use crate::domain::ports::{EntityStore, InstanceBuilder};

struct StoredEntity<D> {
    definition: D,
    snapshot: EntitySnapshot,
    active: bool,
}

/// Entity store backed by a map. Every write bumps `last_modified`
/// the way the database's `updated_at` trigger does.
pub struct InMemoryEntityStore<D> {
    kind: EntityKind,
    rows: RwLock<BTreeMap<String, StoredEntity<D>>>,
    loads: AtomicUsize,
    unavailable: AtomicBool,
}

impl<D> InMemoryEntityStore<D>
where
    D: Clone + Send + Sync,
{
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            rows: RwLock::new(BTreeMap::new()),
            loads: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Insert or replace a row and return its new snapshot.
    pub async fn upsert(&self, id: &str, definition: D) -> EntitySnapshot {
        self.write_row(id, definition, None).await
    }

    pub async fn upsert_owned(&self, id: &str, definition: D, owner_ref: &str) -> EntitySnapshot {
        self.write_row(id, definition, Some(owner_ref.to_string())).await
    }

    /// Store a definition under the snapshot it reports about itself,
    /// keeping its own `updated_at` instead of generating one.
    pub async fn insert_versioned(&self, definition: D) -> EntitySnapshot
    where
        D: Versioned,
    {
        let snapshot = definition.snapshot();
        self.rows.write().await.insert(
            snapshot.id.clone(),
            StoredEntity {
                definition,
                snapshot: snapshot.clone(),
                active: true,
            },
        );
        snapshot
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.rows.write().await.remove(id).is_some()
    }

    pub async fn set_active(&self, id: &str, active: bool) {
        if let Some(row) = self.rows.write().await.get_mut(id) {
            row.active = active;
        }
    }

    pub async fn snapshot_of(&self, id: &str) -> Option<EntitySnapshot> {
        self.rows.read().await.get(id).map(|row| row.snapshot.clone())
    }

    /// Make every call fail with a database error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn write_row(&self, id: &str, definition: D, owner_ref: Option<String>) -> EntitySnapshot {
        let mut rows = self.rows.write().await;
        let previous = rows.get(id).and_then(|row| row.snapshot.last_modified);
        let snapshot = EntitySnapshot {
            id: id.to_string(),
            last_modified: Some(next_timestamp(previous)),
            owner_ref,
        };
        rows.insert(
            id.to_string(),
            StoredEntity {
                definition,
                snapshot: snapshot.clone(),
                active: true,
            },
        );
        snapshot
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Database(format!("{} store unavailable", self.kind)));
        }
        Ok(())
    }
}

fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev >= now => prev + chrono::Duration::milliseconds(1),
        _ => now,
    }
}

#[async_trait]
impl<D> EntityStore<D> for InMemoryEntityStore<D>
where
    D: Clone + Send + Sync,
{
    async fn snapshot(&self, id: &str) -> CacheResult<Option<EntitySnapshot>> {
        self.check_available()?;
        Ok(self
            .rows
            .read()
            .await
            .get(id)
            .filter(|row| row.active)
            .map(|row| row.snapshot.clone()))
    }

    async fn load(&self, id: &str) -> CacheResult<Option<D>> {
        self.check_available()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .read()
            .await
            .get(id)
            .filter(|row| row.active)
            .map(|row| row.definition.clone()))
    }

    async fn list_active_ids(&self) -> CacheResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|(_, row)| row.active)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// Builder wrapping a synchronous closure, counting invocations.
pub struct FnBuilder<F> {
    build: F,
    calls: AtomicUsize,
}

impl<F> FnBuilder<F> {
    pub fn new<D, I>(build: F) -> Self
    where
        F: Fn(&D, &CallContext) -> CacheResult<I>,
    {
        Self {
            build,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<D, I, F> InstanceBuilder<D, I> for FnBuilder<F>
where
    D: Send + Sync,
    I: Send,
    F: Fn(&D, &CallContext) -> CacheResult<I> + Send + Sync,
{
    async fn build(&self, definition: &D, ctx: &CallContext) -> CacheResult<I> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.build)(definition, ctx)
    }
}
