//! Configuration store port.

use async_trait::async_trait;

use crate::domain::errors::CacheResult;
use crate::domain::models::EntitySnapshot;

/// Read access to configuration rows of one entity kind.
#[async_trait]
pub trait EntityStore<D>: Send + Sync
where
    D: Send + Sync,
{
    /// Current version snapshot of an active entity.
    async fn snapshot(&self, id: &str) -> CacheResult<Option<EntitySnapshot>>;

    /// Snapshots for many ids. Unknown or inactive ids are omitted.
    async fn snapshots(&self, ids: &[String]) -> CacheResult<Vec<EntitySnapshot>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = self.snapshot(id).await? {
                found.push(snapshot);
            }
        }
        Ok(found)
    }

    /// Load the full definition handed to builders.
    async fn load(&self, id: &str) -> CacheResult<Option<D>>;

    /// Ids of every active entity, in a stable order.
    async fn list_active_ids(&self) -> CacheResult<Vec<String>>;
}
