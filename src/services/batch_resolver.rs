//! Resolution of many dependent entities in one pass.

use std::collections::HashMap;

use super::entity_cache::EntityCache;
use crate::domain::errors::CacheError;
use crate::domain::models::{CallContext, EntitySnapshot};
use crate::domain::ports::{EntityStore, InstanceBuilder};

/// A reference that could not be resolved.
#[derive(Debug)]
pub struct BatchFailure {
    pub entity_id: String,
    pub error: CacheError,
}

/// Result of [`resolve_or_build`].
#[derive(Debug)]
pub struct BatchOutcome<I> {
    /// Resolved instances in the caller's order.
    pub resolved: Vec<(String, I)>,
    pub failures: Vec<BatchFailure>,
    pub hits: usize,
    pub built: usize,
}

impl<I> BatchOutcome<I> {
    /// Instances without their ids, in order.
    pub fn into_instances(self) -> Vec<I> {
        self.resolved.into_iter().map(|(_, instance)| instance).collect()
    }
}

/// Look up every reference in the cache and return only the hits.
///
/// Each lookup takes the cache lock on its own, so concurrent invalidations
/// can interleave with a long batch.
pub async fn resolve_batch<I>(cache: &EntityCache<I>, refs: &[EntitySnapshot], ctx: &CallContext) -> HashMap<String, I>
where
    I: Clone + Send + Sync,
{
    let mut hits = HashMap::with_capacity(refs.len());
    for snapshot in refs {
        if let Some(instance) = cache.get(&snapshot.id, ctx, snapshot).await {
            hits.insert(snapshot.id.clone(), instance);
        }
    }

    tracing::debug!(
        kind = %cache.kind(),
        requested = refs.len(),
        hits = hits.len(),
        "Batch lookup"
    );
    hits
}

/// Resolve every reference, building misses one at a time.
///
/// A failed load or build is recorded in `failures` and does not stop the
/// remaining references.
pub async fn resolve_or_build<D, I>(
    cache: &EntityCache<I>,
    refs: &[EntitySnapshot],
    ctx: &CallContext,
    store: &dyn EntityStore<D>,
    builder: &dyn InstanceBuilder<D, I>,
) -> BatchOutcome<I>
where
    D: Send + Sync,
    I: Clone + Send + Sync,
{
    let mut cached = resolve_batch(cache, refs, ctx).await;
    let mut outcome = BatchOutcome {
        resolved: Vec::with_capacity(refs.len()),
        failures: Vec::new(),
        hits: cached.len(),
        built: 0,
    };

    for snapshot in refs {
        if let Some(instance) = cached.remove(&snapshot.id) {
            outcome.resolved.push((snapshot.id.clone(), instance));
            continue;
        }
        if outcome.resolved.iter().any(|(id, _)| *id == snapshot.id) {
            continue;
        }

        match build_one(cache, snapshot, ctx, store, builder).await {
            Ok(instance) => {
                outcome.built += 1;
                outcome.resolved.push((snapshot.id.clone(), instance));
            }
            Err(error) => {
                tracing::warn!(
                    kind = %cache.kind(),
                    entity_id = %snapshot.id,
                    error = %error,
                    "Skipping entity that failed to resolve"
                );
                outcome.failures.push(BatchFailure {
                    entity_id: snapshot.id.clone(),
                    error,
                });
            }
        }
    }

    outcome
}

async fn build_one<D, I>(
    cache: &EntityCache<I>,
    snapshot: &EntitySnapshot,
    ctx: &CallContext,
    store: &dyn EntityStore<D>,
    builder: &dyn InstanceBuilder<D, I>,
) -> Result<I, CacheError>
where
    D: Send + Sync,
    I: Clone + Send + Sync,
{
    let definition = store
        .load(&snapshot.id)
        .await?
        .ok_or_else(|| CacheError::not_found(cache.kind(), snapshot.id.clone()))?;

    let instance = builder
        .build(&definition, ctx)
        .await
        .map_err(|e| match e {
            CacheError::BuildFailure { .. } => e,
            other => CacheError::build_failure(snapshot.id.clone(), other),
        })?;

    cache.put(instance.clone(), &snapshot.id, ctx, snapshot).await;
    Ok(instance)
}
