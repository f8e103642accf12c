//! Instance builder port.

use async_trait::async_trait;

use crate::domain::errors::CacheResult;
use crate::domain::models::CallContext;

/// Builds a runnable instance from a configuration definition.
///
/// Building is expensive and may fail; the cache only stores successful
/// results and never calls a builder while holding a lock.
#[async_trait]
pub trait InstanceBuilder<D, I>: Send + Sync
where
    D: Send + Sync,
{
    /// Build an instance of `definition` for the given call context.
    async fn build(&self, definition: &D, ctx: &CallContext) -> CacheResult<I>;
}
