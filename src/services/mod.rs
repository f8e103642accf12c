//! Cache services.

pub mod batch_resolver;
pub mod cache_service;
pub mod change_listener;
pub mod composite_cache;
pub mod entity_cache;
pub mod fingerprint;
pub mod list_cache;
pub mod runtime;

pub use batch_resolver::{resolve_batch, resolve_or_build, BatchFailure, BatchOutcome};
pub use cache_service::{
    CacheDependencies, CacheService, CacheStatsReport, CleanupReport, InvalidateRequest, InvalidationReport,
    ListenerReport, PreloadReport, RefreshReport,
};
pub use change_listener::{ChangeHandler, ChangeListener, ListenerHandle, ListenerSettings, ListenerState, ListenerStats};
pub use composite_cache::{CompositeCache, CompositeCacheStats, CompositeKey};
pub use entity_cache::{CacheKey, EntityCache, EntityCacheStats};
pub use fingerprint::{fingerprint, fingerprint_parts};
pub use list_cache::{ListCache, ListCacheStats, ListCacheStatus};
pub use runtime::{AgentRuntime, RuntimeBuilder, ToolRuntime};
