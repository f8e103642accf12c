//! Dynacache - configuration-aware cache for dynamically built agents and tools
//!
//! Agents, tools and teams are expensive to build from their stored
//! configuration. Dynacache keeps built instances keyed by entity id, call
//! context and a fingerprint of the stored version, and drops them when the
//! store reports a change over PostgreSQL LISTEN/NOTIFY.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports the cache depends on
//! - **Service Layer** (`services`): entity, composite and list caches, the
//!   batch resolver, the change listener and the `CacheService` facade
//! - **Adapters** (`adapters`): PostgreSQL and in-memory port implementations
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): the `dynacache` binary
//!
//! # Example
//!
//! ```ignore
//! use dynacache::services::{CacheDependencies, CacheService};
//!
//! let service = CacheService::new(&config.cache, deps);
//! let agent = service.get_agent("web_agent", &CallContext::new()).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{CacheError, CacheResult};
pub use domain::models::{CallContext, ChangeEvent, Config, EntityKind, EntitySnapshot};
pub use domain::ports::{EntityStore, InstanceBuilder, NotificationSource};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CacheService, ChangeListener, InvalidateRequest, ListenerState};
