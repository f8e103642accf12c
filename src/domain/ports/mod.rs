//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async interfaces the cache depends on:
//! - InstanceBuilder: turns a configuration definition into a runnable instance
//! - EntityStore: reads configuration rows and their version snapshots
//! - NotificationSource: publish/subscribe channel carrying change events
//!
//! Adapters in `crate::adapters` implement these for PostgreSQL and for
//! in-process tests.

pub mod builder;
pub mod entity_store;
pub mod notification;

pub use builder::InstanceBuilder;
pub use entity_store::EntityStore;
pub use notification::{NotificationSource, NotificationStream};
