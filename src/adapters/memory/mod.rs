//! In-process adapters used by tests, benchmarks and local runs.

pub mod entity_store;
pub mod notification;

pub use entity_store::{FnBuilder, InMemoryEntityStore};
pub use notification::InMemoryNotificationSource;
