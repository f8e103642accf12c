//! PostgreSQL adapters: connection pool, entity stores and LISTEN/NOTIFY.

pub mod connection;
pub mod entity_store;
pub mod notifications;

pub use connection::{create_pool, redact, verify_connection, ConnectionError, PoolConfig};
pub use entity_store::{PgAgentStore, PgToolStore};
pub use notifications::PgNotificationSource;
