//! Domain errors for the dynacache system.

use thiserror::Error;

use super::models::EntityKind;

/// Errors surfaced by the cache subsystem and its collaborators.
///
/// Lookup and invalidation never produce these; they only come out of
/// collaborator calls (store queries, builders, the notification transport).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Failed to build {id}: {reason}")]
    BuildFailure { id: String, reason: String },

    #[error("Notification transport failure: {0}")]
    TransportFailure(String),

    #[error("Malformed change event: {0}")]
    MalformedEvent(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl CacheError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a `BuildFailure` error.
    pub fn build_failure(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::BuildFailure {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same call later could succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransportFailure(_) | Self::Database(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedEvent(err.to_string())
    }
}
