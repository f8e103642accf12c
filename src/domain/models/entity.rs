//! Entity identity, configuration snapshots and call context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of configuration entity held in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agent,
    Tool,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Tool => "tool",
        }
    }

    /// Name of the table holding rows of this kind.
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Tool => "tools",
        }
    }

    /// Resolve a table name from a change notification.
    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "agents" => Some(Self::Agent),
            "tools" => Some(Self::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of a configuration row the cache cares about.
///
/// `last_modified` is maintained by the store (an `updated_at` trigger), so a
/// new value means the configuration changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub owner_ref: Option<String>,
}

impl EntitySnapshot {
    pub fn new(id: impl Into<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            last_modified,
            owner_ref: None,
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner_ref: impl Into<String>) -> Self {
        self.owner_ref = Some(owner_ref.into());
        self
    }
}

/// Anything that can describe itself as an [`EntitySnapshot`].
pub trait Versioned {
    fn snapshot(&self) -> EntitySnapshot;
}

impl Versioned for EntitySnapshot {
    fn snapshot(&self) -> EntitySnapshot {
        self.clone()
    }
}

/// Per-request parameters that produce distinct instances of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallContext {
    /// Model override requested by the caller (`None` uses the configured model).
    pub model_override: Option<String>,
    /// Acting user; `None` means a global, shared instance.
    pub actor_id: Option<String>,
    pub debug: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn model_segment(&self) -> &str {
        self.model_override.as_deref().unwrap_or("default")
    }

    pub fn actor_segment(&self) -> &str {
        self.actor_id.as_deref().unwrap_or("global")
    }

    /// Deterministic rendering used inside cache keys.
    pub fn context_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.model_segment(),
            self.actor_segment(),
            self.debug
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_tables() {
        assert_eq!(EntityKind::Agent.table(), "agents");
        assert_eq!(EntityKind::from_table("tools"), Some(EntityKind::Tool));
        assert_eq!(EntityKind::from_table("teams"), None);
    }

    #[test]
    fn test_context_key_defaults() {
        assert_eq!(CallContext::new().context_key(), "default|global|false");
    }

    #[test]
    fn test_context_key_distinguishes_fields() {
        let base = CallContext::new().with_model("gpt-4.1-mini");
        let user = base.clone().with_actor("u1");
        let debug = base.clone().with_debug(true);

        assert_ne!(base.context_key(), user.context_key());
        assert_ne!(base.context_key(), debug.context_key());
        assert_eq!(user.context_key(), "gpt-4.1-mini|u1|false");
    }
}
