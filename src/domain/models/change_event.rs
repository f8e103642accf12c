//! Change notifications emitted by the store's invalidation triggers.
//!
//! The trigger publishes JSON of the shape
//! `{"operation": "INSERT", "table": "agents", "id": "<row uuid>", "agent_id": "web_agent"}`.
//! `agent_id` is only set for the `agents` table, where it is the id the
//! cache is keyed on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{CacheError, CacheResult};

/// Row operation reported by the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Delete,
}

impl ChangeOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    operation: Option<String>,
    table: Option<String>,
    id: Option<String>,
    agent_id: Option<String>,
}

/// A decoded change event. Consumed once by the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub table: String,
    /// Id the caches are keyed on (`agent_id` for agents, row id otherwise).
    pub entity_id: String,
    /// Row id as reported by the trigger.
    pub row_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(operation: ChangeOperation, table: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation,
            table: table.into(),
            entity_id: entity_id.into(),
            row_id: None,
        }
    }

    /// Decode a raw notification payload.
    ///
    /// Unknown tables decode fine (the listener ignores them); unknown
    /// operations and missing ids are `MalformedEvent`.
    pub fn parse(payload: &str) -> CacheResult<Self> {
        let raw: RawPayload = serde_json::from_str(payload)?;

        let operation = raw
            .operation
            .as_deref()
            .ok_or_else(|| CacheError::MalformedEvent("missing operation".to_string()))?;
        let operation = ChangeOperation::parse_str(operation)
            .ok_or_else(|| CacheError::MalformedEvent(format!("unknown operation: {operation}")))?;

        let table = raw
            .table
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CacheError::MalformedEvent("missing table".to_string()))?;

        let entity_id = if table == "agents" {
            raw.agent_id.clone().or_else(|| raw.id.clone())
        } else {
            raw.id.clone()
        }
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CacheError::MalformedEvent(format!("missing id for table {table}")))?;

        Ok(Self {
            operation,
            table,
            entity_id,
            row_id: raw.id,
        })
    }

    /// Encode in the trigger's wire format.
    pub fn to_payload(&self) -> String {
        let agent_id = (self.table == "agents").then(|| self.entity_id.clone());
        serde_json::json!({
            "operation": self.operation.as_str(),
            "table": self.table,
            "id": self.row_id.clone().unwrap_or_else(|| self.entity_id.clone()),
            "agent_id": agent_id,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_delete_uses_agent_id() {
        let payload = r#"{"operation":"DELETE","table":"agents","id":"6f1c","agent_id":"finance_agent"}"#;
        let event = ChangeEvent::parse(payload).expect("should parse");

        assert_eq!(event.operation, ChangeOperation::Delete);
        assert_eq!(event.table, "agents");
        assert_eq!(event.entity_id, "finance_agent");
        assert_eq!(event.row_id.as_deref(), Some("6f1c"));
    }

    #[test]
    fn test_parse_tool_insert_uses_row_id() {
        let payload = r#"{"operation":"INSERT","table":"tools","id":"3a7e","agent_id":null}"#;
        let event = ChangeEvent::parse(payload).expect("should parse");

        assert_eq!(event.operation, ChangeOperation::Insert);
        assert_eq!(event.entity_id, "3a7e");
        assert_eq!(event.row_id.as_deref(), Some("3a7e"));
    }

    #[test]
    fn test_parse_unknown_table_is_not_an_error() {
        let payload = r#"{"operation":"INSERT","table":"registries","id":"r1"}"#;
        let event = ChangeEvent::parse(payload).expect("should parse");
        assert_eq!(event.table, "registries");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ChangeEvent::parse("not json"),
            Err(CacheError::MalformedEvent(_))
        ));
        assert!(matches!(
            ChangeEvent::parse(r#"{"operation":"UPDATE","table":"agents","id":"x"}"#),
            Err(CacheError::MalformedEvent(_))
        ));
        assert!(matches!(
            ChangeEvent::parse(r#"{"operation":"DELETE","table":"tools"}"#),
            Err(CacheError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_payload_matches_trigger_format() {
        let event = ChangeEvent::new(ChangeOperation::Delete, "agents", "web_agent");
        let decoded = ChangeEvent::parse(&event.to_payload()).expect("should parse");

        assert_eq!(decoded.entity_id, "web_agent");
        assert_eq!(decoded.operation, ChangeOperation::Delete);
    }
}
