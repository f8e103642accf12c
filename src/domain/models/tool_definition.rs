//! Typed tool configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::entity::{EntitySnapshot, Versioned};
use crate::domain::errors::{CacheError, CacheResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    Stdio,
    Sse,
    StreamableHttp,
}

impl Default for McpTransport {
    fn default() -> Self {
        Self::Stdio
    }
}

/// What a tool row builds into, selected by its `type` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    /// A toolkit shipped with the agent runtime.
    Builtin {
        class: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
    /// A remote tool server reached over MCP.
    Mcp {
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        transport: McpTransport,
        #[serde(default = "default_timeout_seconds")]
        timeout_seconds: u64,
        #[serde(default)]
        include_tools: Option<Vec<String>>,
        #[serde(default)]
        exclude_tools: Option<Vec<String>>,
    },
    /// User supplied function source.
    Custom { function_code: String },
}

const fn default_timeout_seconds() -> u64 {
    5
}

impl ToolKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin { .. } => "builtin",
            Self::Mcp { .. } => "mcp",
            Self::Custom { .. } => "custom",
        }
    }

    /// Decode from the row's `type` column and `configuration` JSON.
    pub fn from_parts(tool_type: &str, configuration: &Value) -> CacheResult<Self> {
        let invalid = |reason: String| CacheError::Validation(format!("{tool_type} tool: {reason}"));

        match tool_type {
            "builtin" => {
                let class = configuration
                    .get("class")
                    .and_then(Value::as_str)
                    .unwrap_or("DuckDuckGoTools")
                    .to_string();
                let params = configuration
                    .get("params")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                Ok(Self::Builtin { class, params })
            }
            "mcp" => {
                let mut tagged = configuration.as_object().cloned().unwrap_or_default();
                tagged.insert("type".to_string(), Value::String("mcp".to_string()));
                let kind: Self = serde_json::from_value(Value::Object(tagged)).map_err(|e| invalid(e.to_string()))?;
                if let Self::Mcp { command: None, url: None, .. } = kind {
                    return Err(invalid("either command or url is required".to_string()));
                }
                Ok(kind)
            }
            "custom" => {
                let code = configuration
                    .get("function_code")
                    .and_then(Value::as_str)
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| invalid("function_code is required".to_string()))?;
                Ok(Self::Custom {
                    function_code: code.to_string(),
                })
            }
            other => Err(CacheError::Validation(format!("unknown tool type: {other}"))),
        }
    }
}

/// A decoded tool configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub user_id: Option<String>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub kind: ToolKind,
}

impl Versioned for ToolDefinition {
    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id.to_string(),
            last_modified: self.updated_at,
            owner_ref: self.user_id.clone(),
        }
    }
}
