//! Typed agent configuration.
//!
//! An agent row carries a `model_config` column plus an `agent_config` JSON
//! object whose keys select optional sections. Each section decodes into its
//! own variant of [`ConfigSection`] and is validated on its own, so a bad
//! `memory` block never hides a good `tools` block in error reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::entity::{EntitySnapshot, Versioned};
use crate::domain::errors::{CacheError, CacheResult};

const SUPPORTED_BACKENDS: [&str; 2] = ["postgres", "supabase"];
const TEAM_MODES: [&str; 3] = ["route", "coordinate", "collaborate"];

/// Model selection for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_model_id")]
    pub id: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_model_id() -> String {
    "gpt-4.1-mini-2025-04-14".to_string()
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            provider: Some("openai".to_string()),
            id: default_model_id(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Tool wiring: ids of tool rows resolved through the tool cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default)]
    pub dynamic_tools: Vec<String>,
    #[serde(default)]
    pub show_tool_calls: Option<bool>,
    #[serde(default)]
    pub tool_call_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_backend")]
    pub memory_type: String,
    #[serde(default)]
    pub enable_user_memories: bool,
    #[serde(default = "default_memory_table")]
    pub table_name: String,
}

fn default_backend() -> String {
    "postgres".to_string()
}

fn default_memory_table() -> String {
    "agent_memory".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_backend")]
    pub storage_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sessions_table")]
    pub table_name: String,
}

const fn default_true() -> bool {
    true
}

fn default_sessions_table() -> String {
    "sessions".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSection {
    #[serde(default, rename = "reasoning")]
    pub enabled: bool,
    #[serde(default = "default_min_steps", rename = "reasoning_min_steps")]
    pub min_steps: u32,
    #[serde(default = "default_max_steps", rename = "reasoning_max_steps")]
    pub max_steps: u32,
}

const fn default_min_steps() -> u32 {
    1
}

const fn default_max_steps() -> u32 {
    10
}

/// Team composition; members are agent ids resolved through the agent cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSection {
    #[serde(default = "default_team_mode", rename = "team_mode")]
    pub mode: String,
    #[serde(default, rename = "team")]
    pub members: Vec<String>,
}

fn default_team_mode() -> String {
    "coordinate".to_string()
}

/// One independently validated section of an agent's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum ConfigSection {
    Model(ModelSection),
    Tools(ToolsSection),
    Memory(MemorySection),
    Storage(StorageSection),
    Reasoning(ReasoningSection),
    Team(TeamSection),
}

impl ConfigSection {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::Tools(_) => "tools",
            Self::Memory(_) => "memory",
            Self::Storage(_) => "storage",
            Self::Reasoning(_) => "reasoning",
            Self::Team(_) => "team",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Model(model) => {
                if model.id.trim().is_empty() {
                    return Err("model id cannot be empty".to_string());
                }
                if let Some(t) = model.temperature {
                    if !(0.0..=2.0).contains(&t) {
                        return Err(format!("temperature {t} outside 0.0..=2.0"));
                    }
                }
                Ok(())
            }
            Self::Tools(tools) => {
                if tools.dynamic_tools.iter().any(|id| id.trim().is_empty()) {
                    return Err("tool ids cannot be empty".to_string());
                }
                Ok(())
            }
            Self::Memory(memory) => check_backend("memory_type", &memory.memory_type),
            Self::Storage(storage) => check_backend("storage_type", &storage.storage_type),
            Self::Reasoning(reasoning) => {
                if reasoning.min_steps == 0 || reasoning.min_steps > reasoning.max_steps {
                    return Err(format!(
                        "invalid step range {}..={}",
                        reasoning.min_steps, reasoning.max_steps
                    ));
                }
                Ok(())
            }
            Self::Team(team) => {
                if !TEAM_MODES.contains(&team.mode.as_str()) {
                    return Err(format!("unsupported team_mode: {}", team.mode));
                }
                Ok(())
            }
        }
    }
}

fn check_backend(field: &str, value: &str) -> Result<(), String> {
    if SUPPORTED_BACKENDS.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "unsupported {field}: {value} (expected one of {})",
            SUPPORTED_BACKENDS.join(", ")
        ))
    }
}

/// A decoded, validated agent configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub row_id: Uuid,
    pub agent_id: String,
    pub name: String,
    pub description: Option<String>,
    pub user_id: Option<String>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub tool_ids: Vec<Uuid>,
    pub sections: Vec<ConfigSection>,
}

impl AgentDefinition {
    /// Decode the configuration columns of an agent row into sections.
    ///
    /// `model_config` always yields a `Model` section; `agent_config` keys
    /// that are not recognised are ignored.
    pub fn decode_sections(agent_id: &str, model_config: Value, agent_config: &Value) -> CacheResult<Vec<ConfigSection>> {
        let mut sections = Vec::new();

        let model = if model_config.is_null() {
            ModelSection::default()
        } else {
            serde_json::from_value(model_config).map_err(|e| invalid(agent_id, "model", &e))?
        };
        sections.push(ConfigSection::Model(model));

        if let Some(obj) = agent_config.as_object() {
            for (key, value) in obj {
                let section = match key.as_str() {
                    "tools" => serde_json::from_value(value.clone()).map(ConfigSection::Tools),
                    "memory" => serde_json::from_value(value.clone()).map(ConfigSection::Memory),
                    "storage" => serde_json::from_value(value.clone()).map(ConfigSection::Storage),
                    "reasoning" => serde_json::from_value(value.clone()).map(ConfigSection::Reasoning),
                    "team" => serde_json::from_value(value.clone()).map(ConfigSection::Team),
                    _ => continue,
                }
                .map_err(|e| invalid(agent_id, key, &e))?;
                sections.push(section);
            }
        }

        for section in &sections {
            section
                .validate()
                .map_err(|reason| invalid(agent_id, section.name(), &reason))?;
        }

        Ok(sections)
    }

    pub fn model(&self) -> Option<&ModelSection> {
        self.sections.iter().find_map(|s| match s {
            ConfigSection::Model(m) => Some(m),
            _ => None,
        })
    }

    /// Tool ids referenced by this agent: the `tool_ids` column plus any
    /// `dynamic_tools` listed in the tools section, de-duplicated in order.
    pub fn referenced_tools(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tool_ids.iter().map(Uuid::to_string).collect();
        for section in &self.sections {
            if let ConfigSection::Tools(tools) = section {
                for id in &tools.dynamic_tools {
                    if !ids.contains(id) {
                        ids.push(id.clone());
                    }
                }
            }
        }
        ids
    }

    pub fn team_members(&self) -> Vec<String> {
        self.sections
            .iter()
            .find_map(|s| match s {
                ConfigSection::Team(team) => Some(team.members.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl Versioned for AgentDefinition {
    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.agent_id.clone(),
            last_modified: self.updated_at,
            owner_ref: self.user_id.clone(),
        }
    }
}

fn invalid(agent_id: &str, section: &str, reason: &impl ToString) -> CacheError {
    CacheError::Validation(format!(
        "agent {agent_id}: invalid {section} section: {}",
        reason.to_string()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_defaults_model_section() {
        let sections = AgentDefinition::decode_sections("a1", Value::Null, &json!({})).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(matches!(&sections[0], ConfigSection::Model(m) if m.id == default_model_id()));
    }

    #[test]
    fn test_decode_all_sections() {
        let sections = AgentDefinition::decode_sections(
            "a1",
            json!({"provider": "openai", "id": "gpt-4.1", "temperature": 0.3}),
            &json!({
                "tools": {"dynamic_tools": ["t1", "t2"]},
                "memory": {"memory_type": "postgres"},
                "storage": {"storage_type": "supabase", "table_name": "s"},
                "reasoning": {"reasoning": true, "reasoning_min_steps": 2, "reasoning_max_steps": 4},
                "team": {"team_mode": "route", "team": ["a2", "a3"]},
                "knowledge": {"add_references": true}
            }),
        )
        .unwrap();

        let names: Vec<&str> = sections.iter().map(ConfigSection::name).collect();
        assert_eq!(names.len(), 6);
        for expected in ["model", "tools", "memory", "storage", "reasoning", "team"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_decode_rejects_bad_section() {
        let err = AgentDefinition::decode_sections(
            "a1",
            Value::Null,
            &json!({"memory": {"memory_type": "sqlite"}}),
        )
        .unwrap_err();

        match err {
            CacheError::Validation(msg) => {
                assert!(msg.contains("memory"));
                assert!(msg.contains("sqlite"));
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_inverted_reasoning_steps() {
        let result = AgentDefinition::decode_sections(
            "a1",
            Value::Null,
            &json!({"reasoning": {"reasoning_min_steps": 5, "reasoning_max_steps": 2}}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_referenced_tools_and_team() {
        let tool = Uuid::new_v4();
        let def = AgentDefinition {
            row_id: Uuid::new_v4(),
            agent_id: "lead".to_string(),
            name: "Lead".to_string(),
            description: None,
            user_id: Some("u1".to_string()),
            is_active: true,
            updated_at: None,
            tool_ids: vec![tool],
            sections: vec![
                ConfigSection::Tools(ToolsSection {
                    dynamic_tools: vec![tool.to_string(), "extra".to_string()],
                    ..Default::default()
                }),
                ConfigSection::Team(TeamSection {
                    mode: "coordinate".to_string(),
                    members: vec!["a".to_string(), "b".to_string()],
                }),
            ],
        };

        assert_eq!(def.referenced_tools(), vec![tool.to_string(), "extra".to_string()]);
        assert_eq!(def.team_members(), vec!["a", "b"]);
        let snap = def.snapshot();
        assert_eq!(snap.id, "lead");
        assert_eq!(snap.owner_ref.as_deref(), Some("u1"));
    }
}
