//! Runtime descriptors built from definitions.
//!
//! The cache is generic over what a builder produces. These descriptors are
//! the instances the `dynacache` binary caches: the resolved view of a
//! definition for one call context, ready to hand to an agent runtime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::models::{AgentDefinition, CallContext, ConfigSection, McpTransport, ToolDefinition, ToolKind};
use crate::domain::ports::InstanceBuilder;

/// A resolved agent for one call context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRuntime {
    pub agent_id: String,
    pub name: String,
    pub model: String,
    pub provider: Option<String>,
    pub actor_id: Option<String>,
    pub debug: bool,
    pub tool_ids: Vec<String>,
    pub team_members: Vec<String>,
    pub sections: Vec<&'static str>,
    pub built_at: DateTime<Utc>,
}

impl AgentRuntime {
    pub fn is_team(&self) -> bool {
        !self.team_members.is_empty()
    }
}

/// A resolved tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolRuntime {
    pub id: String,
    pub name: String,
    pub kind: &'static str,
    /// Toolkit class, MCP endpoint or `inline` for custom code.
    pub target: String,
    pub transport: Option<McpTransport>,
    pub built_at: DateTime<Utc>,
}

/// Builds [`AgentRuntime`] and [`ToolRuntime`] descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeBuilder;

#[async_trait]
impl InstanceBuilder<AgentDefinition, AgentRuntime> for RuntimeBuilder {
    async fn build(&self, definition: &AgentDefinition, ctx: &CallContext) -> CacheResult<AgentRuntime> {
        if !definition.is_active {
            return Err(CacheError::BuildFailure {
                id: definition.agent_id.clone(),
                reason: "agent is inactive".to_string(),
            });
        }

        let model = definition.model();
        let model_id = ctx
            .model_override
            .clone()
            .or_else(|| model.map(|m| m.id.clone()))
            .ok_or_else(|| CacheError::BuildFailure {
                id: definition.agent_id.clone(),
                reason: "no model configured".to_string(),
            })?;

        let debug = ctx.debug
            || definition
                .sections
                .iter()
                .any(|s| matches!(s, ConfigSection::Tools(t) if t.show_tool_calls == Some(true)));

        Ok(AgentRuntime {
            agent_id: definition.agent_id.clone(),
            name: definition.name.clone(),
            model: model_id,
            provider: model.and_then(|m| m.provider.clone()),
            actor_id: ctx.actor_id.clone(),
            debug,
            tool_ids: definition.referenced_tools(),
            team_members: definition.team_members(),
            sections: definition.sections.iter().map(ConfigSection::name).collect(),
            built_at: Utc::now(),
        })
    }
}

#[async_trait]
impl InstanceBuilder<ToolDefinition, ToolRuntime> for RuntimeBuilder {
    async fn build(&self, definition: &ToolDefinition, _ctx: &CallContext) -> CacheResult<ToolRuntime> {
        let (target, transport) = match &definition.kind {
            ToolKind::Builtin { class, .. } => (class.clone(), None),
            ToolKind::Mcp {
                command,
                url,
                transport,
                ..
            } => {
                let endpoint = url.clone().or_else(|| command.clone()).ok_or_else(|| CacheError::BuildFailure {
                    id: definition.id.to_string(),
                    reason: "mcp tool has neither url nor command".to_string(),
                })?;
                (endpoint, Some(*transport))
            }
            ToolKind::Custom { .. } => ("inline".to_string(), None),
        };

        Ok(ToolRuntime {
            id: definition.id.to_string(),
            name: definition.name.clone(),
            kind: definition.kind.as_str(),
            target,
            transport,
            built_at: Utc::now(),
        })
    }
}
