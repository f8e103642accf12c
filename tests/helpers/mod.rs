//! Shared fixtures for integration tests.
#![allow(dead_code)]

use serde_json::Map;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use dynacache::adapters::memory::{FnBuilder, InMemoryEntityStore};
use dynacache::domain::errors::{CacheError, CacheResult};
use dynacache::domain::models::{
    AgentDefinition, CacheConfig, CallContext, ConfigSection, EntityKind, ModelSection, ToolDefinition, ToolKind,
};
use dynacache::services::{CacheDependencies, CacheService};

pub type AgentBuildFn = fn(&AgentDefinition, &CallContext) -> CacheResult<String>;
pub type ToolBuildFn = fn(&ToolDefinition, &CallContext) -> CacheResult<String>;

/// Agents whose name starts with this prefix fail to build.
pub const BROKEN: &str = "broken";

/// Instance label: `<agent_id>@<model>/<actor>`.
fn build_agent(definition: &AgentDefinition, ctx: &CallContext) -> CacheResult<String> {
    if definition.name.starts_with(BROKEN) {
        return Err(CacheError::build_failure(&definition.agent_id, "builder rejected agent"));
    }
    Ok(format!(
        "{}@{}/{}",
        definition.agent_id,
        ctx.model_segment(),
        ctx.actor_segment()
    ))
}

fn build_tool(definition: &ToolDefinition, _ctx: &CallContext) -> CacheResult<String> {
    if definition.name.starts_with(BROKEN) {
        return Err(CacheError::build_failure(definition.id.to_string(), "builder rejected tool"));
    }
    Ok(format!("tool:{}", definition.name))
}

pub fn agent(agent_id: &str) -> AgentDefinition {
    AgentDefinition {
        row_id: Uuid::new_v4(),
        agent_id: agent_id.to_string(),
        name: agent_id.to_string(),
        description: None,
        user_id: None,
        is_active: true,
        updated_at: None,
        tool_ids: vec![],
        sections: vec![ConfigSection::Model(ModelSection::default())],
    }
}

pub fn tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: format!("{name} tool"),
        user_id: None,
        is_active: true,
        updated_at: None,
        kind: ToolKind::Builtin {
            class: "DuckDuckGoTools".to_string(),
            params: Map::new(),
        },
    }
}

/// A `CacheService<String, String>` over in-memory stores.
pub struct Harness {
    pub agents: Arc<InMemoryEntityStore<AgentDefinition>>,
    pub tools: Arc<InMemoryEntityStore<ToolDefinition>>,
    pub agent_builder: Arc<FnBuilder<AgentBuildFn>>,
    pub tool_builder: Arc<FnBuilder<ToolBuildFn>>,
    pub service: Arc<CacheService<String, String>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        let agents: Arc<InMemoryEntityStore<AgentDefinition>> = Arc::new(InMemoryEntityStore::new(EntityKind::Agent));
        let tools: Arc<InMemoryEntityStore<ToolDefinition>> = Arc::new(InMemoryEntityStore::new(EntityKind::Tool));
        let agent_builder = Arc::new(FnBuilder::new(build_agent as AgentBuildFn));
        let tool_builder = Arc::new(FnBuilder::new(build_tool as ToolBuildFn));

        let service = Arc::new(CacheService::new(
            config,
            CacheDependencies {
                agent_store: agents.clone(),
                tool_store: tools.clone(),
                agent_builder: agent_builder.clone(),
                tool_builder: tool_builder.clone(),
            },
        ));

        Self {
            agents,
            tools,
            agent_builder,
            tool_builder,
            service,
        }
    }

    pub async fn add_agent(&self, agent_id: &str) {
        self.agents.upsert(agent_id, agent(agent_id)).await;
    }

    /// Store a tool and return its id.
    pub async fn add_tool(&self, name: &str) -> String {
        let definition = tool(name);
        let id = definition.id.to_string();
        self.tools.upsert(&id, definition).await;
        id
    }
}

/// Poll `check` until it holds, for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
