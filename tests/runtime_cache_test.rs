//! The binary's wiring (`RuntimeBuilder`) over in-memory stores.

use std::sync::Arc;

use dynacache::adapters::memory::InMemoryEntityStore;
use dynacache::domain::models::{
    AgentDefinition, CacheConfig, CallContext, ConfigSection, EntityKind, ToolDefinition, ToolsSection,
};
use dynacache::services::{AgentRuntime, CacheDependencies, CacheService, RuntimeBuilder, ToolRuntime};

mod helpers;

#[tokio::test]
async fn test_runtime_descriptors_are_cached_per_context() {
    let agents: Arc<InMemoryEntityStore<AgentDefinition>> = Arc::new(InMemoryEntityStore::new(EntityKind::Agent));
    let tools: Arc<InMemoryEntityStore<ToolDefinition>> = Arc::new(InMemoryEntityStore::new(EntityKind::Tool));
    let builder = Arc::new(RuntimeBuilder);
    let service: CacheService<AgentRuntime, ToolRuntime> = CacheService::new(
        &CacheConfig::default(),
        CacheDependencies {
            agent_store: agents.clone(),
            tool_store: tools.clone(),
            agent_builder: builder.clone(),
            tool_builder: builder,
        },
    );

    let search = helpers::tool("search");
    let search_id = search.id.to_string();
    tools.insert_versioned(search).await;

    let mut definition = helpers::agent("researcher");
    definition.sections.push(ConfigSection::Tools(ToolsSection {
        dynamic_tools: vec![search_id.clone()],
        show_tool_calls: Some(true),
        tool_call_limit: None,
    }));
    agents.insert_versioned(definition).await;

    let default = service.get_agent("researcher", &CallContext::new()).await.unwrap();
    let tuned = service
        .get_agent("researcher", &CallContext::new().with_model("o3"))
        .await
        .unwrap();
    let again = service.get_agent("researcher", &CallContext::new()).await.unwrap();

    assert_eq!(default, again);
    assert_ne!(default.model, tuned.model);
    assert!(default.debug);
    assert_eq!(default.tool_ids, vec![search_id.clone()]);

    let outcome = service.get_tools(&default.tool_ids).await.unwrap();
    assert_eq!(outcome.resolved.len(), 1);
    assert_eq!(outcome.resolved[0].1.target, "DuckDuckGoTools");
    assert_eq!(service.stats().await.agents.total, 2);
}
