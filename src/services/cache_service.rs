//! Cache facade.
//!
//! `CacheService` is the entry point for everything that needs a built
//! agent or tool. It owns one entity cache per kind, the team composite
//! cache and the two id lists, and reacts to change notifications when a
//! listener is attached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::batch_resolver::{resolve_or_build, BatchFailure, BatchOutcome};
use super::change_listener::{ChangeHandler, ChangeListener, ListenerHandle, ListenerSettings, ListenerState, ListenerStats};
use super::composite_cache::{CompositeCache, CompositeCacheStats};
use super::entity_cache::{EntityCache, EntityCacheStats};
use super::list_cache::{ListCache, ListCacheStats};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::models::{
    AgentDefinition, CacheConfig, CallContext, ChangeEvent, ChangeOperation, EntityKind, ToolDefinition,
};
use crate::domain::ports::{EntityStore, InstanceBuilder, NotificationSource};

/// Stores and builders the service delegates to.
pub struct CacheDependencies<A, T> {
    /// Agent configuration rows.
    pub agent_store: Arc<dyn EntityStore<AgentDefinition>>,
    /// Tool configuration rows.
    pub tool_store: Arc<dyn EntityStore<ToolDefinition>>,
    /// Turns agent definitions into instances.
    pub agent_builder: Arc<dyn InstanceBuilder<AgentDefinition, A>>,
    /// Turns tool definitions into instances.
    pub tool_builder: Arc<dyn InstanceBuilder<ToolDefinition, T>>,
}

/// Targets of an administrative invalidation. At least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub owner_ref: Option<String>,
    #[serde(default)]
    pub tool_ids: Vec<String>,
}

impl InvalidateRequest {
    /// Invalidate one agent by id.
    pub fn entity(id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Invalidate everything owned by or built for `owner_ref`.
    pub fn owner(owner_ref: impl Into<String>) -> Self {
        Self {
            owner_ref: Some(owner_ref.into()),
            ..Self::default()
        }
    }

    /// Invalidate a set of tools.
    pub fn tools(ids: Vec<String>) -> Self {
        Self {
            tool_ids: ids,
            ..Self::default()
        }
    }

    /// No target set.
    pub fn is_empty(&self) -> bool {
        self.entity_id.is_none() && self.owner_ref.is_none() && self.tool_ids.is_empty()
    }
}

/// Entries removed by an invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Agent instances removed.
    pub agents_removed: usize,
    /// Tool instances removed.
    pub tools_removed: usize,
    /// Teams removed.
    pub composites_removed: usize,
}

impl InvalidationReport {
    /// Sum over every cache.
    pub const fn total(&self) -> usize {
        self.agents_removed + self.tools_removed + self.composites_removed
    }
}

/// Expired entries swept per cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Agent instances.
    pub agents: usize,
    /// Tool instances.
    pub tools: usize,
    /// Teams.
    pub composites: usize,
    /// Id lists.
    pub lists: usize,
}

impl CleanupReport {
    /// Sum over every cache.
    pub const fn total(&self) -> usize {
        self.agents + self.tools + self.composites + self.lists
    }
}

/// Outcome of [`CacheService::refresh_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// What the clear removed.
    pub cleared: InvalidationReport,
    /// Active agents after reloading the list.
    pub active_agents: usize,
    /// Active tools after reloading the list.
    pub active_tools: usize,
}

/// Outcome of [`CacheService::preload`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Agents asked for.
    pub requested: usize,
    /// Agents now cached.
    pub built: usize,
    /// Ids that failed to build.
    pub failed: Vec<String>,
}

/// Listener state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenerReport {
    /// Current state.
    pub state: ListenerState,
    /// Event and reconnect counters.
    #[serde(flatten)]
    pub stats: ListenerStats,
}

/// Everything `stats()` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatsReport {
    /// Agent instance cache.
    pub agents: EntityCacheStats,
    /// Tool instance cache.
    pub tools: EntityCacheStats,
    /// Team composite cache.
    pub teams: CompositeCacheStats,
    /// Active agent id list.
    pub agent_list: ListCacheStats,
    /// Active tool id list.
    pub tool_list: ListCacheStats,
    /// `None` when no listener is attached.
    pub listener: Option<ListenerReport>,
}

struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Configuration-aware cache for agents, tools and teams.
pub struct CacheService<A, T> {
    config: CacheConfig,
    deps: CacheDependencies<A, T>,
    agents: EntityCache<A>,
    tools: EntityCache<T>,
    teams: CompositeCache<A>,
    agent_list: ListCache,
    tool_list: ListCache,
    listener: Mutex<Option<ListenerHandle>>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl<A, T> CacheService<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Empty caches sized by `config`, delegating to `deps`.
    pub fn new(config: &CacheConfig, deps: CacheDependencies<A, T>) -> Self {
        Self {
            config: config.clone(),
            deps,
            agents: EntityCache::new(EntityKind::Agent, config.entity_ttl()),
            tools: EntityCache::new(EntityKind::Tool, config.tool_ttl()),
            teams: CompositeCache::new(config.entity_ttl()),
            agent_list: ListCache::new(EntityKind::Agent, config.list_ttl()),
            tool_list: ListCache::new(EntityKind::Tool, config.list_ttl()),
            listener: Mutex::new(None),
            maintenance: Mutex::new(None),
        }
    }

    /// Configuration the service was built with.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    // Lookups

    /// Get the agent instance for `ctx`, building it on a miss.
    pub async fn get_agent(&self, agent_id: &str, ctx: &CallContext) -> CacheResult<A> {
        get_or_build(
            &self.agents,
            self.deps.agent_store.as_ref(),
            self.deps.agent_builder.as_ref(),
            agent_id,
            ctx,
        )
        .await
    }

    /// Get a tool instance. Tools are shared across call contexts.
    pub async fn get_tool(&self, tool_id: &str) -> CacheResult<T> {
        get_or_build(
            &self.tools,
            self.deps.tool_store.as_ref(),
            self.deps.tool_builder.as_ref(),
            tool_id,
            &CallContext::default(),
        )
        .await
    }

    /// Resolve many tools at once; unknown or broken tools land in `failures`.
    pub async fn get_tools(&self, tool_ids: &[String]) -> CacheResult<BatchOutcome<T>> {
        let snapshots = self.deps.tool_store.snapshots(tool_ids).await?;

        let mut refs = Vec::with_capacity(tool_ids.len());
        let mut missing = Vec::new();
        for id in tool_ids {
            match snapshots.iter().find(|s| s.id == *id) {
                Some(snapshot) => refs.push(snapshot.clone()),
                None => missing.push(BatchFailure {
                    entity_id: id.clone(),
                    error: CacheError::not_found(EntityKind::Tool, id.clone()),
                }),
            }
        }

        let mut outcome = resolve_or_build(
            &self.tools,
            &refs,
            &CallContext::default(),
            self.deps.tool_store.as_ref(),
            self.deps.tool_builder.as_ref(),
        )
        .await;
        outcome.failures.extend(missing);

        if !outcome.failures.is_empty() {
            tracing::warn!(
                requested = tool_ids.len(),
                failed = outcome.failures.len(),
                "Some tools could not be resolved"
            );
        }
        Ok(outcome)
    }

    /// Get the members of a team, in the order given. Members that fail are
    /// skipped.
    ///
    /// A cached team is reused only while every member still has the
    /// configuration it was assembled from.
    pub async fn get_team(&self, member_ids: &[String], ctx: &CallContext) -> CacheResult<Vec<A>> {
        let snapshots = self.deps.agent_store.snapshots(member_ids).await?;
        Ok(self
            .teams
            .build(member_ids, &snapshots, ctx, |id: String| async move { self.get_agent(&id, ctx).await })
            .await)
    }

    /// Ids of active agents, cached for the list TTL.
    pub async fn list_agents(&self) -> CacheResult<Vec<String>> {
        self.agent_list
            .get_or_refresh(|| self.deps.agent_store.list_active_ids())
            .await
    }

    /// Ids of active tools, cached for the list TTL.
    pub async fn list_tools(&self) -> CacheResult<Vec<String>> {
        self.tool_list
            .get_or_refresh(|| self.deps.tool_store.list_active_ids())
            .await
    }

    // Administration

    /// Administrative invalidation. Rejects a request with no target.
    pub async fn invalidate(&self, request: &InvalidateRequest) -> CacheResult<InvalidationReport> {
        if request.is_empty() {
            return Err(CacheError::Validation(
                "one of entity_id, owner_ref or tool_ids is required".to_string(),
            ));
        }

        let mut report = InvalidationReport::default();
        if let Some(entity_id) = &request.entity_id {
            report.agents_removed += self.agents.invalidate_entity(entity_id).await;
            report.composites_removed += self.teams.invalidate_member(entity_id).await;
            self.agent_list.invalidate().await;
        }
        if let Some(owner_ref) = &request.owner_ref {
            let owned = self.invalidate_owner(owner_ref).await;
            report.agents_removed += owned.agents_removed;
            report.tools_removed += owned.tools_removed;
            report.composites_removed += owned.composites_removed;
        }
        if !request.tool_ids.is_empty() {
            report.tools_removed += self.tools.invalidate_entities(&request.tool_ids).await;
        }

        tracing::info!(?request, removed = report.total(), "Invalidated cache entries");
        Ok(report)
    }

    /// Remove every cached variant of one entity, the teams it belongs to,
    /// and its kind's id list.
    pub async fn invalidate_entity(&self, kind: EntityKind, entity_id: &str) -> usize {
        match kind {
            EntityKind::Agent => {
                self.teams.invalidate_member(entity_id).await;
                self.agent_list.invalidate().await;
                self.agents.invalidate_entity(entity_id).await
            }
            EntityKind::Tool => {
                self.tool_list.invalidate().await;
                self.tools.invalidate_entity(entity_id).await
            }
        }
    }

    /// Remove everything owned by, or built for, `owner_ref`, along with the
    /// teams that contained any removed agent.
    pub async fn invalidate_owner(&self, owner_ref: &str) -> InvalidationReport {
        let agent_keys = self.agents.invalidate_owner(owner_ref).await;
        let mut agent_ids: Vec<&str> = agent_keys.iter().map(|key| key.entity_id.as_str()).collect();
        agent_ids.sort_unstable();
        agent_ids.dedup();

        let mut composites_removed = 0;
        for agent_id in agent_ids {
            composites_removed += self.teams.invalidate_member(agent_id).await;
        }

        InvalidationReport {
            agents_removed: agent_keys.len(),
            tools_removed: self.tools.invalidate_owner(owner_ref).await.len(),
            composites_removed,
        }
    }

    /// Empty every cache.
    pub async fn clear_all(&self) -> InvalidationReport {
        let report = InvalidationReport {
            agents_removed: self.agents.clear().await,
            tools_removed: self.tools.clear().await,
            composites_removed: self.teams.clear().await,
        };
        self.agent_list.invalidate().await;
        self.tool_list.invalidate().await;

        tracing::info!(removed = report.total(), "Cleared all caches");
        report
    }

    /// Clear everything and reload the id lists from the store.
    pub async fn refresh_all(&self) -> CacheResult<RefreshReport> {
        let cleared = self.clear_all().await;
        Ok(RefreshReport {
            cleared,
            active_agents: self.list_agents().await?.len(),
            active_tools: self.list_tools().await?.len(),
        })
    }

    /// Invalidate one agent and build it again for `ctx`.
    pub async fn refresh_agent(&self, agent_id: &str, ctx: &CallContext) -> CacheResult<A> {
        self.invalidate_entity(EntityKind::Agent, agent_id).await;
        self.get_agent(agent_id, ctx).await
    }

    /// Sweep expired entries from every cache.
    pub async fn cleanup_expired(&self) -> CleanupReport {
        let report = CleanupReport {
            agents: self.agents.cleanup_expired().await,
            tools: self.tools.cleanup_expired().await,
            composites: self.teams.cleanup_expired().await,
            lists: usize::from(self.agent_list.cleanup_expired().await)
                + usize::from(self.tool_list.cleanup_expired().await),
        };
        if report.total() > 0 {
            tracing::info!(?report, "Removed expired cache entries");
        }
        report
    }

    /// Build agents ahead of demand with the default call context.
    ///
    /// `None` preloads every active agent. Individual failures are logged
    /// and reported, never returned as an error.
    pub async fn preload(&self, agent_ids: Option<&[String]>) -> CacheResult<PreloadReport> {
        let ids = match agent_ids {
            Some(ids) => ids.to_vec(),
            None => self.list_agents().await?,
        };

        let ctx = CallContext::default();
        let mut report = PreloadReport {
            requested: ids.len(),
            ..PreloadReport::default()
        };
        for id in &ids {
            match self.get_agent(id, &ctx).await {
                Ok(_) => report.built += 1,
                Err(e) => {
                    tracing::warn!(agent_id = %id, error = %e, "Preload failed");
                    report.failed.push(id.clone());
                }
            }
        }

        tracing::info!(requested = report.requested, built = report.built, "Preloaded agent cache");
        Ok(report)
    }

    /// Statistics for every cache and the listener.
    pub async fn stats(&self) -> CacheStatsReport {
        let listener = self.listener.lock().await.as_ref().map(|handle| ListenerReport {
            state: handle.state(),
            stats: handle.stats(),
        });

        CacheStatsReport {
            agents: self.agents.stats().await,
            tools: self.tools.stats().await,
            teams: self.teams.stats().await,
            agent_list: self.agent_list.stats().await,
            tool_list: self.tool_list.stats().await,
            listener,
        }
    }

    // Lifecycle

    /// Attach a change listener feeding this service. Replaces (and stops)
    /// a previously attached one.
    pub async fn start_listener(self: &Arc<Self>, source: Arc<dyn NotificationSource>, settings: ListenerSettings) {
        let handler: Arc<dyn ChangeHandler> = self.clone();
        let handle = ChangeListener::new(source, handler, settings).start();

        let previous = self.listener.lock().await.replace(handle);
        if let Some(previous) = previous {
            if let Err(e) = previous.shutdown().await {
                tracing::warn!(error = %e, "Previous listener exited with error");
            }
        }
    }

    /// Current listener state, `Stopped` when none is attached.
    pub async fn listener_state(&self) -> ListenerState {
        self.listener
            .lock()
            .await
            .as_ref()
            .map_or(ListenerState::Stopped, ListenerHandle::state)
    }

    /// Wait for the attached listener to exit on its own and return its
    /// result. `TransportFailure` means reconnect attempts ran out.
    ///
    /// Never resolves while no listener is attached. The finished handle is
    /// detached, so `listener_state` reports `Stopped` afterwards.
    pub async fn listener_stopped(&self) -> CacheResult<()> {
        let state_rx = self.listener.lock().await.as_ref().map(ListenerHandle::subscribe);
        let Some(mut state_rx) = state_rx else {
            return std::future::pending().await;
        };

        // A closed channel means the task is gone as well.
        let _ = state_rx.wait_for(|state| *state == ListenerState::Stopped).await;

        let handle = self.listener.lock().await.take();
        match handle {
            Some(handle) => handle.join().await,
            None => Ok(()),
        }
    }

    /// Start the periodic expired-entry sweep.
    pub async fn start_maintenance(self: &Arc<Self>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let service = Arc::clone(self);
        let period = self.config.cleanup_interval();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        service.cleanup_expired().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("Cache maintenance stopped");
        });

        let previous = self.maintenance.lock().await.replace(Maintenance { shutdown_tx, task });
        if let Some(previous) = previous {
            previous.shutdown_tx.send_replace(true);
            let _ = previous.task.await;
        }
    }

    /// Stop background work. The caches stay usable afterwards.
    pub async fn shutdown(&self) -> CacheResult<()> {
        let maintenance = self.maintenance.lock().await.take();
        if let Some(maintenance) = maintenance {
            maintenance.shutdown_tx.send_replace(true);
            if let Err(e) = maintenance.task.await {
                tracing::warn!(error = %e, "Maintenance task aborted");
            }
        }

        let listener = self.listener.lock().await.take();
        match listener {
            Some(handle) => {
                let stats = handle.stats();
                let result = handle.shutdown().await;
                tracing::info!(?stats, "Cache service shut down");
                result
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<A, T> ChangeHandler for CacheService<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn handle_change(&self, event: &ChangeEvent) -> bool {
        let Some(kind) = EntityKind::from_table(&event.table) else {
            tracing::debug!(table = %event.table, "Ignoring change on untracked table");
            return false;
        };

        match (kind, event.operation) {
            (EntityKind::Agent, ChangeOperation::Insert) => {
                self.agent_list.invalidate().await;
            }
            (EntityKind::Agent, ChangeOperation::Delete) => {
                let removed = self.agents.invalidate_entity(&event.entity_id).await;
                let composites = self.teams.invalidate_member(&event.entity_id).await;
                self.agent_list.invalidate().await;
                tracing::info!(agent_id = %event.entity_id, removed, composites, "Agent deleted");
            }
            (EntityKind::Tool, ChangeOperation::Insert) => {
                self.tool_list.invalidate().await;
            }
            (EntityKind::Tool, ChangeOperation::Delete) => {
                let removed = self.tools.invalidate_entity(&event.entity_id).await;
                self.tool_list.invalidate().await;
                tracing::info!(tool_id = %event.entity_id, removed, "Tool deleted");
            }
        }
        true
    }

    async fn on_resubscribe(&self) {
        self.agent_list.invalidate().await;
        self.tool_list.invalidate().await;
        tracing::info!("Change listener resubscribed, id lists invalidated");
    }
}

async fn get_or_build<D, I>(
    cache: &EntityCache<I>,
    store: &dyn EntityStore<D>,
    builder: &dyn InstanceBuilder<D, I>,
    entity_id: &str,
    ctx: &CallContext,
) -> CacheResult<I>
where
    D: Send + Sync,
    I: Clone + Send + Sync,
{
    let kind = cache.kind();
    let snapshot = store
        .snapshot(entity_id)
        .await?
        .ok_or_else(|| CacheError::not_found(kind, entity_id))?;

    if let Some(instance) = cache.get(entity_id, ctx, &snapshot).await {
        return Ok(instance);
    }

    let definition = store
        .load(entity_id)
        .await?
        .ok_or_else(|| CacheError::not_found(kind, entity_id))?;

    let instance = builder.build(&definition, ctx).await.map_err(|e| match e {
        CacheError::BuildFailure { .. } => e,
        other => CacheError::build_failure(entity_id, other),
    })?;

    cache.put(instance.clone(), entity_id, ctx, &snapshot).await;
    tracing::debug!(%kind, entity_id, "Built and cached instance");
    Ok(instance)
}
