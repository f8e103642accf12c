//! CLI command implementations.

pub mod config;
pub mod inspect;
pub mod notify;
pub mod run;

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

use crate::adapters::postgres::{create_pool, verify_connection, PgAgentStore, PgToolStore, PoolConfig};
use crate::domain::models::Config;
use crate::services::{AgentRuntime, CacheDependencies, CacheService, RuntimeBuilder, ToolRuntime};

/// The cache as wired by the binary.
pub type RuntimeCache = CacheService<AgentRuntime, ToolRuntime>;

/// Database-backed collaborators shared by the commands.
pub struct Wiring {
    pub pool: PgPool,
    pub agent_store: Arc<PgAgentStore>,
    pub tool_store: Arc<PgToolStore>,
    pub service: Arc<RuntimeCache>,
}

/// Open the pool and assemble a [`RuntimeCache`] over the PostgreSQL stores.
pub async fn connect(config: &Config) -> Result<Wiring> {
    let pool = create_pool(&config.database.url, Some(PoolConfig::from(&config.database)))
        .await
        .context("Failed to create database pool")?;
    verify_connection(&pool)
        .await
        .context("Database is not reachable")?;

    let agent_store = Arc::new(PgAgentStore::new(pool.clone()));
    let tool_store = Arc::new(PgToolStore::new(pool.clone()));
    let builder = Arc::new(RuntimeBuilder);

    let service = Arc::new(CacheService::new(
        &config.cache,
        CacheDependencies {
            agent_store: agent_store.clone(),
            tool_store: tool_store.clone(),
            agent_builder: builder.clone(),
            tool_builder: builder,
        },
    ));

    Ok(Wiring {
        pool,
        agent_store,
        tool_store,
        service,
    })
}
