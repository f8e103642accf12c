//! PostgreSQL implementations of the entity stores.
//!
//! `updated_at` is a `TIMESTAMP` without time zone maintained by the
//! database; it is read as UTC.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::models::{AgentDefinition, EntitySnapshot, ToolDefinition, ToolKind};
use crate::domain::ports::EntityStore;

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    updated_at: Option<DateTime<Utc>>,
    owner_ref: Option<String>,
}

impl From<SnapshotRow> for EntitySnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            last_modified: row.updated_at,
            owner_ref: row.owner_ref,
        }
    }
}

#[derive(Clone)]
pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore<AgentDefinition> for PgAgentStore {
    async fn snapshot(&self, id: &str) -> CacheResult<Option<EntitySnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"SELECT agent_id AS id, updated_at AT TIME ZONE 'UTC' AS updated_at, user_id AS owner_ref
               FROM agents WHERE agent_id = $1 AND is_active = true"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn snapshots(&self, ids: &[String]) -> CacheResult<Vec<EntitySnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"SELECT agent_id AS id, updated_at AT TIME ZONE 'UTC' AS updated_at, user_id AS owner_ref
               FROM agents WHERE agent_id = ANY($1) AND is_active = true
               ORDER BY array_position($1, agent_id)"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn load(&self, id: &str) -> CacheResult<Option<AgentDefinition>> {
        let row: Option<AgentRow> = sqlx::query_as(
            r#"SELECT id, agent_id, name, description, user_id, is_active,
                      updated_at AT TIME ZONE 'UTC' AS updated_at,
                      tool_ids, model_config, agent_config
               FROM agents WHERE agent_id = $1 AND is_active = true"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_active_ids(&self) -> CacheResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT agent_id FROM agents WHERE is_active = true ORDER BY agent_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    agent_id: String,
    name: String,
    description: Option<String>,
    user_id: Option<String>,
    is_active: bool,
    updated_at: Option<DateTime<Utc>>,
    tool_ids: Option<Vec<Uuid>>,
    model_config: Option<Value>,
    agent_config: Option<Value>,
}

impl TryFrom<AgentRow> for AgentDefinition {
    type Error = CacheError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let sections = Self::decode_sections(
            &row.agent_id,
            row.model_config.unwrap_or(Value::Null),
            &row.agent_config.unwrap_or(Value::Null),
        )?;

        Ok(Self {
            row_id: row.id,
            agent_id: row.agent_id,
            name: row.name,
            description: row.description,
            user_id: row.user_id,
            is_active: row.is_active,
            updated_at: row.updated_at,
            tool_ids: row.tool_ids.unwrap_or_default(),
            sections,
        })
    }
}

#[derive(Clone)]
pub struct PgToolStore {
    pool: PgPool,
}

impl PgToolStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Tool ids are UUIDs; anything else cannot name a row.
fn parse_tool_ids(ids: &[String]) -> Vec<Uuid> {
    ids.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect()
}

#[async_trait]
impl EntityStore<ToolDefinition> for PgToolStore {
    async fn snapshot(&self, id: &str) -> CacheResult<Option<EntitySnapshot>> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"SELECT id::text AS id, updated_at AT TIME ZONE 'UTC' AS updated_at, user_id::text AS owner_ref
               FROM tools WHERE id = $1 AND is_active = true"#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn snapshots(&self, ids: &[String]) -> CacheResult<Vec<EntitySnapshot>> {
        let uuids = parse_tool_ids(ids);
        if uuids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"SELECT id::text AS id, updated_at AT TIME ZONE 'UTC' AS updated_at, user_id::text AS owner_ref
               FROM tools WHERE id = ANY($1) AND is_active = true
               ORDER BY array_position($1, id)"#,
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn load(&self, id: &str) -> CacheResult<Option<ToolDefinition>> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let row: Option<ToolRow> = sqlx::query_as(
            r#"SELECT id, name, type AS tool_type, description, configuration,
                      user_id::text AS user_id, is_active,
                      updated_at AT TIME ZONE 'UTC' AS updated_at
               FROM tools WHERE id = $1 AND is_active = true"#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_active_ids(&self) -> CacheResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id::text FROM tools WHERE is_active = true ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}

#[derive(sqlx::FromRow)]
struct ToolRow {
    id: Uuid,
    name: String,
    tool_type: String,
    description: Option<String>,
    configuration: Option<Value>,
    user_id: Option<String>,
    is_active: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ToolRow> for ToolDefinition {
    type Error = CacheError;

    fn try_from(row: ToolRow) -> Result<Self, Self::Error> {
        let configuration = row.configuration.unwrap_or(Value::Null);
        let kind = ToolKind::from_parts(&row.tool_type, &configuration)?;

        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description.unwrap_or_default(),
            user_id: row.user_id,
            is_active: row.is_active,
            updated_at: row.updated_at,
            kind,
        })
    }
}
