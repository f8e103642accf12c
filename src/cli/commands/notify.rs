//! `dynacache notify`: publish a change event by hand.
//!
//! Exercises the same path as the store's triggers, so a running
//! `dynacache run` reacts exactly as it would to a real row change.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::adapters::postgres::{create_pool, PgNotificationSource, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{ChangeEvent, ChangeOperation, Config, EntityKind};
use crate::domain::ports::NotificationSource;

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Row operation: insert or delete
    #[arg(value_parser = parse_operation)]
    pub operation: ChangeOperation,

    /// Table the change happened on (agents, tools)
    pub table: String,

    /// Cache id of the entity (agent_id for agents, row id for tools)
    pub id: String,

    /// Row id reported alongside an agent_id
    #[arg(long)]
    pub row_id: Option<String>,
}

fn parse_operation(s: &str) -> Result<ChangeOperation, String> {
    ChangeOperation::parse_str(s).ok_or_else(|| format!("unknown operation: {s} (expected insert or delete)"))
}

#[derive(Debug, Serialize)]
pub struct NotifyOutput {
    pub channel: String,
    pub event: ChangeEvent,
    pub payload: String,
}

impl CommandOutput for NotifyOutput {
    fn to_human(&self) -> String {
        format!(
            "Published {} {} {} on {}\n{}",
            self.event.operation, self.event.table, self.event.entity_id, self.channel, self.payload
        )
    }
}

/// Event for the given arguments, rejecting tables the cache does not track.
pub fn build_event(args: &NotifyArgs) -> Result<ChangeEvent> {
    if EntityKind::from_table(&args.table).is_none() {
        anyhow::bail!("Unknown table: {} (expected agents or tools)", args.table);
    }

    let mut event = ChangeEvent::new(args.operation, &args.table, &args.id);
    event.row_id.clone_from(&args.row_id);
    Ok(event)
}

pub async fn execute(args: NotifyArgs, config: &Config, json_mode: bool) -> Result<()> {
    let event = build_event(&args)?;
    let payload = event.to_payload();

    let pool = create_pool(&config.database.url, Some(PoolConfig::from(&config.database)))
        .await
        .context("Failed to create database pool")?;
    let channel = config.database.notification_channel.clone();

    PgNotificationSource::new(pool.clone())
        .publish(&channel, &payload)
        .await
        .with_context(|| format!("Failed to publish on channel {channel}"))?;
    pool.close().await;

    tracing::info!(channel = %channel, operation = %event.operation, table = %event.table, entity_id = %event.entity_id, "Published change event");
    output(&NotifyOutput { channel, event, payload }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(operation: &str, table: &str, id: &str) -> NotifyArgs {
        NotifyArgs {
            operation: parse_operation(operation).unwrap(),
            table: table.to_string(),
            id: id.to_string(),
            row_id: None,
        }
    }

    #[test]
    fn test_operation_parsing_is_case_insensitive() {
        assert_eq!(parse_operation("delete"), Ok(ChangeOperation::Delete));
        assert_eq!(parse_operation("INSERT"), Ok(ChangeOperation::Insert));
        assert!(parse_operation("update").is_err());
    }

    #[test]
    fn test_built_event_round_trips_through_payload() {
        let mut request = args("delete", "agents", "finance_agent");
        request.row_id = Some("6f1c".to_string());

        let event = build_event(&request).unwrap();
        let decoded = ChangeEvent::parse(&event.to_payload()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert!(build_event(&args("insert", "teams", "t1")).is_err());
    }
}
