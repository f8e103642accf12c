//! `dynacache inspect agents|tools`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::commands::connect;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{CallContext, Config, EntityKind, EntitySnapshot};
use crate::domain::ports::EntityStore;
use crate::services::fingerprint;

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommands,

    /// Also build each entity through the cache and report the outcome
    #[arg(long, global = true)]
    pub build: bool,
}

#[derive(Subcommand, Debug)]
pub enum InspectCommands {
    /// Active agents
    Agents,
    /// Active tools
    Tools,
}

#[derive(Debug, Serialize)]
pub struct EntityRow {
    pub id: String,
    pub fingerprint: String,
    pub last_modified: Option<String>,
    pub owner_ref: Option<String>,
    /// `built`, an error message, or absent when not requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl From<&EntitySnapshot> for EntityRow {
    fn from(snapshot: &EntitySnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            fingerprint: fingerprint(snapshot),
            last_modified: snapshot.last_modified.map(|t| t.to_rfc3339()),
            owner_ref: snapshot.owner_ref.clone(),
            build: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InspectOutput {
    pub kind: EntityKind,
    pub entities: Vec<EntityRow>,
    pub total: usize,
}

impl CommandOutput for InspectOutput {
    fn to_human(&self) -> String {
        let show_build = self.entities.iter().any(|e| e.build.is_some());
        let mut headers = vec!["id", "fingerprint", "last modified", "owner"];
        if show_build {
            headers.push("build");
        }

        let mut table = list_table(&headers);
        for entity in &self.entities {
            let mut row = vec![
                truncate(&entity.id, 36),
                entity.fingerprint.clone(),
                entity.last_modified.clone().unwrap_or_else(|| "-".to_string()),
                entity.owner_ref.clone().unwrap_or_else(|| "-".to_string()),
            ];
            if show_build {
                row.push(truncate(entity.build.as_deref().unwrap_or("-"), 48));
            }
            table.add_row(row);
        }

        render_list(self.kind.as_str(), &table, self.total)
    }
}

fn describe<T, E: std::fmt::Display>(result: &Result<T, E>) -> String {
    match result {
        Ok(_) => "built".to_string(),
        Err(e) => e.to_string(),
    }
}

pub async fn execute(args: InspectArgs, config: &Config, json_mode: bool) -> Result<()> {
    let wiring = connect(config).await?;
    let service = &wiring.service;

    let (kind, mut entities) = match args.command {
        InspectCommands::Agents => {
            let ids = service.list_agents().await.context("Failed to list agents")?;
            let snapshots = wiring.agent_store.snapshots(&ids).await?;
            let mut rows: Vec<EntityRow> = snapshots.iter().map(EntityRow::from).collect();
            if args.build {
                let ctx = CallContext::default();
                for row in &mut rows {
                    row.build = Some(describe(&service.get_agent(&row.id, &ctx).await));
                }
            }
            (EntityKind::Agent, rows)
        }
        InspectCommands::Tools => {
            let ids = service.list_tools().await.context("Failed to list tools")?;
            let snapshots = wiring.tool_store.snapshots(&ids).await?;
            let mut rows: Vec<EntityRow> = snapshots.iter().map(EntityRow::from).collect();
            if args.build {
                let outcome = service.get_tools(&ids).await?;
                for row in &mut rows {
                    let failure = outcome.failures.iter().find(|f| f.entity_id == row.id);
                    row.build = Some(failure.map_or_else(|| "built".to_string(), |f| f.error.to_string()));
                }
            }
            (EntityKind::Tool, rows)
        }
    };

    entities.sort_by(|a, b| a.id.cmp(&b.id));
    let total = entities.len();
    wiring.pool.close().await;

    output(&InspectOutput { kind, entities, total }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_rows_show_fingerprint_and_build_column() {
        let snapshot = EntitySnapshot::new("web_agent", Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()))
            .with_owner("u-7");
        let mut row = EntityRow::from(&snapshot);
        assert_eq!(row.fingerprint, fingerprint(&snapshot));

        let plain = InspectOutput {
            kind: EntityKind::Agent,
            entities: vec![EntityRow::from(&snapshot)],
            total: 1,
        };
        assert!(!plain.to_human().contains("BUILD"));

        row.build = Some("built".to_string());
        let built = InspectOutput {
            kind: EntityKind::Agent,
            entities: vec![row],
            total: 1,
        };
        let human = built.to_human();
        assert!(human.contains("BUILD"));
        assert!(human.contains("u-7"));

        let json = built.to_json();
        assert_eq!(json["entities"][0]["build"], "built");
        assert_eq!(json["kind"], "agent");
    }
}
