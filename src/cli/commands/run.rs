//! `dynacache run`: serve the cache until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::postgres::PgNotificationSource;
use crate::cli::commands::connect;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::Config;
use crate::services::{CacheStatsReport, ListenerSettings, PreloadReport};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Build every active agent before serving (also enabled by cache.preload_on_start)
    #[arg(long)]
    pub preload: bool,

    /// Restrict preloading to these agent ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub agents: Vec<String>,

    /// Do not attach the LISTEN/NOTIFY change listener
    #[arg(long)]
    pub no_listener: bool,

    /// Log cache statistics every N seconds (0 disables)
    #[arg(long, default_value = "0")]
    pub stats_interval: u64,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub preload: Option<PreloadReport>,
    pub stats: CacheStatsReport,
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(preload) = &self.preload {
            lines.push(format!(
                "Preloaded {}/{} agent(s)",
                preload.built, preload.requested
            ));
            if !preload.failed.is_empty() {
                lines.push(format!("Failed: {}", preload.failed.join(", ")));
            }
        }
        lines.push(self.stats.to_human());
        lines.join("\n")
    }
}

impl CommandOutput for CacheStatsReport {
    fn to_human(&self) -> String {
        let mut table = list_table(&["cache", "entries", "active", "expired", "ttl"]);
        for entity in [&self.agents, &self.tools] {
            table.add_row(vec![
                entity.kind.as_str().to_string(),
                entity.total.to_string(),
                entity.active.to_string(),
                entity.expired.to_string(),
                format!("{}s", entity.ttl_seconds),
            ]);
        }
        table.add_row(vec![
            "team".to_string(),
            self.teams.cached_composites.to_string(),
            format!("{} members", self.teams.total_members),
            "-".to_string(),
            "-".to_string(),
        ]);
        for list in [&self.agent_list, &self.tool_list] {
            table.add_row(vec![
                format!("{} list", list.kind.as_str()),
                list.cached_ids.to_string(),
                list.status.as_str().to_string(),
                "-".to_string(),
                format!("{}s", list.ttl_seconds),
            ]);
        }

        let listener = self.listener.as_ref().map_or_else(
            || "Listener: not attached".to_string(),
            |l| {
                format!(
                    "Listener: {} ({} received, {} applied, {} malformed, {} reconnects)",
                    l.state,
                    l.stats.events_received,
                    l.stats.events_applied,
                    l.stats.malformed_events,
                    l.stats.reconnects
                )
            },
        );

        format!("{table}\n{listener}")
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let wiring = connect(config).await?;
    let service = wiring.service;

    let preload = if args.preload || !args.agents.is_empty() || config.cache.preload_on_start {
        let ids = (!args.agents.is_empty()).then_some(args.agents.as_slice());
        Some(service.preload(ids).await.context("Failed to preload agents")?)
    } else {
        None
    };

    if config.listener.enabled && !args.no_listener {
        let source = Arc::new(PgNotificationSource::new(wiring.pool.clone()));
        service
            .start_listener(source, ListenerSettings::from_config(&config.database, &config.listener))
            .await;
    }
    service.start_maintenance().await;

    tracing::info!(
        channel = %config.database.notification_channel,
        listener = config.listener.enabled && !args.no_listener,
        "Cache service running, press Ctrl-C to stop"
    );

    let mut ticker = (args.stats_interval > 0).then(|| tokio::time::interval(Duration::from_secs(args.stats_interval)));
    let exit = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break Ok(());
            }
            stopped = service.listener_stopped() => {
                break stopped.context("Change listener stopped, cache invalidation is no longer live");
            }
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                let stats = service.stats().await;
                tracing::info!(
                    agents = stats.agents.active,
                    tools = stats.tools.active,
                    teams = stats.teams.cached_composites,
                    listener = ?stats.listener.as_ref().map(|l| l.state),
                    "Cache statistics"
                );
            }
        }
    };

    let stats = service.stats().await;
    let stopped = service.shutdown().await;
    wiring.pool.close().await;
    exit?;
    stopped.context("Listener stopped with an error")?;

    output(&RunSummary { preload, stats }, json_mode);
    Ok(())
}
