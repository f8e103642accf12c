//! `dynacache config`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::postgres::redact;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
    #[serde(skip)]
    yaml: String,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        self.yaml.trim_end().to_string()
    }
}

pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let mut config = config.clone();
    config.database.url = redact(&config.database.url);

    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    output(&ConfigOutput { config, yaml }, json_mode);
    Ok(())
}
