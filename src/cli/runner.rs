//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{load_config, RunConfig};
use crate::connector::{ExtractContext, DEFAULT_CONCURRENCY};
use crate::connectors::{build_connector, list_connectors};
use crate::error::{Error, Result};
use crate::output::EntitySink;
use crate::runner::run_connector;
use serde_json::{json, Value};
use std::path::Path;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { config, output } => self.extract(config, output.as_deref()).await,
            Commands::Validate { config } => self.validate(config),
            Commands::List => {
                self.list_connectors();
                Ok(())
            }
        }
    }

    fn load(&self, path: &Path, output: Option<&str>) -> Result<RunConfig> {
        let mut config = load_config(path)?;
        if let Some(location) = output {
            config.output.location = location.to_string();
        }
        Ok(config)
    }

    async fn extract(&self, path: &Path, output: Option<&str>) -> Result<()> {
        let config = self.load(path, output)?;
        let connector = build_connector(&config.source)?;
        let ctx = ExtractContext::new(config.run_name())
            .with_concurrency(config.concurrency.unwrap_or(DEFAULT_CONCURRENCY));
        let sink = EntitySink::new(config.output.clone())?;

        let metadata = run_connector(connector.as_ref(), ctx, &sink).await?;
        self.output_message(&json!({
            "type": "RUN",
            "run": metadata,
            "location": format!("{}/{}", config.output.location.trim_end_matches('/'), sink.run_dir(&metadata.run_name)),
        }));

        if metadata.is_failure() {
            return Err(Error::Other(format!(
                "Run '{}' failed: {}",
                metadata.run_name,
                metadata.error_message.unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let config = self.load(path, None)?;
        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Run '{}' is valid: {} source writing to {}",
                    config.run_name(),
                    config.source.kind(),
                    config.output.location
                )
            }
        }));
        Ok(())
    }

    fn list_connectors(&self) {
        let connectors: Vec<Value> = list_connectors()
            .into_iter()
            .map(|info| {
                json!({
                    "name": info.name,
                    "description": info.description,
                    "category": info.category,
                    "entities": info.entities
                })
            })
            .collect();

        self.output_message(&json!({
            "type": "CONNECTORS",
            "connectors": connectors
        }));
    }

    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
