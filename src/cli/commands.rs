//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Metadata connectors CLI
#[derive(Parser, Debug)]
#[command(name = "metadata-connectors")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format for status messages
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured connector and write its output
    Run {
        /// Run configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Override `output.location` (local path or cloud URL)
        /// Supports: /path, s3://bucket/path, r2://bucket/path, gs://bucket/path, az://container/path
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Load and validate a run configuration without running it
    Validate {
        /// Run configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List built-in connectors
    List,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_output_override() {
        let cli = Cli::parse_from([
            "metadata-connectors",
            "run",
            "--config",
            "nightly.yaml",
            "--output",
            "s3://bucket/metadata",
        ]);
        match cli.command {
            Commands::Run { config, output } => {
                assert_eq!(config, PathBuf::from("nightly.yaml"));
                assert_eq!(output.as_deref(), Some("s3://bucket/metadata"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_validate_requires_config() {
        assert!(Cli::try_parse_from(["metadata-connectors", "validate"]).is_err());
        let cli = Cli::try_parse_from(["metadata-connectors", "list", "--format", "pretty"]).unwrap();
        assert!(matches!(cli.command, Commands::List));
        assert_eq!(cli.format, OutputFormat::Pretty);
    }
}
