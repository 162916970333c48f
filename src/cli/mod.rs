//! CLI module
//!
//! Command-line interface for running connectors.
//!
//! # Commands
//!
//! - `run` - Extract metadata with the configured connector
//! - `validate` - Check a run configuration without running it
//! - `list` - List built-in connectors

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
