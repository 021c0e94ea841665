//! CLI interface for authorscope.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub mod analyze;
pub mod config;
pub mod history;

/// authorscope: estimates how much of each author's work looks AI-assisted.
#[derive(Parser)]
#[command(name = "authorscope")]
#[command(
    about = "Estimates per-author AI-assistance likelihood from commit diffs",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// The main command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Main command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Analyses a repository or a whole organization.
    Analyze(analyze::AnalyzeCommand),
    /// Lists stored analysis runs.
    History(history::HistoryCommand),
    /// Shows the resolved configuration.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze(analyze_cmd) => analyze_cmd.execute().await,
            Commands::History(history_cmd) => history_cmd.execute(),
            Commands::Config(config_cmd) => config_cmd.execute(),
        }
    }
}

/// Output formats for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML document.
    #[default]
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Renders `value` in this format.
    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            Self::Yaml => {
                serde_yaml::to_string(value).context("Failed to serialize output as YAML")
            }
            Self::Json => {
                serde_json::to_string_pretty(value).context("Failed to serialize output as JSON")
            }
        }
    }
}
