//! Configuration-related CLI commands.

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::OutputFormat;
use crate::config::{AppConfig, Settings};

/// Configuration operations.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Configuration subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Shows the resolved configuration with credentials masked.
    Show(ShowCommand),
}

/// Show command options.
#[derive(Parser)]
pub struct ShowCommand {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

impl ConfigCommand {
    /// Executes the config command.
    pub fn execute(self) -> Result<()> {
        match self.command {
            ConfigSubcommands::Show(show_cmd) => show_cmd.execute(),
        }
    }
}

impl ShowCommand {
    /// Executes the show command.
    pub fn execute(self) -> Result<()> {
        if let Ok(path) = Settings::get_settings_path() {
            eprintln!("Settings file: {}", path.display());
        }

        let view = AppConfig::load_view()?;
        print!("{}", self.format.render(&view)?);
        Ok(())
    }
}
