//! Analysis commands.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::OutputFormat;
use crate::analysis::{AnalysisOptions, DateRange, OrgAnalyzer};
use crate::config::AppConfig;

/// Analysis operations.
#[derive(Parser)]
pub struct AnalyzeCommand {
    /// What to analyse.
    #[command(subcommand)]
    pub command: AnalyzeSubcommands,
}

/// Analysis subcommands.
#[derive(Subcommand)]
pub enum AnalyzeSubcommands {
    /// Analyses a single repository.
    Repo(RepoCommand),
    /// Analyses every repository of an organization.
    Org(OrgCommand),
}

/// Options shared by all analysis runs.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only commits authored at or after this date (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    pub since: Option<String>,

    /// Only commits authored at or before this date (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum commits classified per repository (overrides configuration).
    #[arg(long)]
    pub commit_limit: Option<usize>,

    /// Returns the newest stored run for the same query when one exists.
    #[arg(long)]
    pub prefer_cache: bool,

    /// Stops after this many seconds and reports partial results.
    #[arg(long, value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

impl RunArgs {
    fn options(&self, config: &AppConfig) -> Result<AnalysisOptions> {
        let range = DateRange::parse(self.since.as_deref(), self.until.as_deref())?;

        Ok(AnalysisOptions {
            range,
            commit_limit: self.commit_limit.unwrap_or(config.commit_limit),
            prefer_cache: self.prefer_cache,
            timeout: self.timeout_secs.map(Duration::from_secs),
            cancel: CancellationToken::new(),
        })
    }
}

/// Repository analysis options.
#[derive(Parser, Debug)]
pub struct RepoCommand {
    /// Repository owner (user or organization).
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// Run options.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Organization analysis options.
#[derive(Parser, Debug)]
pub struct OrgCommand {
    /// Organization login.
    pub org: String,

    /// Run options.
    #[command(flatten)]
    pub run: RunArgs,
}

impl AnalyzeCommand {
    /// Executes the analyze command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            AnalyzeSubcommands::Repo(repo_cmd) => repo_cmd.execute().await,
            AnalyzeSubcommands::Org(org_cmd) => org_cmd.execute().await,
        }
    }
}

impl RepoCommand {
    /// Executes the repository analysis.
    pub async fn execute(self) -> Result<()> {
        let config = AppConfig::load()?;
        let options = self.run.options(&config)?;
        let analyzer = config.build_analyzer()?;

        cancel_on_ctrl_c(options.cancel.clone());
        let summary = analyzer
            .analyze(&self.owner, &self.repo, &options)
            .await
            .with_context(|| format!("Failed to analyse {}/{}", self.owner, self.repo))?;

        print!("{}", with_newline(self.run.format.render(&summary)?));
        Ok(())
    }
}

impl OrgCommand {
    /// Executes the organization analysis.
    pub async fn execute(self) -> Result<()> {
        let config = AppConfig::load()?;
        let options = self.run.options(&config)?;
        let analyzer = OrgAnalyzer::new(config.build_analyzer()?);

        cancel_on_ctrl_c(options.cancel.clone());
        let summary = analyzer
            .analyze(&self.org, &options)
            .await
            .with_context(|| format!("Failed to analyse organization {}", self.org))?;

        print!("{}", with_newline(self.run.format.render(&summary)?));
        Ok(())
    }
}

/// Cancels `token` on the first Ctrl-C so the run ends with partial results.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with partial results");
            token.cancel();
        }
    });
}

fn with_newline(mut rendered: String) -> String {
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    rendered
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classifier::openai::Endpoint;
    use crate::config::GitHubConfig;
    use crate::store::StoreBackend;

    fn config() -> AppConfig {
        AppConfig {
            github: GitHubConfig {
                api_url: "http://localhost".to_string(),
                token: None,
            },
            classifier: Endpoint::OpenAi {
                base_url: "http://localhost".to_string(),
                api_key: None,
                model: "m".to_string(),
            },
            store: StoreBackend::Memory,
            rate_limit: Duration::ZERO,
            rate_limit_burst: 1,
            commit_limit: 25,
        }
    }

    fn args(since: Option<&str>, until: Option<&str>, commit_limit: Option<usize>) -> RunArgs {
        RunArgs {
            since: since.map(String::from),
            until: until.map(String::from),
            commit_limit,
            prefer_cache: false,
            timeout_secs: Some(5),
            format: OutputFormat::Yaml,
        }
    }

    #[test]
    fn options_fall_back_to_configured_limit() {
        let options = args(None, None, None).options(&config()).unwrap();
        assert_eq!(options.commit_limit, 25);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));

        let options = args(None, None, Some(3)).options(&config()).unwrap();
        assert_eq!(options.commit_limit, 3);
    }

    #[test]
    fn options_reject_bad_dates() {
        assert!(args(Some("yesterday"), None, None).options(&config()).is_err());
        assert!(args(Some("2024-02-01"), Some("2024-01-01"), None)
            .options(&config())
            .is_err());
    }
}
