//! History command.

use anyhow::{Context, Result};
use clap::Parser;

use super::OutputFormat;
use crate::config::AppConfig;
use crate::store::{open_store, AnalysisRun, ResultStore};

/// Lists stored runs, newest first.
#[derive(Parser, Debug)]
pub struct HistoryCommand {
    /// Only runs for this owner or organization.
    #[arg(long)]
    pub owner: Option<String>,

    /// Only runs for this repository.
    #[arg(long)]
    pub repo: Option<String>,

    /// Maximum runs to show.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

impl HistoryCommand {
    /// Executes the history command.
    pub fn execute(self) -> Result<()> {
        let store = open_store(&AppConfig::load_store()?);
        let runs = self.collect(store.as_ref())?;

        if runs.is_empty() {
            eprintln!("No stored analysis runs found.");
            return Ok(());
        }

        print!("{}", self.format.render(&runs)?);
        Ok(())
    }

    fn collect(&self, store: &dyn ResultStore) -> Result<Vec<AnalysisRun>> {
        let mut runs = store
            .history(self.owner.as_deref(), self.repo.as_deref())
            .context("Failed to read analysis history")?;
        if let Some(limit) = self.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::analysis::{DateRange, UserScore};
    use crate::store::{MemoryStore, QueryShape};

    #[test]
    fn collect_filters_and_limits() {
        let store = MemoryStore::new();
        for (repo, ai) in [("api", 10), ("web", 20), ("api", 30), ("api", 40)] {
            store
                .append(AnalysisRun::new(
                    QueryShape::repository("acme", repo, &DateRange::default()),
                    vec![UserScore::from_totals("alice", ai, 1)],
                    1,
                ))
                .unwrap();
        }

        let command = HistoryCommand {
            owner: Some("acme".to_string()),
            repo: Some("api".to_string()),
            limit: Some(2),
            format: OutputFormat::Json,
        };
        let runs = command.collect(&store).unwrap();

        assert_eq!(
            runs.iter().map(|r| r.users[0].ai_percent).collect::<Vec<_>>(),
            vec![40, 30]
        );
    }
}
