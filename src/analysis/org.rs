//! Organization-wide analysis: every repository, merged by commit weight.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::repo::{persist, RepoAnalyzer};
use super::{AnalysisError, AnalysisOptions, DateRange, ScoreAccumulator, UserScore};
use crate::store::{AnalysisRun, CacheKey, QueryShape, RepoTally};

/// Result of analysing an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgAnalysisSummary {
    /// Organization login.
    pub organization: String,
    /// Repositories whose pipeline completed.
    pub analyzed_repos: usize,
    /// Repositories listed for the organization.
    pub total_repos: usize,
    /// Per-author averages, weighted across repositories.
    pub users: Vec<UserScore>,
    /// Always `true`.
    pub is_org_wide: bool,
    /// Served from a stored run instead of recomputed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub from_cache: bool,
    /// Stopped early by cancellation or timeout; `users` is partial.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    /// Non-fatal problems met along the way.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Runs the repository pipeline across an organization.
pub struct OrgAnalyzer {
    repos: RepoAnalyzer,
}

impl OrgAnalyzer {
    /// Builds on a repository analyzer and shares its collaborators.
    pub fn new(repos: RepoAnalyzer) -> Self {
        Self { repos }
    }

    /// Returns the underlying repository analyzer.
    pub fn repo_analyzer(&self) -> &RepoAnalyzer {
        &self.repos
    }

    /// Analyses every repository of `org` and records the merged run.
    ///
    /// Repositories whose pipeline fails are skipped. Failing to list the
    /// organization is an error.
    pub async fn analyze(
        &self,
        org: &str,
        options: &AnalysisOptions,
    ) -> Result<OrgAnalysisSummary, AnalysisError> {
        if options.prefer_cache {
            if let Some(summary) = self.cached_summary(org, &options.range) {
                return Ok(summary);
            }
        }

        let interrupt = options.interrupt();
        let repos = self.repos.source().list_org_repos(org).await?;
        let total_repos = repos.len();
        info!(org, total_repos, "Analysing organization");

        let mut accumulator = ScoreAccumulator::new();
        let mut warnings = Vec::new();
        let mut analyzed_repos = 0usize;
        let mut cancelled = false;

        for repo in &repos {
            if interrupt.is_triggered() {
                cancelled = true;
                break;
            }

            let summary = match self
                .repos
                .run(&repo.owner, &repo.name, options, &interrupt)
                .await
            {
                Ok(summary) => summary,
                Err(e) => {
                    error!(
                        repo = %repo.full_name(),
                        error = %e,
                        "Repository analysis failed, skipping"
                    );
                    warnings.push(format!("{}: skipped: {e}", repo.full_name()));
                    continue;
                }
            };

            for user in &summary.users {
                accumulator.add(
                    &user.user,
                    u64::from(user.ai_percent) * user.commits_analyzed,
                    user.commits_analyzed,
                );
            }
            warnings.extend(summary.warnings);

            if summary.cancelled {
                cancelled = true;
                break;
            }
            analyzed_repos += 1;
        }

        if cancelled {
            warn!(org, analyzed_repos, total_repos, "Organization analysis interrupted");
        }

        let users = accumulator.into_scores();
        let total_commits = users.iter().map(|user| user.commits_analyzed).sum();
        let run = AnalysisRun::new(
            QueryShape::organization(org, &options.range),
            users.clone(),
            total_commits,
        )
        .with_repos(RepoTally {
            analyzed_repos,
            total_repos,
        })
        .with_cancelled(cancelled);
        persist(self.repos.store(), run, &mut warnings);

        Ok(OrgAnalysisSummary {
            organization: org.to_string(),
            analyzed_repos,
            total_repos,
            users,
            is_org_wide: true,
            from_cache: false,
            cancelled,
            warnings,
        })
    }

    fn cached_summary(&self, org: &str, range: &DateRange) -> Option<OrgAnalysisSummary> {
        let key = CacheKey::organization(org, range);
        match self.repos.store().cached(&key) {
            Ok(Some(cached)) if !cached.users.is_empty() => {
                info!(key = %key, created_at = %cached.created_at, "Serving cached analysis");
                let tally = cached.repos.unwrap_or(RepoTally {
                    analyzed_repos: 0,
                    total_repos: 0,
                });
                Some(OrgAnalysisSummary {
                    organization: org.to_string(),
                    analyzed_repos: tally.analyzed_repos,
                    total_repos: tally.total_repos,
                    users: cached.users,
                    is_org_wide: true,
                    from_cache: true,
                    cancelled: false,
                    warnings: Vec::new(),
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, recomputing");
                None
            }
        }
    }
}
