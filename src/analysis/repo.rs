//! Single-repository pipeline: filter, sample, summarize, classify, average.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    sample_commits, AnalysisError, AnalysisOptions, DateRange, Interrupt, ScoreAccumulator,
    UserScore,
};
use crate::classifier::{Classification, ClassificationGateway};
use crate::rate_limit::RateLimiter;
use crate::source::{CommitRef, CommitSource};
use crate::store::{AnalysisRun, CacheKey, Persisted, QueryShape, ResultStore, StoreError};
use crate::summary::summarize_commit;

/// Result of analysing one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Reported equal to `total_commits`.
    pub analyzed_commits: u64,
    /// Commits inside the date range, before the sampling limit.
    pub total_commits: u64,
    /// Per-author averages.
    pub users: Vec<UserScore>,
    /// Always `false` for repository runs.
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

/// What happened to one sampled commit.
enum CommitOutcome {
    /// The diff summary was blank; nothing to classify.
    NoSignal,
    /// The summary went to the classifier.
    Classified(Classification),
}

/// Drives the per-repository pipeline.
pub struct RepoAnalyzer {
    source: Arc<dyn CommitSource>,
    gateway: ClassificationGateway,
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn ResultStore>,
}

impl RepoAnalyzer {
    /// Wires the pipeline from its collaborators.
    pub fn new(
        source: Arc<dyn CommitSource>,
        gateway: ClassificationGateway,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            source,
            gateway,
            limiter,
            store,
        }
    }

    /// Returns the commit source.
    pub fn source(&self) -> &dyn CommitSource {
        self.source.as_ref()
    }

    /// Returns the result store.
    pub fn store(&self) -> &dyn ResultStore {
        self.store.as_ref()
    }

    /// Returns stored runs newest first, optionally filtered.
    pub fn history(
        &self,
        owner: Option<&str>,
        repo: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        self.store.history(owner, repo)
    }

    /// Analyses one repository and records the run.
    pub async fn analyze(
        &self,
        owner: &str,
        repo: &str,
        options: &AnalysisOptions,
    ) -> Result<AnalysisSummary, AnalysisError> {
        if options.prefer_cache {
            if let Some(summary) = self.cached_summary(owner, repo, &options.range) {
                return Ok(summary);
            }
        }

        self.run(owner, repo, options, &options.interrupt()).await
    }

    /// Serves the newest complete stored run for the same query, if it has
    /// users.
    fn cached_summary(
        &self,
        owner: &str,
        repo: &str,
        range: &DateRange,
    ) -> Option<AnalysisSummary> {
        let key = CacheKey::repository(owner, repo, range);
        match self.store.cached(&key) {
            Ok(Some(cached)) if !cached.users.is_empty() => {
                info!(key = %key, created_at = %cached.created_at, "Serving cached analysis");
                Some(AnalysisSummary {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    analyzed_commits: cached.total_commits,
                    total_commits: cached.total_commits,
                    users: cached.users,
                    is_org_wide: false,
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

    /// Computes and records a fresh run, sharing the caller's interrupt.
    pub(crate) async fn run(
        &self,
        owner: &str,
        repo: &str,
        options: &AnalysisOptions,
        interrupt: &Interrupt,
    ) -> Result<AnalysisSummary, AnalysisError> {
        let commits = self.source.list_commits(owner, repo).await?;
        let (total, sampled) = sample_commits(commits, &options.range, options.commit_limit);
        info!(
            owner,
            repo,
            total,
            sampled = sampled.len(),
            model = %self.gateway.metadata().model,
            "Analysing repository"
        );

        let mut accumulator = ScoreAccumulator::new();
        let mut warnings = Vec::new();
        let mut cancelled = false;
        let mut processed = 0usize;

        for commit in &sampled {
            if interrupt.is_triggered() {
                cancelled = true;
                break;
            }

            let outcome = tokio::select! {
                biased;
                () = interrupt.triggered() => {
                    cancelled = true;
                    break;
                }
                outcome = self.score_commit(owner, repo, commit) => outcome,
            };
            processed += 1;

            match outcome {
                CommitOutcome::NoSignal | CommitOutcome::Classified(Classification::Skipped) => {
                    warn!(owner, repo, sha = %commit.sha, "Empty diff summary, commit skipped");
                }
                CommitOutcome::Classified(classification) => {
                    if let Classification::Failed(ref reason) = classification {
                        warnings.push(format!(
                            "classification failed for {}: {reason}",
                            commit.sha
                        ));
                    }
                    accumulator.add(
                        commit.author_identity(),
                        u64::from(classification.score()),
                        1,
                    );
                }
            }
        }

        if cancelled {
            warn!(
                owner,
                repo,
                processed,
                sampled = sampled.len(),
                "Repository analysis interrupted"
            );
            warnings.push(format!(
                "{owner}/{repo}: interrupted after {processed} of {} sampled commits",
                sampled.len()
            ));
        }

        let users = accumulator.into_scores();
        let run = AnalysisRun::new(
            QueryShape::repository(owner, repo, &options.range),
            users.clone(),
            total as u64,
        )
        .with_cancelled(cancelled);
        persist(self.store.as_ref(), run, &mut warnings);

        Ok(AnalysisSummary {
            owner: owner.to_string(),
            repo: repo.to_string(),
            analyzed_commits: total as u64,
            total_commits: total as u64,
            users,
            is_org_wide: false,
            from_cache: false,
            cancelled,
            warnings,
        })
    }

    async fn score_commit(&self, owner: &str, repo: &str, commit: &CommitRef) -> CommitOutcome {
        let detail = self.source.commit_detail(owner, repo, &commit.sha).await;
        debug!(sha = %commit.sha, files = detail.files.len(), "Fetched commit detail");

        let Some(summary) = summarize_commit(commit, &detail) else {
            return CommitOutcome::NoSignal;
        };

        self.limiter.acquire().await;
        CommitOutcome::Classified(self.gateway.classify(&summary).await)
    }
}

/// Appends a run, turning store trouble into warnings on the summary.
pub(crate) fn persist(store: &dyn ResultStore, run: AnalysisRun, warnings: &mut Vec<String>) {
    match store.append(run) {
        Ok(Persisted::Primary) => {}
        Ok(Persisted::Fallback { reason }) => warnings.push(format!(
            "result store unavailable, run kept in memory only: {reason}"
        )),
        Err(e) => {
            warn!(error = %e, "Failed to persist analysis run");
            warnings.push(format!("failed to persist analysis run: {e}"));
        }
    }
}
