//! Append-only persistence of analysis runs.
//!
//! Every run becomes one [`AnalysisRun`]; nothing is updated in place.
//! History and cache lookups both read the newest matching runs.

pub mod error;
pub mod fallback;
pub mod file;
pub mod memory;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{DateRange, UserScore};

pub use error::StoreError;
pub use fallback::FallbackStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Parameters a run was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryShape {
    /// Repository owner, or the organization for org-wide runs.
    pub owner: String,
    /// Repository name; empty for org-wide runs.
    pub repo: String,
    /// Inclusive lower bound on author dates.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on author dates.
    pub until: Option<DateTime<Utc>>,
    /// Whether the run aggregated a whole organization.
    pub is_org_wide: bool,
}

impl QueryShape {
    /// Shape of a single-repository run.
    #[must_use]
    pub fn repository(owner: &str, repo: &str, range: &DateRange) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            since: range.since,
            until: range.until,
            is_org_wide: false,
        }
    }

    /// Shape of an organization-wide run.
    #[must_use]
    pub fn organization(org: &str, range: &DateRange) -> Self {
        Self {
            owner: org.to_string(),
            repo: String::new(),
            since: range.since,
            until: range.until,
            is_org_wide: true,
        }
    }
}

/// Repository counts of an organization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoTally {
    /// Repositories whose pipeline completed.
    pub analyzed_repos: usize,
    /// Repositories listed for the organization.
    pub total_repos: usize,
}

/// One persisted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    /// When the run was recorded.
    pub created_at: DateTime<Utc>,
    /// What was analysed.
    pub query: QueryShape,
    /// One entry per author.
    pub users: Vec<UserScore>,
    /// Post-filter commit count for repo runs; summed analysed commits for
    /// org runs.
    pub total_commits: u64,
    /// Repository counts, for org runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repos: Option<RepoTally>,
    /// Stopped early; `users` covers only the commits reached.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl AnalysisRun {
    /// Creates a run stamped with the current time.
    #[must_use]
    pub fn new(query: QueryShape, users: Vec<UserScore>, total_commits: u64) -> Self {
        Self {
            created_at: Utc::now(),
            query,
            users,
            total_commits,
            repos: None,
            cancelled: false,
        }
    }

    /// Attaches repository counts.
    #[must_use]
    pub fn with_repos(mut self, repos: RepoTally) -> Self {
        self.repos = Some(repos);
        self
    }

    /// Marks the run as interrupted.
    #[must_use]
    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }
}

/// Repository part of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// A single repository.
    Repo(String),
    /// A whole organization.
    Org,
}

/// Lookup key for cached runs: owner, repository or org, and date bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Repository owner or organization.
    pub owner: String,
    /// Repository or organization scope.
    pub scope: CacheScope,
    /// Lower date bound the run used.
    pub since: Option<DateTime<Utc>>,
    /// Upper date bound the run used.
    pub until: Option<DateTime<Utc>>,
}

impl CacheKey {
    /// Key of a single-repository query.
    #[must_use]
    pub fn repository(owner: &str, repo: &str, range: &DateRange) -> Self {
        Self {
            owner: owner.to_string(),
            scope: CacheScope::Repo(repo.to_string()),
            since: range.since,
            until: range.until,
        }
    }

    /// Key of an organization-wide query.
    #[must_use]
    pub fn organization(org: &str, range: &DateRange) -> Self {
        Self {
            owner: org.to_string(),
            scope: CacheScope::Org,
            since: range.since,
            until: range.until,
        }
    }

    /// Whether a stored run was computed for this key.
    #[must_use]
    pub fn matches(&self, query: &QueryShape) -> bool {
        let scope_matches = match self.scope {
            CacheScope::Org => query.is_org_wide,
            CacheScope::Repo(ref repo) => !query.is_org_wide && query.repo == *repo,
        };

        scope_matches
            && query.owner == self.owner
            && query.since == self.since
            && query.until == self.until
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repo = match self.scope {
            CacheScope::Repo(ref repo) => repo.as_str(),
            CacheScope::Org => "org",
        };
        let bound = |date: Option<DateTime<Utc>>| {
            date.map_or_else(|| "all".to_string(), |d| d.to_rfc3339())
        };
        write!(
            f,
            "{}/{}_{}_{}",
            self.owner,
            repo,
            bound(self.since),
            bound(self.until)
        )
    }
}

/// Users and totals of the newest run matching a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResult {
    /// Per-author scores.
    pub users: Vec<UserScore>,
    /// Total commits of the newest matching run.
    pub total_commits: u64,
    /// Repository counts, for org runs.
    pub repos: Option<RepoTally>,
    /// When the cached run was recorded.
    pub created_at: DateTime<Utc>,
}

/// Where an appended run ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// Written to the configured backend.
    Primary,
    /// The durable backend failed; the run is only held in memory.
    Fallback {
        /// Why the durable write failed.
        reason: String,
    },
}

/// Trait for run storage backends.
pub trait ResultStore: Send + Sync {
    /// Appends a run.
    fn append(&self, run: AnalysisRun) -> Result<Persisted, StoreError>;

    /// Returns runs newest first, optionally filtered by owner and repository.
    fn history(&self, owner: Option<&str>, repo: Option<&str>)
        -> Result<Vec<AnalysisRun>, StoreError>;

    /// Returns the newest complete run matching `key`, if any.
    ///
    /// Interrupted runs stay in history but are never served as cached.
    fn cached(&self, key: &CacheKey) -> Result<Option<CachedResult>, StoreError> {
        Ok(self
            .history(Some(&key.owner), None)?
            .into_iter()
            .find(|run| !run.cancelled && key.matches(&run.query))
            .map(|run| CachedResult {
                users: run.users,
                total_commits: run.total_commits,
                repos: run.repos,
                created_at: run.created_at,
            }))
    }
}

/// Whether a run passes optional owner/repository filters.
pub(crate) fn run_matches(run: &AnalysisRun, owner: Option<&str>, repo: Option<&str>) -> bool {
    owner.map_or(true, |owner| run.query.owner == owner)
        && repo.map_or(true, |repo| run.query.repo == repo)
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// JSON-lines file with in-memory fallback.
    File(PathBuf),
    /// Process-local only.
    Memory,
}

/// Opens the configured backend.
#[must_use]
pub fn open_store(backend: &StoreBackend) -> Arc<dyn ResultStore> {
    match backend {
        StoreBackend::File(path) => Arc::new(FallbackStore::new(Box::new(FileStore::new(
            path.clone(),
        )))),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn range(since: Option<&str>) -> DateRange {
        DateRange::parse(since, None).unwrap()
    }

    #[test]
    fn cache_key_display() {
        let key = CacheKey::repository("acme", "api", &range(Some("2024-01-01")));
        assert_eq!(key.to_string(), "acme/api_2024-01-01T00:00:00+00:00_all");
        assert_eq!(
            CacheKey::organization("acme", &range(None)).to_string(),
            "acme/org_all_all"
        );
    }

    #[test]
    fn cache_key_matches_scope_and_bounds() {
        let r = range(Some("2024-01-01"));
        let key = CacheKey::repository("acme", "api", &r);

        assert!(key.matches(&QueryShape::repository("acme", "api", &r)));
        assert!(!key.matches(&QueryShape::repository("acme", "web", &r)));
        assert!(!key.matches(&QueryShape::repository("acme", "api", &range(None))));
        assert!(!key.matches(&QueryShape::organization("acme", &r)));

        let org_key = CacheKey::organization("acme", &r);
        assert!(org_key.matches(&QueryShape::organization("acme", &r)));
        assert!(!org_key.matches(&QueryShape::repository("acme", "api", &r)));
    }

    #[test]
    fn run_serializes_camel_case() {
        let mut run = AnalysisRun::new(
            QueryShape::organization("acme", &range(None)),
            vec![UserScore::from_totals("bob", 60, 1)],
            1,
        )
        .with_repos(RepoTally {
            analyzed_repos: 1,
            total_repos: 2,
        });
        run.created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["query"]["isOrgWide"], true);
        assert_eq!(json["totalCommits"], 1);
        assert_eq!(json["repos"]["totalRepos"], 2);
        assert_eq!(json["users"][0]["aiPercent"], 60);

        assert!(json.get("cancelled").is_none());

        let back: AnalysisRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, run);
    }

    #[test]
    fn interrupted_run_round_trips_its_marker() {
        let run = AnalysisRun::new(
            QueryShape::repository("acme", "api", &range(None)),
            vec![UserScore::from_totals("alice", 90, 1)],
            3,
        )
        .with_cancelled(true);

        let line = serde_json::to_string(&run).unwrap();
        assert!(line.contains("\"cancelled\":true"));
        let back: AnalysisRun = serde_json::from_str(&line).unwrap();
        assert!(back.cancelled);
    }
}
