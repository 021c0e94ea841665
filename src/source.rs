//! Commit listing and per-commit file changes.
//!
//! The analysis pipeline only talks to a [`CommitSource`]; the GitHub REST
//! binding lives in [`github`].

pub mod error;
pub mod github;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::SourceError;
pub use github::GitHubCommitSource;

/// A commit as listed by the source, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    /// Full commit SHA.
    pub sha: String,
    /// Structured account identifier of the author, if the source linked one.
    pub author_login: Option<String>,
    /// Free-text author name recorded on the commit.
    pub author_name: Option<String>,
    /// Author timestamp.
    pub authored_at: Option<DateTime<Utc>>,
    /// Commit message, used when no file changes are available.
    pub message: Option<String>,
}

impl CommitRef {
    /// Resolves the identity a score is attributed to.
    ///
    /// Account login first, then the recorded author name, then `unknown`.
    /// Empty strings count as absent.
    #[must_use]
    pub fn author_identity(&self) -> &str {
        self.author_login
            .as_deref()
            .filter(|login| !login.is_empty())
            .or_else(|| self.author_name.as_deref().filter(|name| !name.is_empty()))
            .unwrap_or(UNKNOWN_AUTHOR)
    }
}

/// Label used when a commit carries no usable author identity.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// One file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    /// The source supplied patch text for the file.
    Patch {
        /// Path of the file.
        filename: String,
        /// Unified diff hunk text.
        patch: String,
    },
    /// Only line counts are known (binary or oversized files).
    StatOnly {
        /// Path of the file.
        filename: String,
        /// Lines added.
        additions: u64,
        /// Lines deleted.
        deletions: u64,
    },
    /// Neither patch nor counts; carries no signal.
    Empty {
        /// Path of the file.
        filename: String,
    },
}

impl FileChange {
    /// Builds the variant from loosely-populated wire fields.
    ///
    /// A non-empty patch wins; otherwise non-zero counts produce a
    /// [`FileChange::StatOnly`] with a missing side rendered as zero.
    #[must_use]
    pub fn from_parts(
        filename: String,
        patch: Option<String>,
        additions: Option<u64>,
        deletions: Option<u64>,
    ) -> Self {
        match patch {
            Some(patch) if !patch.is_empty() => Self::Patch { filename, patch },
            _ => {
                let additions = additions.unwrap_or(0);
                let deletions = deletions.unwrap_or(0);
                if additions > 0 || deletions > 0 {
                    Self::StatOnly {
                        filename,
                        additions,
                        deletions,
                    }
                } else {
                    Self::Empty { filename }
                }
            }
        }
    }

    /// Returns the file path.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::Patch { filename, .. }
            | Self::StatOnly { filename, .. }
            | Self::Empty { filename } => filename,
        }
    }
}

/// Itemized file changes of a single commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetail {
    /// Changed files in source order.
    pub files: Vec<FileChange>,
}

/// A repository belonging to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Owning account or organization.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoRef {
    /// Returns `owner/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Boxed future returned by [`CommitSource`] methods.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for commit-history backends.
pub trait CommitSource: Send + Sync {
    /// Lists commits of a repository, most recent first.
    fn list_commits<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
    ) -> SourceFuture<'a, Result<Vec<CommitRef>, SourceError>>;

    /// Returns the file changes of one commit.
    ///
    /// Implementations return an empty [`CommitDetail`] on not-found or
    /// transient errors instead of failing.
    fn commit_detail<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        sha: &'a str,
    ) -> SourceFuture<'a, CommitDetail>;

    /// Lists the repositories owned by an organization.
    fn list_org_repos<'a>(
        &'a self,
        org: &'a str,
    ) -> SourceFuture<'a, Result<Vec<RepoRef>, SourceError>>;
}

#[cfg(test)]
pub(crate) mod test_utils;
