//! In-memory commit source for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::{
    CommitDetail, CommitRef, CommitSource, FileChange, RepoRef, SourceError, SourceFuture,
};

/// Commit source backed by fixed maps.
///
/// Repositories registered with [`fail_repo`](Self::fail_repo) return an
/// error from `list_commits`. Every detail lookup is recorded so tests can
/// check which commits were sampled.
#[derive(Default)]
pub(crate) struct MockCommitSource {
    commits: HashMap<String, Vec<CommitRef>>,
    details: HashMap<String, CommitDetail>,
    org_repos: HashMap<String, Vec<RepoRef>>,
    failing: HashSet<String>,
    detail_requests: Arc<Mutex<Vec<String>>>,
}

impl MockCommitSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a commit and its detail under `owner/repo`.
    pub(crate) fn with_commit(
        mut self,
        owner: &str,
        repo: &str,
        commit: CommitRef,
        detail: CommitDetail,
    ) -> Self {
        self.details.insert(commit.sha.clone(), detail);
        self.commits
            .entry(format!("{owner}/{repo}"))
            .or_default()
            .push(commit);
        self
    }

    pub(crate) fn with_org(mut self, org: &str, repos: &[&str]) -> Self {
        self.org_repos.insert(
            org.to_string(),
            repos
                .iter()
                .map(|name| RepoRef {
                    owner: org.to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        );
        self
    }

    pub(crate) fn fail_repo(mut self, owner: &str, repo: &str) -> Self {
        self.failing.insert(format!("{owner}/{repo}"));
        self
    }

    /// Returns a handle to the SHAs whose details were requested.
    pub(crate) fn detail_requests(&self) -> Arc<Mutex<Vec<String>>> {
        self.detail_requests.clone()
    }
}

impl CommitSource for MockCommitSource {
    fn list_commits<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
    ) -> SourceFuture<'a, Result<Vec<CommitRef>, SourceError>> {
        let key = format!("{owner}/{repo}");
        Box::pin(async move {
            if self.failing.contains(&key) {
                return Err(SourceError::ApiRequestFailed(format!("HTTP 404: {key}")));
            }
            Ok(self.commits.get(&key).cloned().unwrap_or_default())
        })
    }

    fn commit_detail<'a>(
        &'a self,
        _owner: &'a str,
        _repo: &'a str,
        sha: &'a str,
    ) -> SourceFuture<'a, CommitDetail> {
        Box::pin(async move {
            self.detail_requests.lock().unwrap().push(sha.to_string());
            self.details.get(sha).cloned().unwrap_or_default()
        })
    }

    fn list_org_repos<'a>(
        &'a self,
        org: &'a str,
    ) -> SourceFuture<'a, Result<Vec<RepoRef>, SourceError>> {
        Box::pin(async move {
            self.org_repos
                .get(org)
                .cloned()
                .ok_or_else(|| SourceError::ApiRequestFailed(format!("HTTP 404: {org}")))
        })
    }
}

/// Builds a commit authored by `login` at an RFC 3339 timestamp.
pub(crate) fn commit(sha: &str, login: &str, date: &str) -> CommitRef {
    CommitRef {
        sha: sha.to_string(),
        author_login: Some(login.to_string()),
        author_name: None,
        authored_at: Some(
            DateTime::parse_from_rfc3339(date)
                .unwrap()
                .with_timezone(&Utc),
        ),
        message: Some(format!("commit {sha}")),
    }
}

/// Builds a single-file patch detail.
pub(crate) fn patch_detail(filename: &str, patch: &str) -> CommitDetail {
    CommitDetail {
        files: vec![FileChange::Patch {
            filename: filename.to_string(),
            patch: patch.to_string(),
        }],
    }
}
