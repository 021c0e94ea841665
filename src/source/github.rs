//! GitHub REST binding for [`CommitSource`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{
    CommitDetail, CommitRef, CommitSource, FileChange, RepoRef, SourceError, SourceFuture,
};

/// Default GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size requested for commit and repository listings.
const PER_PAGE: &str = "100";

/// Filename used when the whole commit diff is returned as one blob.
const FULL_DIFF_FILENAME: &str = "full_diff.patch";

const JSON_MEDIA_TYPE: &str = "application/vnd.github.v3+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// HTTP timeout for a single GitHub request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize, Debug)]
struct WireAccount {
    login: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WireSignature {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WireCommitBody {
    author: Option<WireSignature>,
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WireCommit {
    sha: String,
    commit: WireCommitBody,
    author: Option<WireAccount>,
}

#[derive(Deserialize, Debug)]
struct WireFile {
    filename: String,
    patch: Option<String>,
    additions: Option<u64>,
    deletions: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct WireDetail {
    #[serde(default)]
    files: Vec<WireFile>,
}

#[derive(Deserialize, Debug)]
struct WireRepoOwner {
    login: String,
}

#[derive(Deserialize, Debug)]
struct WireRepo {
    name: String,
    owner: WireRepoOwner,
}

impl From<WireCommit> for CommitRef {
    fn from(wire: WireCommit) -> Self {
        let (author_name, authored_at) = match wire.commit.author {
            Some(signature) => (
                signature.name,
                signature.date.as_deref().and_then(parse_timestamp),
            ),
            None => (None, None),
        };

        Self {
            sha: wire.sha,
            author_login: wire.author.and_then(|account| account.login),
            author_name,
            authored_at,
            message: wire.commit.message,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

/// GitHub REST API client.
pub struct GitHubCommitSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubCommitSource {
    /// Creates a client against `base_url`, authenticating with `token` when given.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    /// Builds an API URL from path segments, escaping each one.
    fn endpoint(&self, segments: &[&str], paged: bool) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {e}", self.base_url)))?;

        url.path_segments_mut()
            .map_err(|()| SourceError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);

        if paged {
            url.query_pairs_mut().append_pair("per_page", PER_PAGE);
        }

        Ok(url)
    }

    fn get(&self, url: Url, accept: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("authorscope/", env!("CARGO_PKG_VERSION")));

        match self.token {
            Some(ref token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, SourceError> {
        let response = request
            .send()
            .await
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_else(|e| {
            debug!("Failed to read error response body: {e}");
            String::new()
        });
        Err(SourceError::ApiRequestFailed(format!(
            "HTTP {status}: {error_text}"
        )))
    }

    async fn fetch_commits(&self, owner: &str, repo: &str) -> Result<Vec<CommitRef>, SourceError> {
        let url = self.endpoint(&["repos", owner, repo, "commits"], true)?;
        debug!(url = %url, "Listing commits");

        let commits: Vec<WireCommit> = self
            .send(self.get(url, JSON_MEDIA_TYPE))
            .await?
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponseFormat(e.to_string()))?;

        Ok(commits.into_iter().map(CommitRef::from).collect())
    }

    async fn fetch_detail(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<CommitDetail, SourceError> {
        let url = self.endpoint(&["repos", owner, repo, "commits", sha], false)?;

        let detail: WireDetail = self
            .send(self.get(url.clone(), JSON_MEDIA_TYPE))
            .await?
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponseFormat(e.to_string()))?;

        if !detail.files.is_empty() {
            let files = detail
                .files
                .into_iter()
                .map(|f| FileChange::from_parts(f.filename, f.patch, f.additions, f.deletions))
                .collect();
            return Ok(CommitDetail { files });
        }

        warn!(repo, sha, "Commit has no file list, requesting raw diff");
        let diff = self
            .send(self.get(url, DIFF_MEDIA_TYPE))
            .await?
            .text()
            .await
            .map_err(|e| SourceError::InvalidResponseFormat(e.to_string()))?;

        Ok(CommitDetail {
            files: vec![FileChange::from_parts(
                FULL_DIFF_FILENAME.to_string(),
                Some(diff),
                None,
                None,
            )],
        })
    }

    async fn fetch_org_repos(&self, org: &str) -> Result<Vec<RepoRef>, SourceError> {
        let url = self.endpoint(&["orgs", org, "repos"], true)?;
        debug!(url = %url, "Listing organization repositories");

        let repos: Vec<WireRepo> = self
            .send(self.get(url, JSON_MEDIA_TYPE))
            .await?
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponseFormat(e.to_string()))?;

        Ok(repos
            .into_iter()
            .map(|repo| RepoRef {
                owner: repo.owner.login,
                name: repo.name,
            })
            .collect())
    }
}

impl CommitSource for GitHubCommitSource {
    fn list_commits<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
    ) -> SourceFuture<'a, Result<Vec<CommitRef>, SourceError>> {
        Box::pin(self.fetch_commits(owner, repo))
    }

    fn commit_detail<'a>(
        &'a self,
        owner: &'a str,
        repo: &'a str,
        sha: &'a str,
    ) -> SourceFuture<'a, CommitDetail> {
        Box::pin(async move {
            match self.fetch_detail(owner, repo, sha).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(owner, repo, sha, error = %e, "Failed to fetch commit detail");
                    CommitDetail::default()
                }
            }
        })
    }

    fn list_org_repos<'a>(
        &'a self,
        org: &'a str,
    ) -> SourceFuture<'a, Result<Vec<RepoRef>, SourceError>> {
        Box::pin(self.fetch_org_repos(org))
    }
}
