//! Application configuration.
//!
//! Everything the tool needs from its environment is resolved once into an
//! [`AppConfig`]; the analysis code only ever sees constructed clients.

pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::analysis::{RepoAnalyzer, DEFAULT_COMMIT_LIMIT};
use crate::classifier::openai::{Endpoint, DEFAULT_AZURE_API_VERSION, DEFAULT_OPENAI_BASE_URL};
use crate::classifier::{ClassificationGateway, OpenAiClassifier};
use crate::rate_limit::{FixedInterval, RateLimiter, TokenBucket, Unlimited, DEFAULT_INTERVAL};
use crate::source::github::DEFAULT_API_URL;
use crate::source::GitHubCommitSource;
use crate::store::{open_store, FileStore, StoreBackend};

pub use settings::Settings;

/// Model used with `USE_OPENAI=true` unless `OPENAI_MODEL` is set.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

const NOT_SET: &str = "(not set)";

/// GitHub connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    /// REST API root.
    pub api_url: String,
    /// Personal access token; unauthenticated when absent.
    pub token: Option<String>,
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Commit source settings.
    pub github: GitHubConfig,
    /// Classifier endpoint.
    pub classifier: Endpoint,
    /// Where runs are stored.
    pub store: StoreBackend,
    /// Minimum spacing between classifier calls.
    pub rate_limit: Duration,
    /// Classifier calls allowed back to back before spacing applies.
    pub rate_limit_burst: u32,
    /// Commits classified per repository.
    pub commit_limit: usize,
}

impl AppConfig {
    /// Resolves configuration from the environment and the settings file.
    pub fn load() -> Result<Self> {
        let settings = Settings::load()?;
        Self::resolve(|key| settings.get_env_var(key))
    }

    /// Resolves configuration through `lookup`, which returns non-blank values.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let classifier = resolve_classifier(&lookup)?;
        Self::with_classifier(&lookup, classifier)
    }

    /// Resolves a printable view for `config show`.
    ///
    /// Missing classifier settings do not fail; they show as `(not set)` and
    /// the reason lands in [`ConfigView::problem`].
    pub fn describe(lookup: impl Fn(&str) -> Option<String>) -> Result<ConfigView> {
        match resolve_classifier(&lookup) {
            Ok(classifier) => Ok(Self::with_classifier(&lookup, classifier)?.redacted()),
            Err(e) => {
                let mut view =
                    Self::with_classifier(&lookup, unresolved_classifier(&lookup))?.redacted();
                view.problem = Some(e.to_string());
                Ok(view)
            }
        }
    }

    /// Like [`AppConfig::describe`], reading the environment and settings file.
    pub fn load_view() -> Result<ConfigView> {
        let settings = Settings::load()?;
        Self::describe(|key| settings.get_env_var(key))
    }

    fn with_classifier(
        lookup: &impl Fn(&str) -> Option<String>,
        classifier: Endpoint,
    ) -> Result<Self> {
        let github = GitHubConfig {
            api_url: lookup("AUTHORSCOPE_GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: lookup("GITHUB_TOKEN"),
        };

        let store = resolve_store(lookup)?;

        let rate_limit = match lookup("AUTHORSCOPE_RATE_LIMIT_MS") {
            Some(raw) => Duration::from_millis(parse_number("AUTHORSCOPE_RATE_LIMIT_MS", &raw)?),
            None => DEFAULT_INTERVAL,
        };

        let rate_limit_burst = match lookup("AUTHORSCOPE_RATE_LIMIT_BURST") {
            Some(raw) => u32::try_from(parse_number("AUTHORSCOPE_RATE_LIMIT_BURST", &raw)?)
                .context("AUTHORSCOPE_RATE_LIMIT_BURST is too large")?,
            None => 1,
        };

        let commit_limit = match lookup("AUTHORSCOPE_COMMIT_LIMIT") {
            Some(raw) => parse_number("AUTHORSCOPE_COMMIT_LIMIT", &raw)? as usize,
            None => DEFAULT_COMMIT_LIMIT,
        };

        Ok(Self {
            github,
            classifier,
            store,
            rate_limit,
            rate_limit_burst,
            commit_limit,
        })
    }

    /// Resolves only the store backend, for commands that never classify.
    pub fn load_store() -> Result<StoreBackend> {
        let settings = Settings::load()?;
        resolve_store(&|key: &str| settings.get_env_var(key))
    }

    /// Builds the repository analyzer from this configuration.
    pub fn build_analyzer(&self) -> Result<RepoAnalyzer> {
        let source = GitHubCommitSource::new(self.github.api_url.clone(), self.github.token.clone())
            .context("Failed to create GitHub client")?;
        let classifier = OpenAiClassifier::new(self.classifier.clone())
            .context("Failed to create classifier client")?;

        Ok(RepoAnalyzer::new(
            Arc::new(source),
            ClassificationGateway::new(Box::new(classifier)),
            self.rate_limiter(),
            open_store(&self.store),
        ))
    }

    /// Picks the pacing strategy: none for a zero interval, a token bucket
    /// when bursts are allowed, fixed spacing otherwise.
    pub fn rate_limiter(&self) -> Arc<dyn RateLimiter> {
        if self.rate_limit.is_zero() {
            Arc::new(Unlimited)
        } else if self.rate_limit_burst > 1 {
            Arc::new(TokenBucket::new(self.rate_limit_burst, self.rate_limit))
        } else {
            Arc::new(FixedInterval::new(self.rate_limit))
        }
    }

    /// Returns a printable view with credentials masked.
    pub fn redacted(&self) -> ConfigView {
        let (provider, target, model, has_key) = match &self.classifier {
            Endpoint::OpenAi {
                base_url,
                api_key,
                model,
            } => ("OpenAI", base_url.clone(), model.clone(), api_key.is_some()),
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
                api_key,
            } => (
                "Azure OpenAI",
                format!("{endpoint} (api-version {api_version})"),
                deployment.clone(),
                !api_key.is_empty(),
            ),
        };

        ConfigView {
            github_api_url: self.github.api_url.clone(),
            github_token: mask(self.github.token.is_some()),
            classifier_provider: provider.to_string(),
            classifier_endpoint: target,
            classifier_model: model,
            classifier_api_key: mask(has_key),
            store: match &self.store {
                StoreBackend::File(path) => format!("file: {}", path.display()),
                StoreBackend::Memory => "memory".to_string(),
            },
            rate_limit_ms: self.rate_limit.as_millis() as u64,
            rate_limit_burst: self.rate_limit_burst,
            commit_limit: self.commit_limit,
            problem: None,
        }
    }
}

/// Configuration as shown by `config show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigView {
    /// GitHub REST API root.
    pub github_api_url: String,
    /// Whether a GitHub token is set.
    pub github_token: String,
    /// Classifier provider.
    pub classifier_provider: String,
    /// Classifier endpoint.
    pub classifier_endpoint: String,
    /// Model or deployment name.
    pub classifier_model: String,
    /// Whether a classifier key is set.
    pub classifier_api_key: String,
    /// Store backend.
    pub store: String,
    /// Spacing between classifier calls.
    pub rate_limit_ms: u64,
    /// Calls allowed back to back.
    pub rate_limit_burst: u32,
    /// Commits classified per repository.
    pub commit_limit: usize,
    /// Why the configuration cannot run an analysis, if it cannot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

fn mask(present: bool) -> String {
    if present { "********" } else { NOT_SET }.to_string()
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'"))
}

fn resolve_store(lookup: &impl Fn(&str) -> Option<String>) -> Result<StoreBackend> {
    match lookup("AUTHORSCOPE_STORE").as_deref() {
        None | Some("file") => {
            let path = match lookup("AUTHORSCOPE_STORE_PATH") {
                Some(path) => PathBuf::from(path),
                None => FileStore::default_path()
                    .context("Failed to determine home directory for the result store")?,
            };
            Ok(StoreBackend::File(path))
        }
        Some("memory") => Ok(StoreBackend::Memory),
        Some(other) => {
            bail!("Unknown AUTHORSCOPE_STORE value '{other}': expected 'file' or 'memory'")
        }
    }
}

fn resolve_classifier(lookup: &impl Fn(&str) -> Option<String>) -> Result<Endpoint> {
    let use_openai = lookup("USE_OPENAI").is_some_and(|val| val == "true");

    if use_openai {
        let base_url = lookup("OPENAI_BASE_URL");
        let api_key = lookup("OPENAI_API_KEY");
        if api_key.is_none() && base_url.is_none() {
            bail!(
                "OpenAI API key not found.\n\
                 Set OPENAI_API_KEY, or OPENAI_BASE_URL for a local server."
            );
        }

        return Ok(Endpoint::OpenAi {
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key,
            model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        });
    }

    let (Some(api_key), Some(endpoint), Some(deployment)) = (
        lookup("AZURE_OPENAI_API_KEY"),
        lookup("AZURE_OPENAI_ENDPOINT"),
        lookup("AZURE_OPENAI_DEPLOYMENT"),
    ) else {
        bail!(
            "Azure OpenAI is not configured.\n\
             Set these environment variables:\n\
             - AZURE_OPENAI_API_KEY\n\
             - AZURE_OPENAI_ENDPOINT\n\
             - AZURE_OPENAI_DEPLOYMENT\n\
             or set USE_OPENAI=true with OPENAI_API_KEY."
        );
    };

    Ok(Endpoint::Azure {
        endpoint,
        deployment,
        api_version: lookup("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        api_key,
    })
}

/// Best-effort endpoint for display when [`resolve_classifier`] fails.
fn unresolved_classifier(lookup: &impl Fn(&str) -> Option<String>) -> Endpoint {
    let or_unset = |key: &str| lookup(key).unwrap_or_else(|| NOT_SET.to_string());

    if lookup("USE_OPENAI").is_some_and(|val| val == "true") {
        return Endpoint::OpenAi {
            base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key: lookup("OPENAI_API_KEY"),
            model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        };
    }

    Endpoint::Azure {
        endpoint: or_unset("AZURE_OPENAI_ENDPOINT"),
        deployment: or_unset("AZURE_OPENAI_DEPLOYMENT"),
        api_version: lookup("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        api_key: lookup("AZURE_OPENAI_API_KEY").unwrap_or_default(),
    }
}
