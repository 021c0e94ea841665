//! AI-likelihood classification of diff summaries.
//!
//! [`Classifier`] is the raw chat-completion seam; [`ClassificationGateway`]
//! turns its replies into a score in `0..=100` and absorbs failures so that a
//! bad call never ends a run.

pub mod error;
pub mod openai;

#[cfg(test)]
pub(crate) mod test_utils;

use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, warn};

pub use error::ClassifierError;
pub use openai::OpenAiClassifier;

/// Instruction sent with every diff summary.
pub const SYSTEM_PROMPT: &str = "You are an expert code analyzer. Analyze the following code diff and determine the percentage likelihood that it was written with AI assistance (0-100%). Return only a number.";

/// Highest score the gateway reports.
pub const MAX_SCORE: u8 = 100;

static SCORE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{1,3}").unwrap());

/// Metadata about a classifier implementation.
#[derive(Clone, Debug)]
pub struct ClassifierMetadata {
    /// Service provider name.
    pub provider: String,
    /// Model or deployment identifier.
    pub model: String,
}

/// Trait for external classification services.
pub trait Classifier: Send + Sync {
    /// Sends a request and returns the raw reply text.
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Returns metadata about the classifier implementation.
    fn get_metadata(&self) -> ClassifierMetadata;
}

/// Outcome of classifying one summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Blank input; the classifier was not called.
    Skipped,
    /// The classifier replied.
    Scored(u8),
    /// The call failed and scores as zero.
    Failed(String),
}

impl Classification {
    /// Returns the score contributed to the author's average.
    #[must_use]
    pub fn score(&self) -> u8 {
        match self {
            Self::Scored(score) => *score,
            Self::Skipped | Self::Failed(_) => 0,
        }
    }

    /// Returns `true` when the external classifier was actually invoked.
    #[must_use]
    pub fn called_classifier(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Extracts a score from a reply: the first run of 1-3 ASCII digits,
/// clamped to `0..=100`. Replies without digits score 0.
#[must_use]
pub fn parse_score(reply: &str) -> u8 {
    SCORE_PATTERN
        .find(reply.trim())
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .map_or(0, |value| value.min(u16::from(MAX_SCORE)) as u8)
}

/// Failure-tolerant front of a [`Classifier`].
pub struct ClassificationGateway {
    classifier: Box<dyn Classifier>,
}

impl ClassificationGateway {
    /// Wraps a classifier.
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Returns the wrapped classifier's metadata.
    pub fn metadata(&self) -> ClassifierMetadata {
        self.classifier.get_metadata()
    }

    /// Scores `text`.
    pub async fn classify(&self, text: &str) -> Classification {
        if text.trim().is_empty() {
            debug!("Empty summary, skipping classifier call");
            return Classification::Skipped;
        }

        match self.classifier.send_request(SYSTEM_PROMPT, text).await {
            Ok(reply) => {
                let score = parse_score(&reply);
                debug!(reply = %reply.trim(), score, "Classifier replied");
                Classification::Scored(score)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Classification failed, scoring as 0");
                Classification::Failed(format!("{e:#}"))
            }
        }
    }
}
