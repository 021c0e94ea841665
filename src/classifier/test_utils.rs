//! Shared test utilities for the `classifier` module.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::classifier::{Classifier, ClassifierMetadata};

/// Mock classifier with a pre-programmed queue of replies.
///
/// Replies are returned in FIFO order. When the queue is exhausted,
/// subsequent calls return `Err("no more mock responses")`.
///
/// Every call records the `(system_prompt, user_prompt)` pair. Use
/// [`prompt_handle`](Self::prompt_handle) to read them after the client has
/// been moved into a [`ClassificationGateway`](super::ClassificationGateway).
pub(crate) struct ConfigurableMockClassifier {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    recorded_prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl ConfigurableMockClassifier {
    /// Creates a new mock that will return the given replies in order.
    pub(crate) fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            recorded_prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a mock replying with each score in turn.
    pub(crate) fn with_scores(scores: &[u8]) -> Self {
        Self::new(scores.iter().map(|s| Ok(s.to_string())).collect())
    }

    /// Returns a handle for inspecting the prompts that were sent.
    pub(crate) fn prompt_handle(&self) -> PromptRecordHandle {
        PromptRecordHandle {
            recorded_prompts: self.recorded_prompts.clone(),
        }
    }
}

/// Shared handle to a mock classifier's recorded prompts.
pub(crate) struct PromptRecordHandle {
    recorded_prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl PromptRecordHandle {
    /// Returns all recorded `(system_prompt, user_prompt)` pairs.
    pub(crate) fn prompts(&self) -> Vec<(String, String)> {
        self.recorded_prompts.lock().unwrap().clone()
    }

    /// Returns the number of requests that were made.
    pub(crate) fn request_count(&self) -> usize {
        self.recorded_prompts.lock().unwrap().len()
    }
}

impl Classifier for ConfigurableMockClassifier {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let responses = self.responses.clone();
        let recorded = self.recorded_prompts.clone();
        let sys = system_prompt.to_string();
        let usr = user_prompt.to_string();
        Box::pin(async move {
            recorded.lock().unwrap().push((sys, usr));
            responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more mock responses")))
        })
    }

    fn get_metadata(&self) -> ClassifierMetadata {
        ClassifierMetadata {
            provider: "Mock".to_string(),
            model: "mock-model".to_string(),
        }
    }
}
