//! Chat-completions classifier (OpenAI-compatible endpoints and Azure OpenAI).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{Classifier, ClassifierError, ClassifierMetadata};

/// HTTP timeout for a single classification call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on reply length; the model is asked for a bare number.
const MAX_TOKENS: i32 = 500;

/// Low temperature keeps scores stable between runs.
const TEMPERATURE: f32 = 0.2;

const TOP_P: f32 = 1.0;

/// Default Azure OpenAI API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-04-01-preview";

/// Default OpenAI API root.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Chat message
#[derive(Serialize, Debug)]
struct Message {
    role: String,
    content: String,
}

/// Chat-completions request body
#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: i32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Where and how requests are sent.
#[derive(Clone, Debug)]
pub enum Endpoint {
    /// OpenAI-compatible API (`{base_url}/v1/chat/completions`, bearer auth).
    OpenAi {
        /// API root, e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token; omitted for local servers.
        api_key: Option<String>,
        /// Model identifier.
        model: String,
    },
    /// Azure OpenAI deployment (`api-key` header auth).
    Azure {
        /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
        endpoint: String,
        /// Deployment name.
        deployment: String,
        /// `api-version` query value.
        api_version: String,
        /// Resource key.
        api_key: String,
    },
}

/// Chat-completions classifier client.
pub struct OpenAiClassifier {
    client: Client,
    endpoint: Endpoint,
}

impl OpenAiClassifier {
    /// Creates a client for an explicit endpoint.
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    /// Creates a client for an OpenAI-compatible API.
    pub fn new_openai(base_url: String, api_key: Option<String>, model: String) -> Result<Self> {
        Self::new(Endpoint::OpenAi {
            base_url,
            api_key,
            model,
        })
    }

    /// Creates a client for an Azure OpenAI deployment.
    pub fn new_azure(
        endpoint: String,
        deployment: String,
        api_version: String,
        api_key: String,
    ) -> Result<Self> {
        Self::new(Endpoint::Azure {
            endpoint,
            deployment,
            api_version,
            api_key,
        })
    }

    fn model(&self) -> &str {
        match self.endpoint {
            Endpoint::OpenAi { ref model, .. } => model,
            Endpoint::Azure { ref deployment, .. } => deployment,
        }
    }

    /// Builds the chat-completions URL.
    fn api_url(&self) -> Result<Url, ClassifierError> {
        let (root, segments, api_version): (&str, Vec<&str>, Option<&str>) = match self.endpoint {
            Endpoint::OpenAi { ref base_url, .. } => {
                (base_url.as_str(), vec!["v1", "chat", "completions"], None)
            }
            Endpoint::Azure {
                ref endpoint,
                ref deployment,
                ref api_version,
                ..
            } => (
                endpoint.as_str(),
                vec![
                    "openai",
                    "deployments",
                    deployment.as_str(),
                    "chat",
                    "completions",
                ],
                Some(api_version.as_str()),
            ),
        };

        let mut url =
            Url::parse(root).map_err(|e| ClassifierError::InvalidEndpoint(format!("{root}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClassifierError::InvalidEndpoint(root.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if let Some(version) = api_version {
            url.query_pairs_mut().append_pair("api-version", version);
        }

        debug!(base_url = %root, full_url = %url, "Constructed chat-completions URL");
        Ok(url)
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model().to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            stream: false,
        };

        let api_url = self.api_url()?;
        info!(url = %api_url, model = %self.model(), user_prompt_len = user_prompt.len(), "Sending classification request");

        let mut req_builder = self
            .client
            .post(api_url)
            .header("Content-Type", "application/json")
            .json(&request);

        req_builder = match self.endpoint {
            Endpoint::OpenAi {
                api_key: Some(ref api_key),
                ..
            } => req_builder.header("Authorization", format!("Bearer {api_key}")),
            Endpoint::OpenAi { api_key: None, .. } => req_builder,
            Endpoint::Azure { ref api_key, .. } => req_builder.header("api-key", api_key),
        };

        let response = req_builder
            .send()
            .await
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|e| {
                debug!("Failed to read error response body: {e}");
                String::new()
            });
            return Err(
                ClassifierError::ApiRequestFailed(format!("HTTP {status}: {error_text}")).into(),
            );
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponseFormat(e.to_string()))?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            debug!("Classifier returned an empty reply");
        }

        Ok(text)
    }
}

impl Classifier for OpenAiClassifier {
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete(system_prompt, user_prompt))
    }

    fn get_metadata(&self) -> ClassifierMetadata {
        let provider = match self.endpoint {
            Endpoint::OpenAi { .. } => "OpenAI",
            Endpoint::Azure { .. } => "Azure OpenAI",
        };

        ClassifierMetadata {
            provider: provider.to_string(),
            model: self.model().to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn azure(endpoint: &str) -> OpenAiClassifier {
        OpenAiClassifier::new_azure(
            endpoint.to_string(),
            "gpt4o".to_string(),
            DEFAULT_AZURE_API_VERSION.to_string(),
            "azure-key".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn openai_url() {
        let client = OpenAiClassifier::new_openai(
            "http://localhost:11434/".to_string(),
            None,
            "llama3".to_string(),
        )
        .unwrap();
        assert_eq!(
            client.api_url().unwrap().as_str(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn azure_url() {
        let client = azure("https://res.openai.azure.com");
        assert_eq!(
            client.api_url().unwrap().as_str(),
            "https://res.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-04-01-preview"
        );
    }

    #[test]
    fn metadata_names_provider() {
        let meta = azure("https://res.openai.azure.com").get_metadata();
        assert_eq!(meta.provider, "Azure OpenAI");
        assert_eq!(meta.model, "gpt4o");
    }

    #[tokio::test]
    async fn azure_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt4o/chat/completions"))
            .and(query_param("api-version", DEFAULT_AZURE_API_VERSION))
            .and(header("api-key", "azure-key"))
            .and(body_partial_json(json!({
                "model": "gpt4o",
                "max_tokens": 500,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "File: a.rs\n+x" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": "42" } } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = azure(&server.uri())
            .send_request("sys", "File: a.rs\n+x")
            .await
            .unwrap();
        assert_eq!(reply, "42");
    }

    #[tokio::test]
    async fn openai_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "content": "7" } } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClassifier::new_openai(
            server.uri(),
            Some("sk-test".to_string()),
            "gpt-4o-mini".to_string(),
        )
        .unwrap();
        assert_eq!(client.send_request("sys", "diff").await.unwrap(), "7");
    }

    #[tokio::test]
    async fn missing_content_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let reply = azure(&server.uri()).send_request("sys", "diff").await.unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn http_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = azure(&server.uri())
            .send_request("sys", "diff")
            .await
            .unwrap_err();
        let err = err.downcast::<ClassifierError>().unwrap();
        assert!(matches!(err, ClassifierError::ApiRequestFailed(ref m) if m.contains("429")));
    }
}
