//! Text generation clients.
//!
//! The enrichment stage talks to a [`TextGenerator`]; [`OpenRouterClient`]
//! implements it against an OpenAI-compatible chat-completions endpoint.

use crate::{
    config::LlmConfig,
    error::{Error, Result},
};
use reqwest::{blocking::Client, header, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// A blocking prompt → text completion service.
pub trait TextGenerator {
    /// Generates a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response carries no
    /// text.
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Identifier of the model answering the prompts.
    fn model_name(&self) -> &str;
}

/// Chat-completions client for OpenRouter and OpenAI-compatible APIs.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenRouterClient {
    /// Creates a client from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid (for instance the API
    /// key is missing) or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.api_key.as_deref().unwrap_or_default();

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
        headers.insert(header::REFERER, header_value(&config.site_url)?);
        headers.insert("X-Title", header_value(&config.site_name)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Returns the chat-completions URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TextGenerator for OpenRouterClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Sending request to {} ({} chars)", self.endpoint, prompt.len());
        let started = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::generation(format!("request to {} timed out", self.endpoint))
                } else if e.is_connect() {
                    Error::generation(format!("failed to connect to {}: {e}", self.endpoint))
                } else {
                    Error::from(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::generation("rate limited by the API (HTTP 429)"));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::generation(format!("API error (HTTP {status}): {body}")));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| Error::generation(format!("unreadable response: {e}")))?;

        debug!("Completion received in {:.2}s", started.elapsed().as_secs_f64());

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::generation("response contained no message content"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn header_value(value: &str) -> Result<header::HeaderValue> {
    header::HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("invalid header value: {e}")))
}

/// Test double that answers every prompt and records what it was asked.
#[cfg(test)]
pub(crate) struct MockGenerator {
    prompts: std::cell::RefCell<Vec<String>>,
    fail_on: Option<usize>,
}

#[cfg(test)]
impl MockGenerator {
    /// Creates a generator answering `description #n` for the n-th call.
    pub(crate) fn new() -> Self {
        Self {
            prompts: std::cell::RefCell::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Creates a generator whose call number `call` (0-based) fails.
    pub(crate) fn failing_on(call: usize) -> Self {
        Self {
            prompts: std::cell::RefCell::new(Vec::new()),
            fail_on: Some(call),
        }
    }

    /// Number of prompts received.
    pub(crate) fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    /// Prompts received so far.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

#[cfg(test)]
impl TextGenerator for MockGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let call = self.calls();
        self.prompts.borrow_mut().push(prompt.to_string());
        if self.fail_on == Some(call) {
            return Err(Error::generation("mock failure"));
        }
        Ok(format!("  description #{call}\n"))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let err = OpenRouterClient::new(&LlmConfig::builder().build()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_client_endpoint() {
        let config = LlmConfig::builder()
            .api_key("sk-test")
            .base_url("http://localhost:8080/v1/")
            .model("test/model")
            .build();
        let client = OpenRouterClient::new(&config).unwrap();

        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model_name(), "test/model");
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "m",
            temperature: 0.5,
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"id": "x", "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("Hi"));

        let empty: ChatResponse = serde_json::from_str(r#"{"error": "nope"}"#).unwrap();
        assert!(empty.choices.is_empty());
    }

    #[test]
    fn test_mock_generator_records_prompts() {
        let mock = MockGenerator::new();
        assert_eq!(mock.generate("one").unwrap().trim(), "description #0");
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.prompts(), vec!["one".to_string()]);

        let failing = MockGenerator::failing_on(0);
        assert!(failing.generate("x").is_err());
    }
}
