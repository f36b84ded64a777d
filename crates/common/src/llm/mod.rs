//! Language model abstraction
//!
//! Provides a unified interface for chat-completion providers:
//! - OpenAI-compatible chat completions endpoints
//! - An in-process mock for tests and local development

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

/// Trait for text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt, returning the generated text
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    rate_limit_retries: u32,
    initial_backoff: Duration,
    timeout: Duration,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            rate_limit_retries: config.rate_limit_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            timeout,
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system_prompt },
                ChatMessage { role: "user", content: &request.user_prompt },
            ],
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LanguageModelTimeout { timeout_ms: self.timeout.as_millis() as u64 }
                } else {
                    AppError::LanguageModel { message: format!("Request failed: {}", e) }
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LanguageModelRateLimited { message: body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LanguageModel {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| AppError::LanguageModel {
            message: format!("Failed to parse response: {}", e),
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AppError::LanguageModel {
                message: "Empty response from language model".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    /// Rate-limit responses are retried after exponential backoff, up to
    /// `rate_limit_retries` times. Every other error is returned at once.
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_elapsed_time(Some(self.timeout))
            .build();

        let max_attempts = self.rate_limit_retries as usize + 1;
        let attempts = AtomicUsize::new(0);
        let request = &request;

        retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                match self.send_once(request).await {
                    Ok(text) => Ok(text),
                    Err(e) if e.is_rate_limit() && attempt < max_attempts => {
                        tracing::warn!(attempt, max_attempts, model = %self.model, "Language model rate limited, backing off");
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync;

/// Mock language model for testing
pub struct MockLanguageModel {
    responder: Arc<Responder>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLanguageModel {
    /// Always answer with `text`
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_responder(move |_| Ok(text.clone()))
    }

    /// Always fail with a language model error
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_responder(move |_| Err(AppError::LanguageModel { message: message.clone() }))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "llm.api_key is required for the openai provider".to_string(),
                })?;
            Ok(Arc::new(OpenAiChatModel::new(config, key)?))
        }
        "mock" => {
            tracing::warn!("Using mock language model");
            Ok(Arc::new(MockLanguageModel::new(
                "Mock answer based on the provided evidence [1]. [Mock response - language model not configured]",
            )))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown language model provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max_output_tokens: usize) -> CompletionRequest {
        CompletionRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            temperature: 0.2,
            max_output_tokens,
        }
    }

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let model = MockLanguageModel::new("answer [1]");
        assert_eq!(model.complete(request(300)).await.unwrap(), "answer [1]");
        assert_eq!(model.complete(request(800)).await.unwrap(), "answer [1]");
        assert_eq!(model.call_count(), 2);
        assert_eq!(model.requests()[1].max_output_tokens, 800);
    }

    #[tokio::test]
    async fn test_mock_responder() {
        let model = MockLanguageModel::with_responder(|req| {
            if req.max_output_tokens > 500 {
                Err(AppError::LanguageModel { message: "too long".to_string() })
            } else {
                Ok("short".to_string())
            }
        });
        assert!(model.complete(request(300)).await.is_ok());
        assert!(matches!(
            model.complete(request(800)).await,
            Err(AppError::LanguageModel { .. })
        ));
    }

    #[test]
    fn test_factory() {
        let mut config = LlmConfig::default();
        config.provider = "mock".to_string();
        assert_eq!(create_language_model(&config).unwrap().model_name(), "mock-llm");

        config.provider = "openai".to_string();
        config.api_key = None;
        assert!(matches!(
            create_language_model(&config),
            Err(AppError::Configuration { .. })
        ));

        config.api_key = Some("sk-test".to_string());
        assert_eq!(create_language_model(&config).unwrap().model_name(), config.model);

        config.provider = "unknown".to_string();
        assert!(create_language_model(&config).is_err());
    }
}
