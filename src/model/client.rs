use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// A chat-capable generative model. One call, one completion; the caller
/// owns retries, fallback, and interpretation of the returned text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, model: &str, system: &str, user: &str) -> Result<String, ModelError>;
}

/// HTTP client for an OpenAI-compatible chat-completions provider.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl OpenAiCompatClient {
    /// Build a client with a hard per-call timeout.
    ///
    /// The pool is capped so calls abandoned at timeout cannot accumulate
    /// unbounded sockets while the provider keeps streaming into the void.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for POST {base}/chat/completions
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from POST {base}/chat/completions
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn generate(&self, model: &str, system: &str, user: &str) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model,
            // Low temperature: clarification, not creativity.
            temperature: 0.2,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.timeout_ms)
                } else if e.is_connect() {
                    ModelError::Connection(self.base_url.clone())
                } else {
                    ModelError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidJson(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ModelError::EmptyCompletion);
        }
        Ok(content)
    }
}

/// Scripted model for tests: pops one canned result per call and records
/// what it was asked.
pub struct MockChatModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    repeat: Option<String>,
    calls: AtomicUsize,
    models_seen: Mutex<Vec<String>>,
}

impl MockChatModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            models_seen: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always answers with the same text.
    pub fn always(response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(response.to_string()),
            calls: AtomicUsize::new(0),
            models_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn models_seen(&self) -> Vec<String> {
        self.models_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn generate(&self, model: &str, _system: &str, _user: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models_seen.lock().unwrap().push(model.to_string());
        let mut responses = self.responses.lock().unwrap();
        match responses.pop_front() {
            Some(result) => result,
            None => match &self.repeat {
                Some(text) => Ok(text.clone()),
                None => Err(ModelError::Connection("mock script exhausted".into())),
            },
        }
    }
}
