use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::ForecastClient;
use super::ForecastError;
use crate::config::{ForecastConfig, Provider};

/// Connection establishment bound; the overall call bound is applied by the orchestrator.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Sampling temperature. Low, so repeated runs stay close to each other.
const TEMPERATURE: f32 = 0.2;

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// HTTP client for the upstream forecasting service.
pub struct HttpForecastClient {
    provider: Provider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpForecastClient {
    pub fn new(config: &ForecastConfig) -> Result<Self, ForecastError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ForecastError::HttpClient(e.to_string()))?;

        Ok(Self {
            provider: config.provider,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ForecastError {
        if e.is_timeout() {
            ForecastError::UpstreamTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_connect() {
            ForecastError::UpstreamConnection(self.base_url.clone())
        } else {
            ForecastError::HttpClient(e.to_string())
        }
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ForecastError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok(response)
    }

    async fn generate_ollama(&self, system: &str, prompt: &str) -> Result<String, ForecastError> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: TEMPERATURE,
            },
        };

        let parsed: OllamaGenerateResponse = self
            .post("/api/generate", &body)
            .await?
            .json()
            .await
            .map_err(|e| self.map_envelope_error(e))?;

        Ok(parsed.response)
    }

    async fn generate_chat(&self, system: &str, prompt: &str) -> Result<String, ForecastError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let parsed: ChatCompletionResponse = self
            .post("/v1/chat/completions", &body)
            .await?
            .json()
            .await
            .map_err(|e| self.map_envelope_error(e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ForecastError::UpstreamEnvelope("No completion choices returned".into()))
    }

    fn map_envelope_error(&self, e: reqwest::Error) -> ForecastError {
        if e.is_timeout() {
            self.map_send_error(e)
        } else {
            ForecastError::UpstreamEnvelope(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Request body for OpenAI-compatible /v1/chat/completions
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

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

impl ForecastClient for HttpForecastClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ForecastError> {
        tracing::debug!(
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_chars = prompt.len(),
            "Sending forecast request"
        );
        match self.provider {
            Provider::Ollama => self.generate_ollama(system, prompt).await,
            Provider::OpenAiCompatible => self.generate_chat(system, prompt).await,
        }
    }
}

/// What a [`MockForecastClient`] answers with.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Status(u16),
    Unreachable,
}

/// Mock forecast client for testing. Returns a configurable reply, optionally late.
pub struct MockForecastClient {
    reply: MockReply,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockForecastClient {
    pub fn new(response: &str) -> Self {
        Self::with_reply(MockReply::Text(response.to_string()))
    }

    pub fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            delay: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

impl ForecastClient for MockForecastClient {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, ForecastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Status(status) => Err(ForecastError::UpstreamStatus {
                status: *status,
                body: "mock error".into(),
            }),
            MockReply::Unreachable => Err(ForecastError::UpstreamConnection("mock".into())),
        }
    }
}
