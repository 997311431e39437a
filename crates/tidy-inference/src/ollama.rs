//! Ollama classification backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use tidy_core::{ClassificationService, Error, Result};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = tidy_core::defaults::OLLAMA_URL;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = tidy_core::defaults::GEN_TIMEOUT_SECS;

/// Ollama backend talking to the `/api/chat` endpoint.
///
/// The model is chosen per request so one backend serves both the primary and
/// the fallback classifier model.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    gen_timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a backend against the default local endpoint.
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL.to_string(), GEN_TIMEOUT_SECS)
    }

    /// Create a backend with a custom endpoint and generation timeout.
    pub fn with_config(base_url: String, gen_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(gen_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!(
            subsystem = "inference",
            component = "ollama",
            url = %base_url,
            gen_timeout_secs,
            "Initializing Ollama backend"
        );

        Ok(Self {
            client,
            base_url,
            gen_timeout_secs,
        })
    }

    /// Create from environment variables (`OLLAMA_BASE`, `TIDY_GEN_TIMEOUT_SECS`).
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let gen_timeout = std::env::var("TIDY_GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(GEN_TIMEOUT_SECS);

        Self::with_config(base_url, gen_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// `"json"` constrains the output to a single JSON value.
    format: serde_json::Value,
    /// Keeps reasoning models from leaking chain-of-thought into the content.
    think: bool,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl ClassificationService for OllamaBackend {
    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "ollama", op = "invoke", model = %model, prompt_len = prompt.len()))]
    async fn invoke(&self, system: &str, prompt: &str, model: &str) -> Result<String> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            format: serde_json::json!("json"),
            think: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Classification complete"
        );
        if elapsed > tidy_core::defaults::SLOW_GENERATION_MS {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow classification call"
            );
        }
        Ok(content)
    }

    fn backend_name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("Ollama health check passed");
                Ok(true)
            }
            Ok(resp) => {
                warn!("Ollama health check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama health check error: {}", e);
                Ok(false)
            }
        }
    }
}
