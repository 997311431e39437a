//! Mock classification backend for deterministic testing.
//!
//! Responses are scripted per model name, so tests can make the primary model
//! fail and the fallback succeed (or both fail) without a live server.
//!
//! ```rust,ignore
//! use tidy_inference::mock::MockClassifier;
//! use tidy_core::ClassificationService;
//!
//! #[tokio::test]
//! async fn test_with_mock_classifier() {
//!     let classifier = MockClassifier::new()
//!         .with_response("primary", r#"[{"targetPath":"/Errands","content":"Buy milk"}]"#);
//!
//!     let text = classifier.invoke("", "prompt", "primary").await.unwrap();
//!     assert!(text.contains("Errands"));
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use tidy_core::{ClassificationService, Error, Result};

/// Mock classifier for testing.
#[derive(Clone)]
pub struct MockClassifier {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    responses: HashMap<String, String>,
    default_response: String,
    failing_models: HashSet<String>,
    unreachable: bool,
    latency_ms: u64,
}

/// One recorded `invoke` call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: "[]".to_string(),
            failing_models: HashSet::new(),
            unreachable: false,
            latency_ms: 0,
        }
    }
}

impl MockClassifier {
    /// Create a mock that answers every model with an empty routing array.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Response for models without a specific mapping.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Response returned whenever `model` is invoked.
    pub fn with_response(mut self, model: impl Into<String>, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .insert(model.into(), response.into());
        self
    }

    /// Make every call against `model` fail with an inference error.
    pub fn with_failing_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .failing_models
            .insert(model.into());
        self
    }

    /// Make every call fail as if the service could not be reached.
    pub fn unreachable(mut self) -> Self {
        Arc::make_mut(&mut self.config).unreachable = true;
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    pub fn call_count(&self) -> usize {
        self.log().len()
    }

    /// Models invoked so far, in call order.
    pub fn models_called(&self) -> Vec<String> {
        self.log().iter().map(|c| c.model.clone()).collect()
    }

    pub fn clear_calls(&self) {
        self.log().clear()
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassificationService for MockClassifier {
    async fn invoke(&self, system: &str, prompt: &str, model: &str) -> Result<String> {
        self.log().push(MockCall {
            model: model.to_string(),
            system: system.to_string(),
            prompt: prompt.to_string(),
            timestamp: std::time::Instant::now(),
        });

        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.unreachable {
            return Err(Error::Request("connection refused (mock)".to_string()));
        }
        if self.config.failing_models.contains(model) {
            return Err(Error::Inference(format!("mock failure for model {}", model)));
        }

        Ok(self
            .config
            .responses
            .get(model)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone()))
    }

    fn backend_name(&self) -> &str {
        "mock"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.config.unreachable)
    }
}
