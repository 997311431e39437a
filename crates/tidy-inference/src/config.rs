//! Classifier configuration.
//!
//! Selects the backend and the primary/fallback model pair from environment
//! variables:
//!
//! - `TIDY_CLASSIFIER_BACKEND`: `ollama` (default) or `openai`
//! - `TIDY_PRIMARY_MODEL`, `TIDY_FALLBACK_MODEL`
//!
//! ```rust,no_run
//! use tidy_inference::config::ClassifierConfig;
//!
//! let config = ClassifierConfig::from_env();
//! let classifier = config.build().expect("classifier backend");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use tidy_core::defaults::{FALLBACK_MODEL, PRIMARY_MODEL};
use tidy_core::{ClassificationService, Error, Result};

/// Classification backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    #[default]
    Ollama,
    OpenAI,
}

impl FromStr for ClassifierBackend {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(Error::Config(format!("Invalid classifier backend: {}", s))),
        }
    }
}

impl fmt::Display for ClassifierBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

/// Backend choice and the model pair the routing engine tries in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    pub primary_model: String,
    pub fallback_model: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            primary_model: PRIMARY_MODEL.to_string(),
            fallback_model: FALLBACK_MODEL.to_string(),
        }
    }
}

impl ClassifierConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// An unrecognised backend name keeps the default backend.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backend = std::env::var("TIDY_CLASSIFIER_BACKEND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.backend);
        let primary_model = std::env::var("TIDY_PRIMARY_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.primary_model);
        let fallback_model = std::env::var("TIDY_FALLBACK_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.fallback_model);

        Self {
            backend,
            primary_model,
            fallback_model,
        }
    }

    /// Construct the configured backend.
    pub fn build(&self) -> Result<Arc<dyn ClassificationService>> {
        info!(
            subsystem = "inference",
            backend = %self.backend,
            primary_model = %self.primary_model,
            fallback_model = %self.fallback_model,
            "Building classifier"
        );
        match self.backend {
            #[cfg(feature = "ollama")]
            ClassifierBackend::Ollama => Ok(Arc::new(crate::OllamaBackend::from_env()?)),
            #[cfg(feature = "openai")]
            ClassifierBackend::OpenAI => Ok(Arc::new(crate::openai::OpenAIBackend::from_env()?)),
            #[allow(unreachable_patterns)]
            other => Err(Error::Config(format!(
                "classifier backend '{}' is not compiled in",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(
            "OpenAI".parse::<ClassifierBackend>().unwrap(),
            ClassifierBackend::OpenAI
        );
        assert_eq!(
            " ollama ".parse::<ClassifierBackend>().unwrap(),
            ClassifierBackend::Ollama
        );
        assert!("gemini".parse::<ClassifierBackend>().is_err());
    }

    #[test]
    fn test_backend_display_roundtrip() {
        for backend in [ClassifierBackend::Ollama, ClassifierBackend::OpenAI] {
            assert_eq!(backend.to_string().parse::<ClassifierBackend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_default_models() {
        let config = ClassifierConfig::default();
        assert_eq!(config.primary_model, PRIMARY_MODEL);
        assert_eq!(config.fallback_model, FALLBACK_MODEL);
        assert_ne!(config.primary_model, config.fallback_model);
    }

    #[cfg(feature = "ollama")]
    #[test]
    fn test_build_default_backend() {
        let classifier = ClassifierConfig::default().build().unwrap();
        assert_eq!(classifier.backend_name(), "ollama");
    }
}
