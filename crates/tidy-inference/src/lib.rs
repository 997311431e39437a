//! # tidy-inference
//!
//! Classification service backends for tidy.
//!
//! This crate provides:
//! - Ollama chat backend (default, feature `ollama`)
//! - OpenAI-compatible chat backend (feature `openai`)
//! - Deterministic mock classifier (feature `mock`)
//! - [`ClassifierConfig`] choosing the backend and the primary/fallback models
//!
//! Every backend implements [`tidy_core::ClassificationService`] and takes
//! the model name per call.
//!
//! ```rust,no_run
//! use tidy_inference::OllamaBackend;
//! use tidy_core::ClassificationService;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env().unwrap();
//!     let text = backend.invoke("", "Reply with []", "granite4:3b").await.unwrap();
//!     println!("{}", text);
//! }
//! ```

pub mod config;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use tidy_core::*;

pub use config::{ClassifierBackend, ClassifierConfig};

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockClassifier;
