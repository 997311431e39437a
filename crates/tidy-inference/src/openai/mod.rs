//! OpenAI-compatible classification backend.
//!
//! Works with any endpoint exposing `/chat/completions`: the OpenAI cloud API,
//! Ollama in compatibility mode, vLLM, LM Studio.
//!
//! ```rust,no_run
//! use tidy_inference::openai::OpenAIBackend;
//! use tidy_core::ClassificationService;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let text = backend.invoke("", "Say hi as JSON", "gpt-4o-mini").await.unwrap();
//!     println!("{}", text);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{to_tidy_error, OpenAIErrorCode};
pub use types::*;
