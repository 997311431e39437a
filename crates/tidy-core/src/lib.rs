//! # tidy-core
//!
//! Core types, traits, and abstractions for tidy, the note auto-organization
//! engine.
//!
//! This crate provides the document and block data model, the bounded change
//! history, the event bus, and the store/classifier traits that the other tidy
//! crates implement or depend on.

pub mod content;
pub mod defaults;
pub mod error;
pub mod events;
pub mod history;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use content::*;
pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, OrganizeEvent};
pub use history::*;
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
