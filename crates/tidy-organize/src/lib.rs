//! # tidy-organize
//!
//! The note auto-organization engine.
//!
//! This crate provides:
//! - Per-block identity and organization tracking ([`blocks`])
//! - Idle, double-Enter and manual triggers with debounce and a per-document
//!   single-flight guard ([`TriggerManager`])
//! - Destination tree snapshots for grounding the classifier
//! - Classifier routing with model fallback and an Inbox safety net
//!   ([`RoutingEngine`])
//! - Content-preserving chunk application with folder creation
//!   ([`ChunkApplier`])
//! - Bounded change history with preview and revert ([`VersionService`])
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidy_organize::{Organizer, OrganizerConfig, TriggerManager};
//! use tidy_db::MemoryStore;
//! use tidy_core::EventBus;
//!
//! let store = Arc::new(MemoryStore::new());
//! let classifier = tidy_inference::ClassifierConfig::from_env().build()?;
//! let config = OrganizerConfig::from_env();
//! let organizer = Arc::new(Organizer::new(
//!     store.clone(),
//!     store.clone(),
//!     classifier,
//!     EventBus::default(),
//!     config.clone(),
//! ));
//!
//! // Drive runs from editor activity
//! let triggers = TriggerManager::new(config.trigger, organizer.clone());
//! triggers.content_changed(document_id);
//!
//! // Or run one pass directly
//! let report = organizer.run(document_id).await?;
//! println!("Filed into {:?}", report.apply.changed_paths);
//! ```

pub mod applier;
pub mod blocks;
pub mod config;
pub mod destination_tree;
pub mod pipeline;
pub mod routing;
pub mod trigger;
pub mod versions;

pub use applier::{AppliedChunk, ApplyOutcome, ApplyReport, ChunkApplier, SkippedChunk};
pub use config::OrganizerConfig;
pub use destination_tree::{build_tree, load_destination_tree, serialize_tree};
pub use pipeline::{Organizer, RunReport};
pub use routing::{RoutingConfig, RoutingEngine, RoutingOutcome, RoutingRequest, RoutingSource};
pub use trigger::{
    OrganizeRunner, RunState, TriggerConfig, TriggerDecision, TriggerManager, TriggerReason,
};
pub use versions::{RevertAction, RevertPreview, RevertResult, VersionService};
