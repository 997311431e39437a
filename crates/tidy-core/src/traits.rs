//! Core traits for tidy abstractions.
//!
//! These traits define the collaborators the organization engine talks to:
//! the backing document store, the per-profile history store and the
//! classification service. Concrete implementations live in `tidy-db` and
//! `tidy-inference`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::history::ChangeLog;
use crate::models::*;

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Backing store for documents keyed by opaque id.
///
/// Writes are last-write-wins; no concurrency token is checked.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, including soft-deleted ones.
    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    /// Apply a partial update and return the updated document.
    async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document>;

    /// Create a document and return its id.
    async fn create(&self, fields: NewDocument) -> Result<Uuid>;

    /// Live children of `parent_id` (`None` lists the hierarchy root).
    async fn list_by_parent(&self, parent_id: Option<Uuid>) -> Result<Vec<Document>>;

    /// Every document matching `filter`.
    async fn list_all(&self, filter: DocumentFilter) -> Result<Vec<Document>>;

    /// Fetch a document or fail with [`crate::Error::DocumentNotFound`].
    async fn require(&self, id: Uuid) -> Result<Document> {
        self.get(id)
            .await?
            .ok_or(crate::Error::DocumentNotFound(id))
    }
}

/// Persistence for one user profile's bounded change history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the persisted log (empty when nothing was stored yet).
    async fn load(&self) -> Result<ChangeLog>;

    /// Replace the persisted log.
    async fn save(&self, log: &ChangeLog) -> Result<()>;
}

// =============================================================================
// CLASSIFICATION TRAITS
// =============================================================================

/// External language-model service used as the classifier.
///
/// No structured contract is enforced here; callers validate the text.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Run `prompt` (with `system` instructions) against `model`.
    async fn invoke(&self, system: &str, prompt: &str, model: &str) -> Result<String>;

    /// Backend identifier for logs ("ollama", "openai", "mock").
    fn backend_name(&self) -> &str;

    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
