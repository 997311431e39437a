//! In-memory store implementing [`DocumentStore`] and [`HistoryStore`].
//!
//! Backs tests and embedded single-user setups. Documents live in a `HashMap`
//! behind a `tokio::sync::RwLock`; the change history is held for exactly one
//! profile. Write failures can be injected per document id or per created
//! title to exercise error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use tidy_core::{
    new_v7, ChangeLog, Document, DocumentFilter, DocumentPatch, DocumentStore, Error,
    HistoryStore, NewDocument, Result,
};

/// In-memory document and history store.
pub struct MemoryStore {
    docs: RwLock<HashMap<Uuid, Document>>,
    history: RwLock<ChangeLog>,
    failing_updates: RwLock<HashSet<Uuid>>,
    failing_titles: RwLock<HashSet<String>>,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_history_capacity(tidy_core::defaults::HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            history: RwLock::new(ChangeLog::new(capacity)),
            failing_updates: RwLock::new(HashSet::new()),
            failing_titles: RwLock::new(HashSet::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent update of `id` fail.
    pub async fn fail_updates_for(&self, id: Uuid) {
        self.failing_updates.write().await.insert(id);
    }

    /// Stop failing updates of `id`.
    pub async fn heal_updates_for(&self, id: Uuid) {
        self.failing_updates.write().await.remove(&id);
    }

    /// Make creating any document titled `title` fail.
    pub async fn fail_creates_titled(&self, title: impl Into<String>) {
        self.failing_titles.write().await.insert(title.into());
    }

    /// Number of successful document creates and updates so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every stored document, including soft-deleted ones.
    pub async fn documents(&self) -> Vec<Document> {
        self.docs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document> {
        if self.failing_updates.read().await.contains(&id) {
            return Err(Error::Internal(format!("injected write failure for {}", id)));
        }

        let mut docs = self.docs.write().await;
        let doc = docs.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;

        if let Some(title) = patch.title {
            doc.title = title;
        }
        if let Some(parent_id) = patch.parent_id {
            doc.parent_id = parent_id;
        }
        if let Some(content) = patch.content {
            if doc.is_container() {
                return Err(Error::InvalidInput(format!(
                    "container {} cannot hold content",
                    id
                )));
            }
            doc.content_text = patch
                .content_text
                .clone()
                .unwrap_or_else(|| content.plain_text());
            doc.content = Some(content);
        } else if let Some(text) = patch.content_text {
            doc.content_text = text;
        }
        if let Some(metadata) = patch.metadata {
            doc.metadata = metadata;
        }
        if let Some(deleted) = patch.deleted {
            doc.deleted = deleted;
        }
        doc.updated_at = Utc::now();

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(doc.clone())
    }

    async fn create(&self, fields: NewDocument) -> Result<Uuid> {
        if self.failing_titles.read().await.contains(&fields.title) {
            return Err(Error::Internal(format!(
                "injected create failure for '{}'",
                fields.title
            )));
        }

        let id = new_v7();
        let now = Utc::now();
        let content = match fields.kind {
            tidy_core::DocumentKind::Container => None,
            tidy_core::DocumentKind::Leaf => Some(fields.content.unwrap_or_default()),
        };
        let content_text = content.as_ref().map(|c| c.plain_text()).unwrap_or_default();

        let doc = Document {
            id,
            title: fields.title,
            parent_id: fields.parent_id,
            kind: fields.kind,
            organized: fields.organized,
            content,
            content_text,
            metadata: fields.metadata,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.docs.write().await.insert(id, doc);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn list_by_parent(&self, parent_id: Option<Uuid>) -> Result<Vec<Document>> {
        let mut children: Vec<Document> = self
            .docs
            .read()
            .await
            .values()
            .filter(|d| d.parent_id == parent_id && !d.deleted)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn list_all(&self, filter: DocumentFilter) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .docs
            .read()
            .await
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.id);
        Ok(docs)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load(&self) -> Result<ChangeLog> {
        Ok(self.history.read().await.clone())
    }

    async fn save(&self, log: &ChangeLog) -> Result<()> {
        *self.history.write().await = log.clone();
        Ok(())
    }
}
