//! Version and revert service over the bounded change history.
//!
//! Only changes still present in the history can be previewed or reverted.
//! A successful revert removes its entry; a failed one leaves it in place so
//! the user can retry.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tidy_core::{
    ChangeAction, ChangeRecord, DocumentPatch, DocumentRef, DocumentStore, Error, EventBus,
    HistoryStore, OrganizeEvent, Result,
};

/// What reverting a change does to its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertAction {
    /// The change created the destination; revert deletes it.
    DeleteDocument,
    /// The change appended content; revert restores the earlier content.
    RestoreContent,
}

impl From<ChangeAction> for RevertAction {
    fn from(action: ChangeAction) -> Self {
        match action {
            ChangeAction::Created => RevertAction::DeleteDocument,
            ChangeAction::Updated => RevertAction::RestoreContent,
        }
    }
}

/// Description of a revert shown before the user confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertPreview {
    pub change_id: Uuid,
    pub action: RevertAction,
    pub description: String,
    pub warning: Option<String>,
}

/// Outcome of a successful revert, for UI refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertResult {
    pub change_id: Uuid,
    pub action: RevertAction,
    pub document: DocumentRef,
}

/// Records changes and reverts them on request.
pub struct VersionService {
    store: Arc<dyn DocumentStore>,
    history: Arc<dyn HistoryStore>,
    events: EventBus,
    // Serializes load-modify-save cycles on the history.
    lock: Mutex<()>,
}

impl VersionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        history: Arc<dyn HistoryStore>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            history,
            events,
            lock: Mutex::new(()),
        }
    }

    /// Add `change` as the newest entry. Returns the entries evicted to keep
    /// the history within its capacity.
    pub async fn record(&self, change: ChangeRecord) -> Result<Vec<ChangeRecord>> {
        self.record_all(vec![change]).await
    }

    /// Add several changes in order, saving the history once.
    #[instrument(skip(self, changes), fields(subsystem = "organize", component = "versions", op = "record", count = changes.len()))]
    pub async fn record_all(&self, changes: Vec<ChangeRecord>) -> Result<Vec<ChangeRecord>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.lock.lock().await;
        let mut log = self.history.load().await?;
        let mut evicted = Vec::new();
        for change in changes {
            evicted.extend(log.push(change));
        }
        self.history.save(&log).await?;
        for old in &evicted {
            debug!(change_id = %old.id, "Evicted change from history");
        }
        Ok(evicted)
    }

    /// Revertable changes, newest first.
    pub async fn list(&self) -> Result<Vec<ChangeRecord>> {
        Ok(self.history.load().await?.iter().cloned().collect())
    }

    async fn find(&self, change_id: Uuid) -> Result<ChangeRecord> {
        self.history
            .load()
            .await?
            .get(change_id)
            .cloned()
            .ok_or(Error::NotRevertable(change_id))
    }

    /// Describe what reverting `change_id` would do.
    pub async fn preview(&self, change_id: Uuid) -> Result<RevertPreview> {
        let change = self.find(change_id).await?;
        let action = RevertAction::from(change.action);
        let current = self.store.get(change.document_id).await?;

        let description = match action {
            RevertAction::DeleteDocument => {
                format!("Delete \"{}\", created by this change", change.destination_path)
            }
            RevertAction::RestoreContent => format!(
                "Restore the previous content of \"{}\"",
                change.destination_path
            ),
        };

        let warning = match current {
            None => Some("The document no longer exists.".to_string()),
            Some(doc) if doc.deleted => Some("The document has been deleted.".to_string()),
            Some(doc) => {
                let edited = edited_since(&change, &doc.content_text);
                match action {
                    RevertAction::DeleteDocument if edited => Some(
                        "The document will be deleted, including content added after this change."
                            .to_string(),
                    ),
                    RevertAction::DeleteDocument => {
                        Some("The document will be deleted.".to_string())
                    }
                    RevertAction::RestoreContent if edited => Some(
                        "The document was edited after this change; those edits will be lost."
                            .to_string(),
                    ),
                    RevertAction::RestoreContent => None,
                }
            }
        };

        Ok(RevertPreview {
            change_id,
            action,
            description,
            warning,
        })
    }

    /// Undo `change_id`.
    ///
    /// Fails with [`Error::NotRevertable`] when the change is not in the
    /// history and with [`Error::RevertFailure`] when the store write fails;
    /// the entry is kept in both failure cases.
    #[instrument(skip(self), fields(subsystem = "organize", component = "versions", op = "revert"))]
    pub async fn revert(&self, change_id: Uuid) -> Result<RevertResult> {
        let _guard = self.lock.lock().await;
        let mut log = self.history.load().await?;
        let change = log
            .get(change_id)
            .cloned()
            .ok_or(Error::NotRevertable(change_id))?;
        let action = RevertAction::from(change.action);

        let patch = match action {
            RevertAction::DeleteDocument => DocumentPatch::soft_delete(),
            RevertAction::RestoreContent => DocumentPatch::restore(
                change.old_content.clone().unwrap_or_default(),
                change.old_content_text.clone(),
            ),
        };

        let document = match self.store.update(change.document_id, patch).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    change_id = %change_id,
                    document_id = %change.document_id,
                    error = %e,
                    "Revert failed"
                );
                return Err(Error::RevertFailure(e.to_string()));
            }
        };

        log.remove(change_id);
        self.history.save(&log).await?;

        info!(
            change_id = %change_id,
            document_id = %document.id,
            action = ?action,
            "Change reverted"
        );
        self.events.emit(OrganizeEvent::ChangeReverted {
            change_id,
            document_id: document.id,
            action: change.action,
        });

        Ok(RevertResult {
            change_id,
            action,
            document: document.to_ref(change.destination_path),
        })
    }
}

fn edited_since(change: &ChangeRecord, current_text: &str) -> bool {
    change
        .new_content_text
        .as_deref()
        .is_some_and(|after| after != current_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidy_core::{Block, ChangePhase, ChangeTrigger, ContentTree, NewDocument};
    use tidy_db::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: VersionService,
        events: EventBus,
    }

    fn fixture(capacity: usize) -> Fixture {
        let store = Arc::new(MemoryStore::with_history_capacity(capacity));
        let events = EventBus::default();
        let service = VersionService::new(store.clone(), store.clone(), events.clone());
        Fixture {
            store,
            service,
            events,
        }
    }

    async fn write(store: &MemoryStore, id: Uuid, blocks: Vec<Block>) -> String {
        store
            .update(id, DocumentPatch::content(ContentTree::new(blocks)))
            .await
            .unwrap()
            .content_text
    }

    fn record(action: ChangeAction, doc: &tidy_core::Document, after_text: &str) -> ChangeRecord {
        ChangeRecord::snapshot(
            ChangeTrigger::Classification,
            ChangePhase::Before,
            action,
            doc.id,
            "/Errands",
            "test",
            doc.content.as_ref(),
            &doc.content_text,
        )
        .with_new_content_text(after_text)
    }

    #[tokio::test]
    async fn test_revert_update_restores_content_exactly() {
        let f = fixture(10);
        let id = f
            .store
            .create(NewDocument::leaf(
                "Errands",
                None,
                ContentTree::new(vec![Block::paragraph("Pay rent")]),
            ))
            .await
            .unwrap();
        let before_doc = f.store.require(id).await.unwrap();
        let after_text = write(
            &f.store,
            id,
            vec![Block::paragraph("Pay rent"), Block::paragraph("Buy milk")],
        )
        .await;
        let change = record(ChangeAction::Updated, &before_doc, &after_text);
        f.service.record(change.clone()).await.unwrap();

        let mut rx = f.events.subscribe();
        let result = f.service.revert(change.id).await.unwrap();

        assert_eq!(result.action, RevertAction::RestoreContent);
        assert_eq!(result.document.id, id);
        let restored = f.store.require(id).await.unwrap();
        assert_eq!(restored.content, before_doc.content);
        assert_eq!(restored.content_text, before_doc.content_text);
        assert!(f.service.list().await.unwrap().is_empty());
        assert_eq!(rx.recv().await.unwrap().event_type, "change.reverted");
    }

    #[tokio::test]
    async fn test_revert_creation_soft_deletes() {
        let f = fixture(10);
        let id = f
            .store
            .create(NewDocument::leaf("Health", None, ContentTree::default()))
            .await
            .unwrap();
        let doc = f.store.require(id).await.unwrap();
        let after = write(&f.store, id, vec![Block::paragraph("Call dentist")]).await;
        let change = record(ChangeAction::Created, &doc, &after);
        f.service.record(change.clone()).await.unwrap();

        let preview = f.service.preview(change.id).await.unwrap();
        assert_eq!(preview.action, RevertAction::DeleteDocument);
        assert!(preview.warning.unwrap().contains("deleted"));

        f.service.revert(change.id).await.unwrap();
        assert!(f.store.require(id).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_preview_warns_when_edited_since() {
        let f = fixture(10);
        let id = f
            .store
            .create(NewDocument::leaf("Errands", None, ContentTree::default()))
            .await
            .unwrap();
        let doc = f.store.require(id).await.unwrap();
        let after = write(&f.store, id, vec![Block::paragraph("Buy milk")]).await;
        let change = record(ChangeAction::Updated, &doc, &after);
        f.service.record(change.clone()).await.unwrap();

        assert!(f.service.preview(change.id).await.unwrap().warning.is_none());

        write(&f.store, id, vec![Block::paragraph("Buy oat milk")]).await;
        let preview = f.service.preview(change.id).await.unwrap();
        assert_eq!(preview.action, RevertAction::RestoreContent);
        assert!(preview.warning.unwrap().contains("edited"));
    }

    #[tokio::test]
    async fn test_failed_revert_keeps_entry() {
        let f = fixture(10);
        let id = f
            .store
            .create(NewDocument::leaf("Errands", None, ContentTree::default()))
            .await
            .unwrap();
        let doc = f.store.require(id).await.unwrap();
        let change = record(ChangeAction::Updated, &doc, "");
        f.service.record(change.clone()).await.unwrap();

        f.store.fail_updates_for(id).await;
        let err = f.service.revert(change.id).await.unwrap_err();
        assert!(matches!(err, Error::RevertFailure(ref msg) if msg.contains("injected")));
        assert_eq!(f.service.list().await.unwrap().len(), 1);

        f.store.heal_updates_for(id).await;
        assert!(f.service.revert(change.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_evicted_change_is_not_revertable() {
        let f = fixture(2);
        let id = f
            .store
            .create(NewDocument::leaf("Errands", None, ContentTree::default()))
            .await
            .unwrap();
        let doc = f.store.require(id).await.unwrap();
        let first = record(ChangeAction::Updated, &doc, "");
        f.service.record(first.clone()).await.unwrap();
        f.service
            .record(record(ChangeAction::Updated, &doc, ""))
            .await
            .unwrap();
        let evicted = f
            .service
            .record(record(ChangeAction::Updated, &doc, ""))
            .await
            .unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, first.id);
        assert!(matches!(
            f.service.revert(first.id).await,
            Err(Error::NotRevertable(id)) if id == first.id
        ));
        assert!(matches!(
            f.service.preview(first.id).await,
            Err(Error::NotRevertable(_))
        ));
    }
}
