//! Chunk applier: writes routed content into destination documents.
//!
//! Paths resolve segment by segment from the hierarchy root, creating missing
//! folders and the final page. Content is appended as new blocks and never
//! overwrites existing ones. A chunk whose text already ends the destination
//! is not appended again, so a retried run does not file content twice.
//! Chunks are independent: one that fails is reported as skipped and the
//! rest still apply.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tidy_core::{
    normalize_path, normalize_text, parse_blocks, path_segments, titles_match, Block,
    ChangeAction, ChangePhase, ChangeRecord, ChangeTrigger, ContentTree, Document, DocumentKind,
    DocumentPatch, DocumentRef, DocumentStore, Error, NewDocument, Result, RoutedChunk,
};

/// What happened to one applied chunk.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Content was written; snapshots taken around the write.
    Written {
        action: ChangeAction,
        before: ChangeRecord,
        after: ChangeRecord,
    },
    /// The destination already ends with this content; nothing was written.
    AlreadyPresent,
}

impl ApplyOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ApplyOutcome::Written { .. })
    }
}

/// A chunk that reached its destination.
#[derive(Debug, Clone)]
pub struct AppliedChunk {
    pub chunk_index: usize,
    pub chunk: RoutedChunk,
    /// Path actually written, with stored titles (may differ from the
    /// requested path after a redirect to the default destination).
    pub target_path: String,
    pub document: DocumentRef,
    pub outcome: ApplyOutcome,
}

/// A chunk that could not be applied.
#[derive(Debug, Clone)]
pub struct SkippedChunk {
    pub chunk_index: usize,
    pub target_path: String,
    pub error: String,
}

/// Result of applying a batch of chunks.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Folders and pages created, in creation order.
    pub created: Vec<DocumentRef>,
    /// Existing pages that received content.
    pub updated: Vec<DocumentRef>,
    pub applied: Vec<AppliedChunk>,
    pub skipped: Vec<SkippedChunk>,
    /// Destination paths that received content, deduplicated.
    pub changed_paths: Vec<String>,
}

impl ApplyReport {
    /// One history entry per write: the `before` snapshot, carrying the
    /// projection the write produced.
    pub fn history_entries(&self) -> Vec<ChangeRecord> {
        self.applied
            .iter()
            .filter_map(|a| match &a.outcome {
                ApplyOutcome::Written { before, .. } => Some(before.clone()),
                ApplyOutcome::AlreadyPresent => None,
            })
            .collect()
    }

    pub fn written_count(&self) -> usize {
        self.applied
            .iter()
            .filter(|a| a.outcome.is_written())
            .count()
    }

    fn note_changed_path(&mut self, path: &str) {
        if !self.changed_paths.iter().any(|p| p == path) {
            self.changed_paths.push(path.to_string());
        }
    }
}

struct ResolvedLeaf {
    document: Document,
    path: String,
    created: bool,
}

enum Resolution {
    Leaf(ResolvedLeaf),
    /// The final segment names an existing folder.
    Container(String),
}

/// Applies routed chunks to the document store.
pub struct ChunkApplier {
    store: Arc<dyn DocumentStore>,
    default_destination: String,
}

impl ChunkApplier {
    pub fn new(store: Arc<dyn DocumentStore>, default_destination: impl Into<String>) -> Self {
        Self {
            store,
            default_destination: normalize_path(&default_destination.into()),
        }
    }

    /// Apply `chunks` in order. Every change record carries `trigger` and
    /// `reason`.
    #[instrument(skip(self, chunks, reason), fields(subsystem = "organize", component = "applier", op = "apply_chunks", chunk_count = chunks.len()))]
    pub async fn apply_chunks(
        &self,
        chunks: &[RoutedChunk],
        trigger: ChangeTrigger,
        reason: &str,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut created_ids: HashSet<Uuid> = HashSet::new();

        for (index, chunk) in chunks.iter().enumerate() {
            match self
                .apply_one(index, chunk, trigger, reason, &mut report)
                .await
            {
                Ok((applied, created)) => {
                    if created {
                        created_ids.insert(applied.document.id);
                        report.created.push(applied.document.clone());
                    } else if !created_ids.contains(&applied.document.id)
                        && !report.updated.iter().any(|d| d.id == applied.document.id)
                        && applied.outcome.is_written()
                    {
                        report.updated.push(applied.document.clone());
                    }
                    if applied.outcome.is_written() {
                        report.note_changed_path(&applied.target_path);
                    }
                    report.applied.push(applied);
                }
                Err(e) => {
                    warn!(
                        chunk_index = index,
                        target_path = %chunk.target_path,
                        error = %e,
                        "Skipping chunk"
                    );
                    report.skipped.push(SkippedChunk {
                        chunk_index: index,
                        target_path: chunk.target_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            created = report.created.len(),
            updated = report.updated.len(),
            changed_paths = ?report.changed_paths,
            "Chunks applied"
        );
        report
    }

    async fn apply_one(
        &self,
        index: usize,
        chunk: &RoutedChunk,
        trigger: ChangeTrigger,
        reason: &str,
        report: &mut ApplyReport,
    ) -> Result<(AppliedChunk, bool)> {
        let requested = normalize_path(&chunk.target_path);
        let target = match self.resolve(&requested, report).await? {
            Resolution::Leaf(leaf) => leaf,
            Resolution::Container(folder) => {
                warn!(
                    target_path = %folder,
                    default_destination = %self.default_destination,
                    "Chunk targets a folder, redirecting to default destination"
                );
                match self.resolve(&self.default_destination, report).await? {
                    Resolution::Leaf(leaf) => leaf,
                    Resolution::Container(path) => {
                        return Err(Error::DestinationResolution {
                            path,
                            reason: "default destination is a folder".to_string(),
                        })
                    }
                }
            }
        };

        let new_blocks = if chunk.blocks.is_empty() {
            parse_blocks(&chunk.content)
        } else {
            chunk.blocks.clone()
        };
        if new_blocks.is_empty() {
            return Err(Error::InvalidInput(format!(
                "chunk {} for {} has no content",
                index, requested
            )));
        }

        let ResolvedLeaf {
            document,
            path,
            created,
        } = target;
        let doc_ref = document.to_ref(path.clone());
        let current = document.content.clone().unwrap_or_default();

        if !created && ends_with_blocks(&current, &new_blocks) {
            debug!(
                target_path = %path,
                document_id = %document.id,
                "Content already present, not appending"
            );
            return Ok((
                AppliedChunk {
                    chunk_index: index,
                    chunk: chunk.clone(),
                    target_path: path,
                    document: doc_ref,
                    outcome: ApplyOutcome::AlreadyPresent,
                },
                false,
            ));
        }

        let action = if created {
            ChangeAction::Created
        } else {
            ChangeAction::Updated
        };
        let before = ChangeRecord::snapshot(
            trigger,
            ChangePhase::Before,
            action,
            document.id,
            path.as_str(),
            reason,
            (!created).then_some(&current),
            if created { "" } else { &document.content_text },
        );

        let mut merged = current;
        merged.blocks.extend(new_blocks);
        let updated = self
            .store
            .update(document.id, DocumentPatch::content(merged))
            .await?;

        let after = ChangeRecord::snapshot(
            trigger,
            ChangePhase::After,
            action,
            updated.id,
            path.as_str(),
            reason,
            updated.content.as_ref(),
            &updated.content_text,
        );
        let before = before.with_new_content_text(updated.content_text.clone());

        debug!(
            target_path = %path,
            document_id = %updated.id,
            action = ?action,
            "Chunk written"
        );
        Ok((
            AppliedChunk {
                chunk_index: index,
                chunk: chunk.clone(),
                target_path: path,
                document: doc_ref,
                outcome: ApplyOutcome::Written {
                    action,
                    before,
                    after,
                },
            },
            created,
        ))
    }

    /// Walk `path` from the root, creating missing folders and the final page.
    async fn resolve(&self, path: &str, report: &mut ApplyReport) -> Result<Resolution> {
        let segments = path_segments(path);
        let Some((last, folders)) = segments.split_last() else {
            return Err(Error::DestinationResolution {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        };

        let mut parent: Option<Uuid> = None;
        let mut canonical = String::new();
        for segment in folders {
            match self.find_child(parent, segment).await? {
                Some(doc) if doc.kind == DocumentKind::Container => {
                    canonical = format!("{}/{}", canonical, doc.title);
                    parent = Some(doc.id);
                }
                Some(doc) => {
                    return Err(Error::DestinationResolution {
                        path: path.to_string(),
                        reason: format!("'{}' is a page, not a folder", doc.title),
                    });
                }
                None => {
                    canonical = format!("{}/{}", canonical, segment);
                    let id = self
                        .create(path, NewDocument::container(*segment, parent))
                        .await?;
                    info!(document_id = %id, path = %canonical, "Created folder");
                    report.created.push(DocumentRef {
                        id,
                        title: segment.to_string(),
                        path: canonical.clone(),
                    });
                    parent = Some(id);
                }
            }
        }

        match self.find_child(parent, last).await? {
            Some(doc) if doc.kind == DocumentKind::Container => Ok(Resolution::Container(
                format!("{}/{}", canonical, doc.title),
            )),
            Some(doc) => Ok(Resolution::Leaf(ResolvedLeaf {
                path: format!("{}/{}", canonical, doc.title),
                document: doc,
                created: false,
            })),
            None => {
                let id = self
                    .create(
                        path,
                        NewDocument::leaf(*last, parent, ContentTree::default()),
                    )
                    .await?;
                let document = self.store.require(id).await?;
                let path = format!("{}/{}", canonical, last);
                info!(document_id = %id, path = %path, "Created page");
                Ok(Resolution::Leaf(ResolvedLeaf {
                    document,
                    path,
                    created: true,
                }))
            }
        }
    }

    async fn create(&self, path: &str, fields: NewDocument) -> Result<Uuid> {
        self.store
            .create(fields)
            .await
            .map_err(|e| Error::DestinationResolution {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Live destination child of `parent` titled `title`, exact match first.
    async fn find_child(&self, parent: Option<Uuid>, title: &str) -> Result<Option<Document>> {
        let children: Vec<Document> = self
            .store
            .list_by_parent(parent)
            .await?
            .into_iter()
            .filter(|d| d.organized && !d.deleted)
            .collect();
        if let Some(pos) = children.iter().position(|d| d.title == title) {
            return Ok(children.into_iter().nth(pos));
        }
        Ok(children.into_iter().find(|d| titles_match(&d.title, title)))
    }
}

/// Whether `tree` already ends with blocks carrying the same normalized text.
fn ends_with_blocks(tree: &ContentTree, incoming: &[Block]) -> bool {
    let incoming_text = incoming
        .iter()
        .map(Block::text)
        .collect::<Vec<_>>()
        .join("\n");
    let incoming_text = normalize_text(&incoming_text);
    !incoming_text.is_empty() && normalize_text(&tree.tail_text(incoming.len())) == incoming_text
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidy_db::MemoryStore;

    async fn store_with_tree() -> (Arc<MemoryStore>, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let errands = store
            .create(NewDocument::leaf(
                "Errands",
                None,
                ContentTree::new(vec![Block::paragraph("Pay rent")]),
            ))
            .await
            .unwrap();
        let work = store
            .create(NewDocument::container("Work", None))
            .await
            .unwrap();
        store
            .create(NewDocument::leaf("Planning", Some(work), ContentTree::default()))
            .await
            .unwrap();
        (store, errands, work)
    }

    fn applier(store: Arc<MemoryStore>) -> ChunkApplier {
        ChunkApplier::new(store, "/Inbox")
    }

    #[tokio::test]
    async fn test_append_preserves_existing_blocks() {
        let (store, errands, _) = store_with_tree().await;
        let report = applier(store.clone())
            .apply_chunks(
                &[RoutedChunk::new("/Errands", "Buy milk\nCall dentist")],
                ChangeTrigger::Classification,
                "test",
            )
            .await;

        assert_eq!(report.updated.len(), 1);
        assert!(report.created.is_empty());
        assert_eq!(report.changed_paths, vec!["/Errands"]);

        let doc = store.require(errands).await.unwrap();
        let texts: Vec<&str> = doc.content.as_ref().unwrap().blocks.iter().map(Block::text).collect();
        assert_eq!(texts, vec!["Pay rent", "Buy milk\nCall dentist"]);
    }

    #[tokio::test]
    async fn test_snapshots_capture_before_and_after() {
        let (store, errands, _) = store_with_tree().await;
        let report = applier(store.clone())
            .apply_chunks(
                &[RoutedChunk::new("/Errands", "Buy milk")],
                ChangeTrigger::Classification,
                "test",
            )
            .await;

        let ApplyOutcome::Written { action, before, after } = &report.applied[0].outcome else {
            panic!("expected a write");
        };
        assert_eq!(*action, ChangeAction::Updated);
        assert_eq!(before.phase, ChangePhase::Before);
        assert_eq!(before.old_content_text, "Pay rent");
        assert_eq!(after.phase, ChangePhase::After);
        assert_eq!(after.old_content_text, "Pay rent\n\nBuy milk");
        assert_eq!(before.new_content_text.as_deref(), Some("Pay rent\n\nBuy milk"));
        assert_eq!(before.document_id, errands);
        assert_eq!(report.history_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_path_creates_folders_and_page() {
        let (store, _, work) = store_with_tree().await;
        let report = applier(store.clone())
            .apply_chunks(
                &[RoutedChunk::new("/Work/Projects/Launch", "Ship it")],
                ChangeTrigger::Classification,
                "test",
            )
            .await;

        let paths: Vec<&str> = report.created.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/Work/Projects", "/Work/Projects/Launch"]);

        let projects = store.list_by_parent(Some(work)).await.unwrap();
        let folder = projects.iter().find(|d| d.title == "Projects").unwrap();
        assert_eq!(folder.kind, DocumentKind::Container);
        let pages = store.list_by_parent(Some(folder.id)).await.unwrap();
        assert_eq!(pages[0].content_text, "Ship it");

        let ApplyOutcome::Written { action, before, .. } = &report.applied[0].outcome else {
            panic!("expected a write");
        };
        assert_eq!(*action, ChangeAction::Created);
        assert!(before.old_content.is_none());
    }

    #[tokio::test]
    async fn test_case_insensitive_match_reuses_page() {
        let (store, errands, _) = store_with_tree().await;
        let report = applier(store.clone())
            .apply_chunks(
                &[RoutedChunk::new("errands", "Buy milk")],
                ChangeTrigger::Classification,
                "test",
            )
            .await;
        assert_eq!(report.updated[0].id, errands);
        assert_eq!(report.changed_paths, vec!["/Errands"]);
    }

    #[tokio::test]
    async fn test_non_ascii_title_match_reuses_page() {
        let store = Arc::new(MemoryStore::new());
        let page = store
            .create(NewDocument::leaf("Über", None, ContentTree::default()))
            .await
            .unwrap();
        let report = applier(store.clone())
            .apply_chunks(
                &[RoutedChunk::new("/über", "Notes")],
                ChangeTrigger::Classification,
                "test",
            )
            .await;
        assert!(report.created.is_empty());
        assert_eq!(report.updated[0].id, page);
        assert_eq!(report.changed_paths, vec!["/Über"]);
    }

    #[tokio::test]
    async fn test_carried_blocks_are_appended_unchanged() {
        let (store, errands, _) = store_with_tree().await;
        let code = "fn main() {\n    println!(\"hi\");\n\n    done();\n}";
        let blocks = vec![
            Block::code(Some("rust".into()), code),
            Block::paragraph("# not a heading"),
        ];
        let chunk = RoutedChunk {
            blocks: blocks.clone(),
            ..RoutedChunk::new("/Errands", "ignored when blocks are carried")
        };
        applier(store.clone())
            .apply_chunks(&[chunk], ChangeTrigger::Classification, "test")
            .await;

        let doc = store.require(errands).await.unwrap();
        assert_eq!(&doc.content.unwrap().blocks[1..], blocks.as_slice());
        assert!(doc.content_text.contains(code));
    }

    #[tokio::test]
    async fn test_folder_target_redirects_to_inbox() {
        let (store, _, _) = store_with_tree().await;
        let report = applier(store.clone())
            .apply_chunks(
                &[RoutedChunk::new("/Work", "Draft Q3 plan")],
                ChangeTrigger::Classification,
                "test",
            )
            .await;

        assert_eq!(report.applied[0].target_path, "/Inbox");
        assert_eq!(report.created[0].path, "/Inbox");
        let inbox = store.require(report.created[0].id).await.unwrap();
        assert_eq!(inbox.kind, DocumentKind::Leaf);
        assert_eq!(inbox.content_text, "Draft Q3 plan");
    }

    #[tokio::test]
    async fn test_repeated_chunk_is_not_appended_twice() {
        let (store, errands, _) = store_with_tree().await;
        let applier = applier(store.clone());
        let chunk = [RoutedChunk::new("/Errands", "Buy   milk")];

        applier
            .apply_chunks(&chunk, ChangeTrigger::Classification, "first")
            .await;
        let second = applier
            .apply_chunks(
                &[RoutedChunk::new("/Errands", "buy milk")],
                ChangeTrigger::Classification,
                "retry",
            )
            .await;

        assert!(matches!(second.applied[0].outcome, ApplyOutcome::AlreadyPresent));
        assert!(second.updated.is_empty());
        assert!(second.history_entries().is_empty());
        let doc = store.require(errands).await.unwrap();
        assert_eq!(doc.content.unwrap().blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_chunk_does_not_block_others() {
        let (store, errands, _) = store_with_tree().await;
        store.fail_creates_titled("Broken").await;
        let report = applier(store.clone())
            .apply_chunks(
                &[
                    RoutedChunk::new("/Broken/Page", "lost"),
                    RoutedChunk::new("/Errands/Sub", "leaf in the way"),
                    RoutedChunk::new("/Errands", "Buy milk"),
                ],
                ChangeTrigger::Classification,
                "test",
            )
            .await;

        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.updated[0].id, errands);
        assert!(report.skipped[1].error.contains("not a folder"));
    }

    #[tokio::test]
    async fn test_two_chunks_to_new_page_report_one_creation() {
        let (store, _, _) = store_with_tree().await;
        let report = applier(store.clone())
            .apply_chunks(
                &[
                    RoutedChunk::new("/Health", "Call dentist"),
                    RoutedChunk::new("/Health", "Book checkup"),
                ],
                ChangeTrigger::Manual,
                "test",
            )
            .await;

        assert_eq!(report.created.len(), 1);
        assert!(report.updated.is_empty());
        assert_eq!(report.written_count(), 2);
        let health = store.require(report.created[0].id).await.unwrap();
        assert_eq!(health.content_text, "Call dentist\n\nBook checkup");
    }
}
