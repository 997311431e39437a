//! Organization pipeline: one pass over a scratch document.
//!
//! A pass identifies blocks, snapshots the destination tree, routes the
//! unorganized blocks, applies the resulting chunks, records history, marks
//! the filed source blocks and publishes events. Every event of a pass
//! carries the pass's run id as correlation id.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tidy_core::{
    new_v7, normalize_path, normalize_text, parse_blocks, Block, ChangeTrigger,
    ClassificationService, DocumentPatch, DocumentStore, Error, EventBus, HistoryStore,
    OrganizeEvent, Result, RoutedChunk,
};

use crate::applier::{ApplyReport, ChunkApplier};
use crate::blocks::{clear_duplicate_ids, ensure_identities, list_unorganized, mark_organized};
use crate::config::OrganizerConfig;
use crate::destination_tree::{load_destination_tree, serialize_tree};
use crate::routing::{RoutingEngine, RoutingRequest, RoutingSource};
use crate::trigger::OrganizeRunner;
use crate::versions::VersionService;

const SUMMARY_CHARS: usize = 120;

/// Result of one organization pass.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub document_id: Uuid,
    /// `None` when there was nothing to route.
    pub routing: Option<RoutingSource>,
    pub chunks: Vec<RoutedChunk>,
    pub apply: ApplyReport,
    /// Ids of source blocks marked organized by this pass.
    pub organized_blocks: Vec<String>,
    pub duration_ms: u64,
}

impl RunReport {
    fn noop(run_id: Uuid, document_id: Uuid, start: Instant) -> Self {
        Self {
            run_id,
            document_id,
            routing: None,
            chunks: Vec::new(),
            apply: ApplyReport::default(),
            organized_blocks: Vec::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// True when the pass found nothing to organize.
    pub fn is_noop(&self) -> bool {
        self.routing.is_none()
    }

    pub fn used_fallback(&self) -> bool {
        self.routing.as_ref().is_some_and(RoutingSource::is_fallback)
    }
}

/// A pending block and its id, numbered from 1 in routing order.
struct PendingBlock {
    id: String,
    block: Block,
}

/// The auto-organization engine.
pub struct Organizer {
    store: Arc<dyn DocumentStore>,
    router: RoutingEngine,
    applier: ChunkApplier,
    versions: Arc<VersionService>,
    events: EventBus,
    config: OrganizerConfig,
}

impl Organizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        history: Arc<dyn HistoryStore>,
        classifier: Arc<dyn ClassificationService>,
        events: EventBus,
        config: OrganizerConfig,
    ) -> Self {
        let router = RoutingEngine::new(classifier, config.routing.clone());
        let applier = ChunkApplier::new(store.clone(), config.routing.default_destination.clone());
        let versions = Arc::new(VersionService::new(store.clone(), history, events.clone()));
        Self {
            store,
            router,
            applier,
            versions,
            events,
            config,
        }
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    pub fn versions(&self) -> &Arc<VersionService> {
        &self.versions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Serialized destination tree as the classifier would see it.
    pub async fn destination_outline(&self) -> Result<String> {
        let tree = load_destination_tree(self.store.as_ref(), None).await?;
        Ok(serialize_tree(&tree))
    }

    /// Organize the unorganized blocks of `document_id`.
    ///
    /// A document with nothing to organize is left untouched. Classifier
    /// failures fall back to the default destination and do not fail the
    /// pass; store failures do.
    #[instrument(skip(self), fields(subsystem = "organize", component = "pipeline", op = "run"))]
    pub async fn run(&self, document_id: Uuid) -> Result<RunReport> {
        let run_id = new_v7();
        let start = Instant::now();

        match self.run_pass_inner(run_id, document_id, start).await {
            Ok(report) => {
                if !report.is_noop() {
                    self.publish(run_id, document_id, &report.apply);
                    self.events.emit_correlated(
                        OrganizeEvent::RunCompleted {
                            document_id,
                            chunk_count: report.chunks.len(),
                            organized_blocks: report.organized_blocks.len(),
                            used_fallback: report.used_fallback(),
                            duration_ms: report.duration_ms,
                        },
                        run_id,
                    );
                }
                Ok(report)
            }
            Err(e) => {
                error!(
                    run_id = %run_id,
                    document_id = %document_id,
                    error = %e,
                    "Organization run failed"
                );
                self.events.emit_correlated(
                    OrganizeEvent::RunFailed {
                        document_id,
                        error: e.to_string(),
                    },
                    run_id,
                );
                Err(e)
            }
        }
    }

    async fn run_pass_inner(
        &self,
        run_id: Uuid,
        document_id: Uuid,
        start: Instant,
    ) -> Result<RunReport> {
        let source = self.store.require(document_id).await?;
        if source.deleted || !source.is_leaf() {
            debug!(document_id = %document_id, "Document cannot hold blocks, nothing to organize");
            return Ok(RunReport::noop(run_id, document_id, start));
        }

        let mut tree = source.content.clone().unwrap_or_default();
        let cleared = clear_duplicate_ids(&mut tree);
        let assigned = ensure_identities(document_id, &mut tree);
        let pending: Vec<PendingBlock> = list_unorganized(&tree)
            .into_iter()
            .filter_map(|b| {
                Some(PendingBlock {
                    id: b.block_id()?.to_string(),
                    block: b.clone(),
                })
            })
            .collect();

        if pending.is_empty() {
            debug!(document_id = %document_id, "No unorganized blocks");
            return Ok(RunReport::noop(run_id, document_id, start));
        }
        if cleared + assigned > 0 {
            self.store
                .update(document_id, DocumentPatch::content(tree))
                .await?;
        }

        let destinations = load_destination_tree(self.store.as_ref(), Some(document_id)).await?;
        let blocks: Vec<Block> = pending.iter().map(|p| p.block.clone()).collect();
        let outcome = self
            .router
            .route(RoutingRequest {
                source_title: &source.title,
                blocks: &blocks,
                destination_tree: &destinations,
                full_source_text: &source.content_text,
                organization_rules: source.organization_rules(),
            })
            .await;

        let reason = format!("Organized from \"{}\"", source.title);
        let apply = self
            .applier
            .apply_chunks(&outcome.chunks, ChangeTrigger::Classification, &reason)
            .await;

        if apply.applied.is_empty() {
            let detail = apply
                .skipped
                .first()
                .map(|s| s.error.clone())
                .unwrap_or_else(|| "no chunks".to_string());
            return Err(Error::Internal(format!(
                "none of {} chunks could be applied: {}",
                outcome.chunks.len(),
                detail
            )));
        }

        if let Err(e) = self.versions.record_all(apply.history_entries()).await {
            warn!(
                document_id = %document_id,
                error = %e,
                "Failed to record change history"
            );
        }

        let marks = attribute_blocks(&pending, &apply);
        let organized_blocks = self.mark_source(document_id, &marks).await?;
        let unfiled = pending.len().saturating_sub(organized_blocks.len());
        if unfiled > 0 {
            warn!(
                document_id = %document_id,
                unfiled,
                "Some blocks were not attributed to any filed chunk"
            );
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            document_id = %document_id,
            block_count = pending.len(),
            chunk_count = outcome.chunks.len(),
            organized_blocks = organized_blocks.len(),
            used_fallback = outcome.source.is_fallback(),
            changed_paths = ?apply.changed_paths,
            duration_ms,
            "Organization run completed"
        );

        Ok(RunReport {
            run_id,
            document_id,
            routing: Some(outcome.source),
            chunks: outcome.chunks,
            apply,
            organized_blocks,
            duration_ms,
        })
    }

    /// Re-read the source and mark attributed blocks, so edits made while
    /// the classifier was running are kept.
    async fn mark_source(&self, document_id: Uuid, marks: &[Mark]) -> Result<Vec<String>> {
        if marks.is_empty() {
            return Ok(Vec::new());
        }
        let source = self.store.require(document_id).await?;
        let mut tree = source.content.unwrap_or_default();

        let mut organized: Vec<String> = Vec::new();
        for mark in marks {
            if mark_organized(&mut tree, &mark.block_id, &mark.path, mark.summary.clone())
                && !organized.contains(&mark.block_id)
            {
                organized.push(mark.block_id.clone());
            }
        }
        if !organized.is_empty() {
            self.store
                .update(document_id, DocumentPatch::content(tree))
                .await?;
        }
        Ok(organized)
    }

    /// File `chunks` directly, bypassing the classifier.
    ///
    /// Chunks without a path or content are rejected up front; the rest are
    /// applied like classifier output and recorded with the `manual` trigger.
    #[instrument(skip(self, chunks, reason), fields(subsystem = "organize", component = "pipeline", op = "apply_manual", chunk_count = chunks.len()))]
    pub async fn apply_manual(
        &self,
        document_id: Uuid,
        chunks: Vec<RoutedChunk>,
        reason: &str,
    ) -> Result<ApplyReport> {
        let chunks: Vec<RoutedChunk> = chunks
            .into_iter()
            .filter_map(|c| {
                let target_path = normalize_path(&c.target_path);
                let content = c.content.trim().to_string();
                (!target_path.is_empty() && !content.is_empty()).then_some(RoutedChunk {
                    target_path,
                    content,
                    ..c
                })
            })
            .collect();
        if chunks.is_empty() {
            return Err(Error::InvalidInput(
                "no chunk has both a target path and content".to_string(),
            ));
        }

        let run_id = new_v7();
        let apply = self
            .applier
            .apply_chunks(&chunks, ChangeTrigger::Manual, reason)
            .await;
        self.versions.record_all(apply.history_entries()).await?;
        self.publish(run_id, document_id, &apply);
        Ok(apply)
    }

    fn publish(&self, run_id: Uuid, document_id: Uuid, apply: &ApplyReport) {
        if !apply.changed_paths.is_empty() {
            self.events.emit_correlated(
                OrganizeEvent::PathsChanged {
                    document_id,
                    changed_paths: apply.changed_paths.clone(),
                },
                run_id,
            );
        }
        if !apply.created.is_empty() || !apply.updated.is_empty() {
            self.events.emit_correlated(
                OrganizeEvent::DocumentsChanged {
                    created: apply.created.clone(),
                    updated: apply.updated.clone(),
                },
                run_id,
            );
        }
    }
}

#[async_trait]
impl OrganizeRunner for Organizer {
    async fn run_pass(&self, document_id: Uuid) -> Result<()> {
        self.run(document_id).await.map(|_| ())
    }
}

struct Mark {
    block_id: String,
    path: String,
    summary: Option<String>,
}

/// Match pending blocks to the chunks that reached a destination.
///
/// A chunk listing block indices claims exactly those blocks. A chunk without
/// indices claims a block only when one of its lines, paragraphs or parsed
/// blocks equals the whole block text after normalization.
fn attribute_blocks(pending: &[PendingBlock], apply: &ApplyReport) -> Vec<Mark> {
    let mut marks = Vec::new();
    for applied in &apply.applied {
        let listed = &applied.chunk.source_blocks;
        let units = if listed.is_empty() {
            chunk_units(&applied.chunk)
        } else {
            HashSet::new()
        };
        for (i, pending_block) in pending.iter().enumerate() {
            let claimed = if listed.is_empty() {
                let block_text = normalize_text(pending_block.block.text());
                !block_text.is_empty() && units.contains(&block_text)
            } else {
                listed.contains(&(i + 1))
            };
            if claimed {
                marks.push(Mark {
                    block_id: pending_block.id.clone(),
                    path: applied.target_path.clone(),
                    summary: Some(summarize(&applied.chunk.content)),
                });
            }
        }
    }
    marks
}

/// Normalized whole units of a chunk: the full text, each line, each
/// blank-line separated paragraph and each block the content parses into.
fn chunk_units(chunk: &RoutedChunk) -> HashSet<String> {
    let content = &chunk.content;
    let parsed = if chunk.blocks.is_empty() {
        parse_blocks(content)
    } else {
        chunk.blocks.clone()
    };
    std::iter::once(content.as_str())
        .chain(content.lines())
        .chain(content.split("\n\n"))
        .map(normalize_text)
        .chain(parsed.iter().map(|b| normalize_text(b.text())))
        .filter(|unit| !unit.is_empty())
        .collect()
}

fn summarize(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(SUMMARY_CHARS) {
        Some((byte, _)) => format!("{}…", &line[..byte]),
        None => line.to_string(),
    }
}
