//! End-to-end organization passes against the in-memory store.
//!
//! Covers a full pass over a scratch document, idempotent re-runs, block
//! identity stability, the tail-duplicate guard, folder creation, the Inbox
//! fallback, revert and manual filing, and event correlation.

use std::sync::Arc;

use tidy_core::{
    Block, ChangeAction, ChangeTrigger, ContentTree, Document, DocumentPatch, DocumentStore,
    Error, EventBus, NewDocument, RoutedChunk,
};
use tidy_db::MemoryStore;
use tidy_inference::MockClassifier;
use tidy_organize::{Organizer, OrganizerConfig, RevertAction, RoutingSource};
use uuid::Uuid;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    classifier: MockClassifier,
    organizer: Organizer,
    events: EventBus,
}

fn harness(classifier: MockClassifier) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let events = EventBus::default();
    let organizer = Organizer::new(
        store.clone(),
        store.clone(),
        Arc::new(classifier.clone()),
        events.clone(),
        OrganizerConfig::default(),
    );
    Harness {
        store,
        classifier,
        organizer,
        events,
    }
}

fn primary() -> String {
    OrganizerConfig::default().routing.primary_model
}

fn paragraphs(texts: &[&str]) -> ContentTree {
    ContentTree::new(texts.iter().map(|t| Block::paragraph(*t)).collect())
}

async fn scratch(store: &MemoryStore, texts: &[&str]) -> Uuid {
    store
        .create(NewDocument::scratch("Scratch", paragraphs(texts)))
        .await
        .unwrap()
}

async fn by_title(store: &MemoryStore, title: &str) -> Document {
    store
        .documents()
        .await
        .into_iter()
        .find(|d| d.title == title)
        .unwrap_or_else(|| panic!("no document titled {title}"))
}

fn block_ids(doc: &Document) -> Vec<String> {
    doc.content
        .as_ref()
        .unwrap()
        .blocks
        .iter()
        .map(|b| b.block_id().unwrap().to_string())
        .collect()
}

const ERRANDS_AND_PLANNING: &str = r#"[
  {"targetPath": "/Errands", "content": "Buy milk\n\nCall dentist", "blocks": [1, 2]},
  {"targetPath": "/Work/Planning", "content": "Draft Q3 plan", "blocks": [3]}
]"#;

/// Errands at the root and Planning under Work, both empty.
async fn seed_destinations(store: &MemoryStore) {
    store
        .create(NewDocument::leaf("Errands", None, ContentTree::default()))
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
}

// ============================================================================
// FULL PASS
// ============================================================================

#[tokio::test]
async fn test_pass_files_blocks_into_existing_destinations() {
    let h = harness(MockClassifier::new().with_response(primary(), ERRANDS_AND_PLANNING));
    seed_destinations(&h.store).await;
    let source = scratch(&h.store, &["Buy milk", "Call dentist", "Draft Q3 plan"]).await;

    let report = h.organizer.run(source).await.unwrap();

    assert!(matches!(
        report.routing,
        Some(RoutingSource::Classifier { attempts: 1, .. })
    ));
    assert_eq!(report.apply.written_count(), 2);
    assert_eq!(report.organized_blocks.len(), 3);
    assert_eq!(report.apply.changed_paths, vec!["/Errands", "/Work/Planning"]);

    let errands = by_title(&h.store, "Errands").await;
    assert!(errands.content_text.contains("Buy milk"));
    assert!(errands.content_text.contains("Call dentist"));
    let planning = by_title(&h.store, "Planning").await;
    assert!(planning.content_text.contains("Draft Q3 plan"));

    let source_doc = h.store.require(source).await.unwrap();
    let blocks = &source_doc.content.as_ref().unwrap().blocks;
    assert!(blocks.iter().all(|b| b.is_organized()));
    assert_eq!(
        blocks[0].meta().unwrap().where_organized[0].destination_path,
        "/Errands"
    );

    let history = h.organizer.versions().list().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|c| c.action == ChangeAction::Updated && c.trigger == ChangeTrigger::Classification));
}

#[tokio::test]
async fn test_second_pass_is_a_noop() {
    let h = harness(MockClassifier::new().with_response(primary(), ERRANDS_AND_PLANNING));
    seed_destinations(&h.store).await;
    let source = scratch(&h.store, &["Buy milk", "Call dentist", "Draft Q3 plan"]).await;
    h.organizer.run(source).await.unwrap();

    let writes = h.store.write_count();
    let calls = h.classifier.call_count();
    let report = h.organizer.run(source).await.unwrap();

    assert!(report.is_noop());
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.classifier.call_count(), calls);
    assert_eq!(h.organizer.versions().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_block_ids_survive_later_passes() {
    let h = harness(MockClassifier::new().with_default_response(
        r#"[{"targetPath": "/Errands", "content": "Buy milk"}]"#,
    ));
    let source = scratch(&h.store, &["Buy milk"]).await;
    h.organizer.run(source).await.unwrap();
    let first_ids = block_ids(&h.store.require(source).await.unwrap());

    // The user types another line; the next pass only touches the new block.
    let mut doc = h.store.require(source).await.unwrap();
    let mut tree = doc.content.take().unwrap();
    tree.blocks.push(Block::paragraph("Buy bread"));
    h.store
        .update(source, DocumentPatch::content(tree))
        .await
        .unwrap();
    h.organizer.run(source).await.unwrap();

    let ids = block_ids(&h.store.require(source).await.unwrap());
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], first_ids[0]);
    assert_ne!(ids[1], ids[0]);

    let prompts = h.classifier.calls();
    assert!(prompts.last().unwrap().prompt.contains("Buy bread"));
    assert!(!prompts.last().unwrap().prompt.contains("[1] Buy milk"));
}

#[tokio::test]
async fn test_content_already_at_destination_is_not_duplicated() {
    let h = harness(MockClassifier::new().with_response(
        primary(),
        r#"[{"targetPath": "/Errands", "content": "Buy milk"}]"#,
    ));
    h.store
        .create(NewDocument::leaf("Errands", None, paragraphs(&["Buy milk"])))
        .await
        .unwrap();
    let source = scratch(&h.store, &["Buy milk"]).await;

    let report = h.organizer.run(source).await.unwrap();

    assert_eq!(report.apply.written_count(), 0);
    assert_eq!(report.organized_blocks.len(), 1);
    let errands = by_title(&h.store, "Errands").await;
    assert_eq!(errands.content_text.matches("Buy milk").count(), 1);
    assert!(h.organizer.versions().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_folders_are_created() {
    let h = harness(MockClassifier::new().with_response(
        primary(),
        r#"[{"targetPath": "/Health/Dentist", "content": "Call dentist"}]"#,
    ));
    let source = scratch(&h.store, &["Call dentist"]).await;

    let report = h.organizer.run(source).await.unwrap();

    let created: Vec<&str> = report.apply.created.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(created, vec!["/Health", "/Health/Dentist"]);
    let health = by_title(&h.store, "Health").await;
    let dentist = by_title(&h.store, "Dentist").await;
    assert!(health.is_container());
    assert_eq!(dentist.parent_id, Some(health.id));
    assert!(dentist.content_text.contains("Call dentist"));

    let history = h.organizer.versions().list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ChangeAction::Created);
    assert_eq!(history[0].document_id, dentist.id);
}

#[tokio::test]
async fn test_unreachable_classifier_files_everything_in_inbox() {
    let h = harness(MockClassifier::new().unreachable());
    let texts = ["Buy milk", "Call dentist", "Draft Q3 plan"];
    let source = scratch(&h.store, &texts).await;

    let report = h.organizer.run(source).await.unwrap();

    assert!(report.used_fallback());
    assert_eq!(h.classifier.models_called().len(), 2);
    let inbox = by_title(&h.store, "Inbox").await;
    for text in texts {
        assert!(inbox.content_text.contains(text), "inbox is missing {text}");
    }
    assert_eq!(report.organized_blocks.len(), 3);
}

#[tokio::test]
async fn test_inbox_fallback_keeps_blocks_verbatim() {
    let h = harness(MockClassifier::new().unreachable());
    let code = "fn main() {\n    println!(\"hi\");\n\n    done();\n}";
    let source_blocks = vec![
        Block::code(Some("rust".into()), code),
        Block::paragraph("# not a heading just text"),
        Block::list_item(false, "- literal dash"),
    ];
    let source = h
        .store
        .create(NewDocument::scratch(
            "Scratch",
            ContentTree::new(source_blocks.clone()),
        ))
        .await
        .unwrap();

    let report = h.organizer.run(source).await.unwrap();

    assert!(report.used_fallback());
    let inbox = by_title(&h.store, "Inbox").await;
    assert_eq!(inbox.content.as_ref().unwrap().blocks, source_blocks);
    assert!(inbox.content_text.contains(code));
    assert!(inbox.content_text.contains("# not a heading just text"));
    assert_eq!(report.organized_blocks.len(), 3);
}

#[tokio::test]
async fn test_blocks_left_out_by_classifier_stay_unorganized() {
    let h = harness(MockClassifier::new().with_response(
        primary(),
        r#"[{"targetPath": "/Travel", "content": "Book a flight", "blocks": [1]}]"#,
    ));
    let source = scratch(&h.store, &["Book a flight", "ok"]).await;

    let report = h.organizer.run(source).await.unwrap();

    assert_eq!(report.organized_blocks.len(), 1);
    let doc = h.store.require(source).await.unwrap();
    let blocks = &doc.content.as_ref().unwrap().blocks;
    assert!(blocks[0].is_organized());
    assert!(!blocks[1].is_organized());
    assert!(blocks[1].meta().unwrap().where_organized.is_empty());
    assert_eq!(by_title(&h.store, "Travel").await.content_text, "Book a flight");

    // The next pass offers only the block that was left behind.
    h.organizer.run(source).await.unwrap();
    let calls = h.classifier.calls();
    let prompt = &calls.last().unwrap().prompt;
    assert!(prompt.contains("[1] ok"));
    assert!(!prompt.contains("[2]"));
}

#[tokio::test]
async fn test_unlisted_chunk_does_not_claim_blocks_by_substring() {
    let h = harness(MockClassifier::new().with_response(
        primary(),
        r#"[{"targetPath": "/Travel", "content": "Book a flight, ok then"}]"#,
    ));
    let source = scratch(&h.store, &["Book a flight", "ok"]).await;

    let report = h.organizer.run(source).await.unwrap();

    assert!(report.organized_blocks.is_empty());
    let doc = h.store.require(source).await.unwrap();
    assert!(doc
        .content
        .unwrap()
        .blocks
        .iter()
        .all(|b| !b.is_organized()));
}

#[tokio::test]
async fn test_deleted_source_is_left_alone() {
    let h = harness(MockClassifier::new());
    let source = scratch(&h.store, &["Buy milk"]).await;
    h.store
        .update(source, DocumentPatch::soft_delete())
        .await
        .unwrap();

    let report = h.organizer.run(source).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(h.classifier.call_count(), 0);
}

// ============================================================================
// REVERT AND MANUAL FILING
// ============================================================================

#[tokio::test]
async fn test_revert_restores_destination() {
    let h = harness(MockClassifier::new().with_response(primary(), ERRANDS_AND_PLANNING));
    seed_destinations(&h.store).await;
    let source = scratch(&h.store, &["Buy milk", "Call dentist", "Draft Q3 plan"]).await;
    h.organizer.run(source).await.unwrap();

    let errands = by_title(&h.store, "Errands").await;
    let change = h
        .organizer
        .versions()
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.document_id == errands.id)
        .unwrap();

    let preview = h.organizer.versions().preview(change.id).await.unwrap();
    assert_eq!(preview.action, RevertAction::RestoreContent);
    assert!(preview.warning.is_none());

    let result = h.organizer.versions().revert(change.id).await.unwrap();
    assert_eq!(result.document.id, errands.id);
    let restored = by_title(&h.store, "Errands").await;
    assert_eq!(restored.content_text, "");
    assert_eq!(h.organizer.versions().list().await.unwrap().len(), 1);

    // Planning is untouched by reverting the Errands change.
    assert!(by_title(&h.store, "Planning")
        .await
        .content_text
        .contains("Draft Q3 plan"));
}

#[tokio::test]
async fn test_revert_of_created_page_keeps_folders() {
    let h = harness(MockClassifier::new().with_response(
        primary(),
        r#"[{"targetPath": "/Health/Dentist", "content": "Call dentist"}]"#,
    ));
    let source = scratch(&h.store, &["Call dentist"]).await;
    h.organizer.run(source).await.unwrap();
    let change = h.organizer.versions().list().await.unwrap().remove(0);

    let result = h.organizer.versions().revert(change.id).await.unwrap();

    assert_eq!(result.action, RevertAction::DeleteDocument);
    assert!(by_title(&h.store, "Dentist").await.deleted);
    assert!(!by_title(&h.store, "Health").await.deleted);
}

#[tokio::test]
async fn test_manual_apply_is_recorded_as_manual() {
    let h = harness(MockClassifier::new());
    seed_destinations(&h.store).await;
    let source = scratch(&h.store, &["Pay rent"]).await;

    let report = h
        .organizer
        .apply_manual(
            source,
            vec![RoutedChunk::new("errands/", "Pay rent")],
            "Moved by hand",
        )
        .await
        .unwrap();

    assert_eq!(report.changed_paths, vec!["/Errands"]);
    let history = h.organizer.versions().list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger, ChangeTrigger::Manual);
    assert_eq!(history[0].reason, "Moved by hand");
    assert_eq!(h.classifier.call_count(), 0);
}

#[tokio::test]
async fn test_manual_apply_rejects_empty_chunks() {
    let h = harness(MockClassifier::new());
    let source = scratch(&h.store, &["Pay rent"]).await;

    let err = h
        .organizer
        .apply_manual(source, vec![RoutedChunk::new("/", "  ")], "noop")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

// ============================================================================
// EVENTS
// ============================================================================

#[tokio::test]
async fn test_run_events_share_the_run_id() {
    let h = harness(MockClassifier::new().with_response(primary(), ERRANDS_AND_PLANNING));
    seed_destinations(&h.store).await;
    let source = scratch(&h.store, &["Buy milk", "Call dentist", "Draft Q3 plan"]).await;
    let mut rx = h.events.subscribe();

    let report = h.organizer.run(source).await.unwrap();

    let mut types = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        assert_eq!(envelope.correlation_id, Some(report.run_id));
        types.push(envelope.event_type);
    }
    assert_eq!(
        types,
        vec!["paths.changed", "documents.changed", "run.completed"]
    );
}

#[tokio::test]
async fn test_failed_run_emits_run_failed() {
    let h = harness(MockClassifier::new());
    let mut rx = h.events.subscribe();

    let missing = Uuid::new_v4();
    assert!(h.organizer.run(missing).await.is_err());

    let envelope = rx.try_recv().unwrap();
    assert_eq!(envelope.event_type, "run.failed");
    assert_eq!(envelope.entity_id, Some(missing.to_string()));
}
