//! PostgreSQL store tests.
//!
//! Run with a migrated-capable database:
//! `DATABASE_URL=postgres://... cargo test -p tidy-db -- --ignored`
//! A `.env` file in the working directory is also honored.

use tidy_db::test_fixtures::TestDatabase;
use tidy_db::{
    Block, ChangeAction, ChangeLog, ChangePhase, ChangeRecord, ChangeTrigger, ContentTree,
    DocumentFilter, DocumentKind, DocumentPatch, DocumentStore, HistoryStore, NewDocument,
};
use uuid::Uuid;

/// Load `.env` before opening the per-test schema.
async fn test_db() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_create_leaf_and_read_back_content_tree() {
    let test_db = test_db().await;
    let store = &test_db.db.documents;

    let content = ContentTree::new(vec![
        Block::heading(1, "Errands"),
        Block::list_item(false, "Buy milk"),
    ]);
    let id = store
        .create(NewDocument::leaf("Errands", None, content.clone()))
        .await
        .unwrap();

    let doc = store.require(id).await.unwrap();
    assert_eq!(doc.kind, DocumentKind::Leaf);
    assert_eq!(doc.content, Some(content));
    assert_eq!(doc.content_text, "# Errands\n\n- Buy milk");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_hierarchy_listing_and_soft_delete() {
    let test_db = test_db().await;
    let store = &test_db.db.documents;

    let work = store
        .create(NewDocument::container("Work", None))
        .await
        .unwrap();
    let planning = store
        .create(NewDocument::leaf("Planning", Some(work), ContentTree::default()))
        .await
        .unwrap();
    store
        .create(NewDocument::scratch("Scratch", ContentTree::default()))
        .await
        .unwrap();

    let children = store.list_by_parent(Some(work)).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, planning);

    let destinations = store.list_all(DocumentFilter::destinations()).await.unwrap();
    assert_eq!(destinations.len(), 2);

    store
        .update(planning, DocumentPatch::soft_delete())
        .await
        .unwrap();
    assert!(store.list_by_parent(Some(work)).await.unwrap().is_empty());
    assert!(store.get(planning).await.unwrap().unwrap().deleted);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_container_rejects_content() {
    let test_db = test_db().await;
    let store = &test_db.db.documents;

    let id = store
        .create(NewDocument::container("Work", None))
        .await
        .unwrap();
    let result = store
        .update(id, DocumentPatch::content(ContentTree::default()))
        .await;
    assert!(result.is_err());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_history_persists_in_profile_metadata() {
    let test_db = test_db().await;
    let history = test_db.db.history_for(Uuid::new_v4(), 2);

    assert!(history.load().await.unwrap().is_empty());

    let mut log = ChangeLog::new(2);
    for reason in ["a", "b", "c"] {
        log.push(ChangeRecord::snapshot(
            ChangeTrigger::Classification,
            ChangePhase::Before,
            ChangeAction::Updated,
            Uuid::new_v4(),
            "/Errands",
            reason,
            None,
            "",
        ));
    }
    history.save(&log).await.unwrap();

    let loaded = history.load().await.unwrap();
    assert_eq!(loaded.len(), 2);
    let reasons: Vec<&str> = loaded.iter().map(|r| r.reason.as_str()).collect();
    assert_eq!(reasons, vec!["c", "b"]);

    test_db.cleanup().await;
}
