//! Document repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use tidy_core::{
    new_v7, ContentTree, Document, DocumentFilter, DocumentKind, DocumentPatch, DocumentStore,
    Error, NewDocument, Result,
};

const DOCUMENT_COLUMNS: &str = "id, title, parent_id, kind, organized, content, content_text, \
                                metadata, deleted, created_at_utc, updated_at_utc";

/// PostgreSQL implementation of [`DocumentStore`].
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    /// Create a new PgDocumentStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_document(r: &PgRow) -> Result<Document> {
    let kind: String = r.get("kind");
    let content: Option<Json<ContentTree>> = r.get("content");
    Ok(Document {
        id: r.get("id"),
        title: r.get("title"),
        parent_id: r.get("parent_id"),
        kind: kind.parse()?,
        organized: r.get("organized"),
        content: content.map(|Json(tree)| tree),
        content_text: r.get("content_text"),
        metadata: r.get("metadata"),
        deleted: r.get("deleted"),
        created_at: r.get("created_at_utc"),
        updated_at: r.get("updated_at_utc"),
    })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM document WHERE id = $1 FOR UPDATE",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::DocumentNotFound(id))?;
        let mut doc = row_to_document(&row)?;

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

        sqlx::query(
            r#"
            UPDATE document
            SET title = $2, parent_id = $3, content = $4, content_text = $5,
                metadata = $6, deleted = $7, updated_at_utc = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&doc.title)
        .bind(doc.parent_id)
        .bind(doc.content.as_ref().map(Json))
        .bind(&doc.content_text)
        .bind(&doc.metadata)
        .bind(doc.deleted)
        .bind(doc.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "documents",
            op = "update",
            document_id = %id,
            "Document updated"
        );
        Ok(doc)
    }

    async fn create(&self, fields: NewDocument) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        let content = match fields.kind {
            DocumentKind::Container => None,
            DocumentKind::Leaf => Some(fields.content.unwrap_or_default()),
        };
        let content_text = content.as_ref().map(|c| c.plain_text()).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO document (id, title, parent_id, kind, organized, content, content_text,
                                  metadata, deleted, created_at_utc, updated_at_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, $9)
            "#,
        )
        .bind(id)
        .bind(&fields.title)
        .bind(fields.parent_id)
        .bind(fields.kind.as_str())
        .bind(fields.organized)
        .bind(content.map(Json))
        .bind(content_text)
        .bind(&fields.metadata)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "documents",
            op = "create",
            document_id = %id,
            kind = fields.kind.as_str(),
            "Document created"
        );
        Ok(id)
    }

    async fn list_by_parent(&self, parent_id: Option<Uuid>) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM document
             WHERE parent_id IS NOT DISTINCT FROM $1 AND deleted = FALSE
             ORDER BY title, id",
            DOCUMENT_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_document).collect()
    }

    async fn list_all(&self, filter: DocumentFilter) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM document
             WHERE ($1::text IS NULL OR kind = $1)
               AND ($2::boolean IS NULL OR organized = $2)
               AND ($3 OR deleted = FALSE)
             ORDER BY id",
            DOCUMENT_COLUMNS
        ))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.organized)
        .bind(filter.include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_document).collect()
    }
}
