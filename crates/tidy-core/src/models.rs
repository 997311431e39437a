//! Core data models for tidy.
//!
//! These types are shared across all tidy crates and represent the documents
//! the organization engine reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::content::{Block, ContentTree};

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Whether a document groups other documents or holds content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Purely hierarchical grouping node; never holds blocks.
    Container,
    /// Holds block content; may be a classification destination.
    Leaf,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Container => "container",
            DocumentKind::Leaf => "leaf",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(DocumentKind::Container),
            "leaf" => Ok(DocumentKind::Leaf),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown document kind: {}",
                other
            ))),
        }
    }
}

/// A persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub parent_id: Option<Uuid>,
    pub kind: DocumentKind,
    /// True for classification destinations, false for scratch/inbox documents.
    pub organized: bool,
    /// Always `None` for containers.
    pub content: Option<ContentTree>,
    /// Plain-text projection of `content`.
    pub content_text: String,
    #[serde(default)]
    pub metadata: JsonValue,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_container(&self) -> bool {
        self.kind == DocumentKind::Container
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == DocumentKind::Leaf
    }

    /// Free-text organization rules stored in the document metadata.
    pub fn organization_rules(&self) -> Option<&str> {
        self.metadata
            .get("organizationRules")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    pub fn to_ref(&self, path: impl Into<String>) -> DocumentRef {
        DocumentRef {
            id: self.id,
            title: self.title.clone(),
            path: path.into(),
        }
    }
}

/// Fields for creating a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub parent_id: Option<Uuid>,
    pub kind: DocumentKind,
    pub organized: bool,
    pub content: Option<ContentTree>,
    pub metadata: JsonValue,
}

impl NewDocument {
    /// A grouping node under `parent_id`.
    pub fn container(title: impl Into<String>, parent_id: Option<Uuid>) -> Self {
        Self {
            title: title.into(),
            parent_id,
            kind: DocumentKind::Container,
            organized: true,
            content: None,
            metadata: JsonValue::Object(Default::default()),
        }
    }

    /// A classification destination holding `content`.
    pub fn leaf(title: impl Into<String>, parent_id: Option<Uuid>, content: ContentTree) -> Self {
        Self {
            title: title.into(),
            parent_id,
            kind: DocumentKind::Leaf,
            organized: true,
            content: Some(content),
            metadata: JsonValue::Object(Default::default()),
        }
    }

    /// A scratch document whose blocks are waiting to be filed.
    pub fn scratch(title: impl Into<String>, content: ContentTree) -> Self {
        Self {
            organized: false,
            ..Self::leaf(title, None, content)
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Partial update of a document. Every update refreshes `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub parent_id: Option<Option<Uuid>>,
    pub content: Option<ContentTree>,
    /// Overrides the projection derived from `content` when set.
    pub content_text: Option<String>,
    pub metadata: Option<JsonValue>,
    pub deleted: Option<bool>,
}

impl DocumentPatch {
    /// Replace the content tree and its derived projection.
    pub fn content(content: ContentTree) -> Self {
        Self {
            content_text: Some(content.plain_text()),
            content: Some(content),
            ..Default::default()
        }
    }

    /// Restore a snapshot with an exact recorded projection.
    pub fn restore(content: ContentTree, content_text: String) -> Self {
        Self {
            content: Some(content),
            content_text: Some(content_text),
            ..Default::default()
        }
    }

    pub fn soft_delete() -> Self {
        Self {
            deleted: Some(true),
            ..Default::default()
        }
    }
}

/// Selection for [`crate::DocumentStore::list_all`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    pub organized: Option<bool>,
    pub include_deleted: bool,
}

impl DocumentFilter {
    /// Every live destination document (containers and leaves).
    pub fn destinations() -> Self {
        Self {
            organized: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if doc.deleted && !self.include_deleted {
            return false;
        }
        if let Some(kind) = self.kind {
            if doc.kind != kind {
                return false;
            }
        }
        if let Some(organized) = self.organized {
            if doc.organized != organized {
                return false;
            }
        }
        true
    }
}

/// Lightweight identity of a document for notifications and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: Uuid,
    pub title: String,
    pub path: String,
}

// =============================================================================
// ROUTING TYPES
// =============================================================================

/// One unit of classified content and the leaf path it belongs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedChunk {
    /// `/`-delimited titles from the hierarchy root to a leaf.
    pub target_path: String,
    pub content: String,
    /// 1-based indices into the numbered block list sent to the classifier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_blocks: Vec<usize>,
    /// Blocks appended as they are instead of parsing `content`. Set when
    /// the chunk carries source blocks unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl RoutedChunk {
    pub fn new(target_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            content: content.into(),
            source_blocks: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Path segments with surrounding whitespace and empty segments removed.
    pub fn segments(&self) -> Vec<&str> {
        path_segments(&self.target_path)
    }
}

/// Split a target path into trimmed, non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(crate::defaults::PATH_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Whether two destination titles name the same page: exact, or equal
/// after Unicode lowercasing.
pub fn titles_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Canonical form of a target path: leading `/`, trimmed segments.
pub fn normalize_path(path: &str) -> String {
    let segments = path_segments(path);
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push(crate::defaults::PATH_SEPARATOR);
        out.push_str(segment);
    }
    out
}

/// Slim projection of the destination hierarchy used to ground the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationTreeNode {
    pub id: Uuid,
    pub title: String,
    pub kind: DocumentKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DestinationTreeNode>,
}

impl DestinationTreeNode {
    /// Synthetic root holding the top-level destinations.
    pub fn root(children: Vec<DestinationTreeNode>) -> Self {
        Self {
            id: Uuid::nil(),
            title: String::new(),
            kind: DocumentKind::Container,
            children,
        }
    }

    /// Walk `path` from this node, preferring exact titles over
    /// [`titles_match`].
    pub fn find_path(&self, path: &str) -> Option<&DestinationTreeNode> {
        let mut node = self;
        for segment in path_segments(path) {
            node = node
                .children
                .iter()
                .find(|c| c.title == segment)
                .or_else(|| {
                    node.children
                        .iter()
                        .find(|c| titles_match(&c.title, segment))
                })?;
        }
        Some(node)
    }

    /// Total number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}
