//! Structured content tree for leaf documents.
//!
//! A leaf document's body is an ordered list of [`Block`]s. Every block kind
//! carries an optional [`OrganizationMetadata`] value recording its identity and
//! where its content has been filed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ORGANIZATION METADATA
// =============================================================================

/// Whether a block's content has been filed into a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    Yes,
    #[default]
    No,
}

/// One destination a block's content was copied into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizedLocation {
    pub destination_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organized_at: Option<DateTime<Utc>>,
}

/// Identity and organization state attached to a block.
///
/// Serialized with the attribute names of the underlying store schema
/// (`organizationStatus`, `isOrganized`, `whereOrganized`, `lastUpdated`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMetadata {
    pub id: String,
    #[serde(default)]
    pub organization_status: OrganizationStatus,
    /// Mirrors `organization_status == Yes`.
    #[serde(default)]
    pub is_organized: bool,
    #[serde(default)]
    pub where_organized: Vec<OrganizedLocation>,
    pub last_updated: DateTime<Utc>,
}

impl OrganizationMetadata {
    /// Fresh, unorganized metadata for a newly identified block.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            organization_status: OrganizationStatus::No,
            is_organized: false,
            where_organized: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn is_organized(&self) -> bool {
        self.organization_status == OrganizationStatus::Yes
    }

    /// Append a filing location and flip the block to organized.
    pub fn record_location(&mut self, destination_path: &str, stored_summary: Option<String>) {
        let now = Utc::now();
        self.where_organized.push(OrganizedLocation {
            destination_path: destination_path.to_string(),
            stored_summary,
            organized_at: Some(now),
        });
        self.organization_status = OrganizationStatus::Yes;
        self.is_organized = true;
        self.last_updated = now;
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// Discriminant of a [`Block`], used in block identifiers and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading,
    ListItem,
    Quote,
    Code,
}

impl BlockKind {
    /// Short tag embedded in generated block identifiers.
    pub fn tag(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "p",
            BlockKind::Heading => "h",
            BlockKind::ListItem => "li",
            BlockKind::Quote => "q",
            BlockKind::Code => "code",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "p" => Some(BlockKind::Paragraph),
            "h" => Some(BlockKind::Heading),
            "li" => Some(BlockKind::ListItem),
            "q" => Some(BlockKind::Quote),
            "code" => Some(BlockKind::Code),
            _ => None,
        }
    }
}

/// An addressable structural unit of a leaf document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<OrganizationMetadata>,
    },
    Heading {
        level: u8,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<OrganizationMetadata>,
    },
    ListItem {
        #[serde(default)]
        ordered: bool,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<OrganizationMetadata>,
    },
    Quote {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<OrganizationMetadata>,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<OrganizationMetadata>,
    },
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            text: text.into(),
            meta: None,
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level: level.clamp(1, 6),
            text: text.into(),
            meta: None,
        }
    }

    pub fn list_item(ordered: bool, text: impl Into<String>) -> Self {
        Block::ListItem {
            ordered,
            text: text.into(),
            meta: None,
        }
    }

    pub fn quote(text: impl Into<String>) -> Self {
        Block::Quote {
            text: text.into(),
            meta: None,
        }
    }

    pub fn code(language: Option<String>, text: impl Into<String>) -> Self {
        Block::Code {
            language,
            text: text.into(),
            meta: None,
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Paragraph { .. } => BlockKind::Paragraph,
            Block::Heading { .. } => BlockKind::Heading,
            Block::ListItem { .. } => BlockKind::ListItem,
            Block::Quote { .. } => BlockKind::Quote,
            Block::Code { .. } => BlockKind::Code,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Block::Paragraph { text, .. }
            | Block::Heading { text, .. }
            | Block::ListItem { text, .. }
            | Block::Quote { text, .. }
            | Block::Code { text, .. } => text,
        }
    }

    pub fn meta(&self) -> Option<&OrganizationMetadata> {
        match self {
            Block::Paragraph { meta, .. }
            | Block::Heading { meta, .. }
            | Block::ListItem { meta, .. }
            | Block::Quote { meta, .. }
            | Block::Code { meta, .. } => meta.as_ref(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut Option<OrganizationMetadata> {
        match self {
            Block::Paragraph { meta, .. }
            | Block::Heading { meta, .. }
            | Block::ListItem { meta, .. }
            | Block::Quote { meta, .. }
            | Block::Code { meta, .. } => meta,
        }
    }

    /// Builder-style metadata attachment, mostly for fixtures.
    pub fn with_meta(mut self, meta: OrganizationMetadata) -> Self {
        *self.meta_mut() = Some(meta);
        self
    }

    /// Identifier carried in the block's metadata, if any.
    pub fn block_id(&self) -> Option<&str> {
        self.meta().map(|m| m.id.as_str())
    }

    /// True when the block has no visible text.
    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }

    pub fn is_organized(&self) -> bool {
        self.meta().is_some_and(|m| m.is_organized())
    }

    /// Plain-text rendering of the block, with a light markdown flavour so the
    /// projection stays readable and re-parseable.
    pub fn to_plain_text(&self) -> String {
        match self {
            Block::Paragraph { text, .. } => text.clone(),
            Block::Heading { level, text, .. } => {
                format!("{} {}", "#".repeat(*level as usize), text)
            }
            Block::ListItem { ordered, text, .. } => {
                if *ordered {
                    format!("1. {}", text)
                } else {
                    format!("- {}", text)
                }
            }
            Block::Quote { text, .. } => format!("> {}", text),
            Block::Code { language, text, .. } => {
                format!("```{}\n{}\n```", language.as_deref().unwrap_or(""), text)
            }
        }
    }
}

// =============================================================================
// CONTENT TREE
// =============================================================================

/// Ordered block content of a leaf document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContentTree {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl ContentTree {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Block::is_empty)
    }

    /// Derived plain-text projection, one block per paragraph.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .filter(|b| !b.is_empty())
            .map(Block::to_plain_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn find(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_id() == Some(block_id))
    }

    pub fn find_mut(&mut self, block_id: &str) -> Option<&mut Block> {
        self.blocks
            .iter_mut()
            .find(|b| b.block_id() == Some(block_id))
    }

    /// Text of the non-empty blocks at the end of the tree, the most recently
    /// appended content.
    pub fn tail_text(&self, count: usize) -> String {
        let non_empty: Vec<&Block> = self.blocks.iter().filter(|b| !b.is_empty()).collect();
        let start = non_empty.len().saturating_sub(count);
        non_empty[start..]
            .iter()
            .map(|b| b.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse markdown-flavoured text into blocks.
///
/// Lines starting with `#` become headings, `- `/`* ` unordered list items,
/// `N. ` ordered list items, `> ` quotes and fenced sections code blocks.
/// Consecutive plain lines merge into one paragraph; blank lines separate
/// paragraphs.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<(Option<String>, Vec<&str>)> = None;

    fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !paragraph.is_empty() {
            blocks.push(Block::paragraph(paragraph.join("\n")));
            paragraph.clear();
        }
    }

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some((language, lines)) = code.as_mut() {
            if trimmed.starts_with("```") {
                blocks.push(Block::code(language.take(), lines.join("\n")));
                code = None;
            } else {
                lines.push(line);
            }
            continue;
        }

        if let Some(fence) = trimmed.strip_prefix("```") {
            flush(&mut paragraph, &mut blocks);
            let language = Some(fence.trim().to_string()).filter(|l| !l.is_empty());
            code = Some((language, Vec::new()));
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(block) = parse_line_block(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(block);
        } else {
            paragraph.push(trimmed);
        }
    }

    // Unterminated fence keeps its content.
    if let Some((language, lines)) = code {
        blocks.push(Block::code(language, lines.join("\n")));
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

fn parse_line_block(line: &str) -> Option<Block> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) && line[hashes..].starts_with(' ') {
        return Some(Block::heading(hashes as u8, line[hashes..].trim()));
    }
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(Block::list_item(false, rest.trim()));
    }
    if let Some(rest) = line.strip_prefix("> ") {
        return Some(Block::quote(rest.trim()));
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && line[digits..].starts_with(". ") {
        return Some(Block::list_item(true, line[digits + 2..].trim()));
    }
    None
}

/// Whitespace- and case-insensitive form of text used for duplicate checks.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
