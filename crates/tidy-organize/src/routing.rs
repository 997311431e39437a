//! Routing engine: asks the classifier where unorganized blocks belong.
//!
//! The classifier sees the source title, a bounded excerpt of the source,
//! the serialized destination tree, the numbered unorganized blocks and the
//! user's organization rules. Its answer is cleaned of code fences and prose,
//! parsed, validated against the destination tree, and replaced by a single
//! Inbox chunk whenever nothing usable comes back, so no content is lost.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use tidy_core::defaults::{
    DEFAULT_DESTINATION, FALLBACK_MODEL, PRIMARY_MODEL, RULES_MAX_CHARS, SOURCE_EXCERPT_CHARS,
};
use tidy_core::{
    normalize_path, Block, ClassificationService, DestinationTreeNode, DocumentKind, Error,
    Result, RoutedChunk,
};

use crate::destination_tree::serialize_tree;

/// System instructions sent with every routing request.
pub const SYSTEM_PROMPT: &str = "You file note fragments into a hierarchy of topic pages.\n\
Each destination is a path of page titles separated by '/', starting at the root, for example \"/Work/Planning\".\n\
[DIR] entries are folders and can never receive content; only [FILE] entries or new pages can.\n\
Prefer existing pages. Create a new page (and any missing folders) only when nothing fits.\n\
Every numbered block must be filed somewhere. Keep the user's wording.\n\
Answer with JSON only: {\"chunks\":[{\"targetPath\":\"/Folder/Page\",\"content\":\"text\",\"blocks\":[1,2]}]}";

/// Models and limits used by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub primary_model: String,
    pub fallback_model: String,
    /// Characters of the full source text included for context.
    pub excerpt_chars: usize,
    /// Characters of organization rules included in the prompt.
    pub rules_max_chars: usize,
    /// Catch-all destination for content the classifier did not place.
    pub default_destination: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary_model: PRIMARY_MODEL.to_string(),
            fallback_model: FALLBACK_MODEL.to_string(),
            excerpt_chars: SOURCE_EXCERPT_CHARS,
            rules_max_chars: RULES_MAX_CHARS,
            default_destination: DEFAULT_DESTINATION.to_string(),
        }
    }
}

/// Everything the classifier is shown for one run.
#[derive(Debug, Clone, Copy)]
pub struct RoutingRequest<'a> {
    pub source_title: &'a str,
    /// Unorganized blocks, numbered from 1 in the prompt.
    pub blocks: &'a [Block],
    pub destination_tree: &'a DestinationTreeNode,
    pub full_source_text: &'a str,
    pub organization_rules: Option<&'a str>,
}

/// Where a set of chunks came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingSource {
    Classifier { model: String, attempts: usize },
    /// The default-destination chunk replaced the classifier's answer.
    Fallback { reason: String },
}

impl RoutingSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, RoutingSource::Fallback { .. })
    }
}

/// Result of routing one batch of blocks.
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    pub chunks: Vec<RoutedChunk>,
    pub source: RoutingSource,
}

/// Calls the classifier and turns its answer into validated chunks.
pub struct RoutingEngine {
    classifier: Arc<dyn ClassificationService>,
    config: RoutingConfig,
}

impl RoutingEngine {
    pub fn new(classifier: Arc<dyn ClassificationService>, config: RoutingConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Route `request.blocks` to destinations.
    ///
    /// Never fails: when both models fail, or every entry is invalid, the
    /// outcome is a single chunk to the default destination holding every
    /// block.
    #[instrument(skip(self, request), fields(subsystem = "organize", component = "router", op = "route", block_count = request.blocks.len()))]
    pub async fn route(&self, request: RoutingRequest<'_>) -> RoutingOutcome {
        if request.blocks.is_empty() {
            return RoutingOutcome {
                chunks: Vec::new(),
                source: RoutingSource::Classifier {
                    model: String::new(),
                    attempts: 0,
                },
            };
        }

        let prompt = build_prompt(&request, &self.config);
        let models = [
            ("primary", self.config.primary_model.as_str()),
            ("fallback", self.config.fallback_model.as_str()),
        ];

        let mut last_error = String::new();
        for (attempt, (label, model)) in models.iter().enumerate() {
            let start = Instant::now();
            match self.attempt(&prompt, model, &request).await {
                Ok(chunks) if chunks.is_empty() => {
                    warn!(
                        model = %model,
                        attempt = %label,
                        "Classifier returned no usable chunks, using default destination"
                    );
                    return self.fallback(&request, "classifier returned no usable chunks");
                }
                Ok(chunks) => {
                    info!(
                        model = %model,
                        attempt = %label,
                        chunk_count = chunks.len(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Blocks routed"
                    );
                    return RoutingOutcome {
                        chunks,
                        source: RoutingSource::Classifier {
                            model: model.to_string(),
                            attempts: attempt + 1,
                        },
                    };
                }
                Err(e) => {
                    warn!(
                        model = %model,
                        attempt = %label,
                        error = %e,
                        "Classification attempt failed"
                    );
                    last_error = e.to_string();
                    if !e.is_retryable_classification() {
                        break;
                    }
                }
            }
        }

        let unavailable = Error::ClassificationUnavailable(last_error);
        warn!(error = %unavailable, "Falling back to default destination");
        self.fallback(&request, &unavailable.to_string())
    }

    async fn attempt(
        &self,
        prompt: &str,
        model: &str,
        request: &RoutingRequest<'_>,
    ) -> Result<Vec<RoutedChunk>> {
        let text = self.classifier.invoke(SYSTEM_PROMPT, prompt, model).await?;
        debug!(model = %model, response_len = text.len(), "Classifier responded");
        let raw = parse_routing_response(&text)?;
        Ok(validate_chunks(
            raw,
            request.destination_tree,
            request.blocks.len(),
        ))
    }

    fn fallback(&self, request: &RoutingRequest<'_>, reason: &str) -> RoutingOutcome {
        RoutingOutcome {
            chunks: vec![fallback_chunk(
                request.blocks,
                &self.config.default_destination,
            )],
            source: RoutingSource::Fallback {
                reason: reason.to_string(),
            },
        }
    }
}

/// Single chunk to `destination` carrying every block unchanged, in order.
/// Organization metadata is dropped so the copies get their own identity.
pub fn fallback_chunk(blocks: &[Block], destination: &str) -> RoutedChunk {
    let carried: Vec<Block> = blocks
        .iter()
        .cloned()
        .map(|mut block| {
            *block.meta_mut() = None;
            block
        })
        .collect();
    RoutedChunk {
        target_path: normalize_path(destination),
        content: blocks.iter().map(Block::text).collect::<Vec<_>>().join("\n\n"),
        source_blocks: (1..=blocks.len()).collect(),
        blocks: carried,
    }
}

/// Compose the user prompt for one routing request.
pub fn build_prompt(request: &RoutingRequest<'_>, config: &RoutingConfig) -> String {
    let tree = serialize_tree(request.destination_tree);
    let rules = request
        .organization_rules
        .map(|r| truncate_chars(r, config.rules_max_chars))
        .unwrap_or_else(|| "(none)".to_string());

    let mut prompt = String::new();
    prompt.push_str(&format!("Source document: \"{}\"\n\n", request.source_title));
    prompt.push_str("Organization rules:\n");
    prompt.push_str(&rules);
    prompt.push_str("\n\nExisting destinations:\n");
    if tree.is_empty() {
        prompt.push_str("(none yet)");
    } else {
        prompt.push_str(&tree);
    }
    prompt.push_str("\n\nSource excerpt (context only, do not file):\n\"\"\"\n");
    prompt.push_str(&truncate_chars(
        request.full_source_text,
        config.excerpt_chars,
    ));
    prompt.push_str("\n\"\"\"\n\nBlocks to file:\n");
    for (i, block) in request.blocks.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, block.text()));
    }
    prompt
}

/// First `max` characters of `text`, marked with an ellipsis when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}…", &text[..byte]),
        None => text.to_string(),
    }
}

/// One entry of the classifier's answer before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub target_path: String,
    pub content: String,
    pub blocks: Vec<usize>,
}

/// Parse a classifier answer into raw entries.
///
/// Accepts a bare array, an object with a `chunks` array, or a single entry
/// object, optionally wrapped in code fences or surrounded by prose. Entries
/// that are not objects are skipped.
pub fn parse_routing_response(text: &str) -> Result<Vec<RawChunk>> {
    let value = parse_json_value(text)?;
    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("chunks") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::MalformedResponse(format!(
                    "`chunks` is not an array: {}",
                    other
                )))
            }
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(Error::MalformedResponse(format!(
                "expected array or object, got {}",
                other
            )))
        }
    };

    Ok(entries.iter().filter_map(raw_chunk).collect())
}

fn raw_chunk(entry: &Value) -> Option<RawChunk> {
    let obj = entry.as_object()?;
    let target_path = ["targetPath", "target_path", "path"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let content = match obj.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    let blocks = obj
        .get("blocks")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| {
                    v.as_u64()
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                })
                .map(|n| n as usize)
                .collect()
        })
        .unwrap_or_default();
    Some(RawChunk {
        target_path,
        content,
        blocks,
    })
}

/// Parse the outermost JSON value, first from the raw text and then from
/// inside a code fence.
fn parse_json_value(text: &str) -> Result<Value> {
    let mut last_error = format!("no JSON value in response: {}", preview(text));
    for candidate in [text.trim(), strip_fences(text)] {
        let Some(json) = outermost_json(candidate) else {
            continue;
        };
        match serde_json::from_str(json) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = format!("{}: {}", e, preview(json)),
        }
    }
    Err(Error::MalformedResponse(last_error))
}

/// Slice from the first `[`/`{` to the last matching closer.
fn outermost_json(body: &str) -> Option<&str> {
    let start = body.find(['[', '{'])?;
    let close = if body[start..].starts_with('[') { ']' } else { '}' };
    let end = body.rfind(close)?;
    (end > start).then(|| &body[start..=end])
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string (`json`) on the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn preview(text: &str) -> String {
    truncate_chars(text.trim(), 120)
}

/// Drop entries without a path or content, entries targeting a container,
/// and block indices outside `1..=block_count`.
pub fn validate_chunks(
    raw: Vec<RawChunk>,
    tree: &DestinationTreeNode,
    block_count: usize,
) -> Vec<RoutedChunk> {
    let mut chunks = Vec::with_capacity(raw.len());
    for entry in raw {
        let target_path = normalize_path(&entry.target_path);
        let content = entry.content.trim();
        if target_path.is_empty() || content.is_empty() {
            debug!(target_path = %entry.target_path, "Dropping chunk without path or content");
            continue;
        }
        if tree
            .find_path(&target_path)
            .is_some_and(|node| node.kind == DocumentKind::Container)
        {
            warn!(target_path = %target_path, "Dropping chunk that targets a folder");
            continue;
        }
        let source_blocks: BTreeSet<usize> = entry
            .blocks
            .into_iter()
            .filter(|i| (1..=block_count).contains(i))
            .collect();
        chunks.push(RoutedChunk {
            target_path,
            content: content.to_string(),
            source_blocks: source_blocks.into_iter().collect(),
            blocks: Vec::new(),
        });
    }
    chunks
}
