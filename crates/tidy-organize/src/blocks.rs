//! Block identity and organization-state tracking.
//!
//! Every block in a scratch document gets an identifier of the form
//! `{document}-{kind}-{millis}-{suffix}`, where `document` is the owning
//! document id in simple hex, `kind` the [`BlockKind`] tag, `millis` the
//! creation time and `suffix` eight random lowercase alphanumerics. Blocks
//! without such an identifier (missing, or a short legacy id) are
//! re-identified by [`ensure_identities`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rand::distributions::{Alphanumeric, DistString};
use regex::Regex;
use tracing::{debug, trace};
use uuid::Uuid;

use tidy_core::{Block, BlockKind, ContentTree, OrganizationMetadata};

const SUFFIX_LEN: usize = 8;

static BLOCK_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{32}-(p|h|li|q|code)-[0-9]{10,}-[a-z0-9]{8}$").unwrap()
});

/// Generate a fresh identifier for a block of `kind` owned by `document_id`.
pub fn generate_block_id(document_id: Uuid, kind: BlockKind) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = Alphanumeric
        .sample_string(&mut rand::thread_rng(), SUFFIX_LEN)
        .to_lowercase();
    format!(
        "{}-{}-{}-{}",
        document_id.simple(),
        kind.tag(),
        millis,
        suffix
    )
}

/// Whether `id` has the generated identifier shape.
pub fn is_well_formed_id(id: &str) -> bool {
    BLOCK_ID_RE.is_match(id)
}

/// Assign identifiers to every block that lacks a well-formed one.
///
/// Re-identified blocks start over with unorganized metadata. Returns the
/// number of blocks that were assigned a new identifier; text is never
/// touched.
pub fn ensure_identities(document_id: Uuid, tree: &mut ContentTree) -> usize {
    let mut assigned = 0;
    for block in tree.blocks.iter_mut() {
        let well_formed = block.block_id().is_some_and(is_well_formed_id);
        if well_formed {
            continue;
        }
        let id = generate_block_id(document_id, block.kind());
        trace!(block_id = %id, previous = ?block.block_id(), "Assigning block identity");
        *block.meta_mut() = Some(OrganizationMetadata::new(id));
        assigned += 1;
    }
    if assigned > 0 {
        debug!(document_id = %document_id, assigned, "Assigned block identities");
    }
    assigned
}

/// Consistency pass: strip metadata from every block whose id is shared.
///
/// Both copies lose their metadata so neither silently inherits the other's
/// organization history. Returns the number of blocks cleared.
pub fn clear_duplicate_ids(tree: &mut ContentTree) -> usize {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in tree.blocks.iter().filter_map(Block::block_id) {
        *counts.entry(id.to_string()).or_default() += 1;
    }

    let mut cleared = 0;
    for block in tree.blocks.iter_mut() {
        let duplicated = block
            .block_id()
            .is_some_and(|id| counts.get(id).copied().unwrap_or(0) > 1);
        if duplicated {
            *block.meta_mut() = None;
            cleared += 1;
        }
    }
    if cleared > 0 {
        debug!(cleared, "Cleared duplicated block identities");
    }
    cleared
}

/// Non-empty blocks not yet filed anywhere, in document order.
pub fn list_unorganized(tree: &ContentTree) -> Vec<&Block> {
    tree.blocks
        .iter()
        .filter(|b| !b.is_empty() && !b.is_organized())
        .collect()
}

/// Record that `block_id` was filed into `destination_path`.
///
/// Returns false when no block carries that id.
pub fn mark_organized(
    tree: &mut ContentTree,
    block_id: &str,
    destination_path: &str,
    stored_summary: Option<String>,
) -> bool {
    let Some(block) = tree.find_mut(block_id) else {
        return false;
    };
    match block.meta_mut() {
        Some(meta) => {
            meta.record_location(destination_path, stored_summary);
            true
        }
        None => false,
    }
}
