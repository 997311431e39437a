//! Destination hierarchy snapshot used to ground the classifier.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};
use uuid::Uuid;

use tidy_core::{
    DestinationTreeNode, Document, DocumentFilter, DocumentKind, DocumentStore, Result,
};

/// Build the destination forest from live, organized documents.
///
/// Documents whose parent is missing from the input hang off the root.
/// Children are sorted by title at every level, so the result does not depend
/// on input order. Parent cycles are broken at the first member reached.
pub fn build_tree(documents: &[Document]) -> DestinationTreeNode {
    let live: Vec<&Document> = documents
        .iter()
        .filter(|d| d.organized && !d.deleted)
        .collect();
    let ids: HashSet<Uuid> = live.iter().map(|d| d.id).collect();

    let mut children: HashMap<Option<Uuid>, Vec<&Document>> = HashMap::new();
    for doc in live.iter().copied() {
        let parent = doc.parent_id.filter(|p| ids.contains(p));
        children.entry(parent).or_default().push(doc);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|d| sort_key(&d.title, d.id));
    }

    let mut visited = HashSet::new();
    let mut roots: Vec<DestinationTreeNode> = children
        .get(&None)
        .map(|top| {
            top.iter()
                .filter_map(|doc| build_node(doc, &children, &mut visited))
                .collect()
        })
        .unwrap_or_default();

    // Documents only reachable through a parent cycle.
    let mut stranded: Vec<&Document> = live
        .iter()
        .copied()
        .filter(|d| !visited.contains(&d.id))
        .collect();
    stranded.sort_by_key(|d| sort_key(&d.title, d.id));
    for doc in stranded {
        if let Some(node) = build_node(doc, &children, &mut visited) {
            roots.push(node);
        }
    }
    roots.sort_by_key(|n| sort_key(&n.title, n.id));

    DestinationTreeNode::root(roots)
}

fn sort_key(title: &str, id: Uuid) -> (String, String, Uuid) {
    (title.to_lowercase(), title.to_string(), id)
}

fn build_node(
    doc: &Document,
    children: &HashMap<Option<Uuid>, Vec<&Document>>,
    visited: &mut HashSet<Uuid>,
) -> Option<DestinationTreeNode> {
    if !visited.insert(doc.id) {
        return None;
    }
    let kids = match doc.kind {
        DocumentKind::Container => children
            .get(&Some(doc.id))
            .map(|list| {
                list.iter()
                    .filter_map(|child| build_node(child, children, visited))
                    .collect()
            })
            .unwrap_or_default(),
        DocumentKind::Leaf => Vec::new(),
    };
    Some(DestinationTreeNode {
        id: doc.id,
        title: doc.title.clone(),
        kind: doc.kind,
        children: kids,
    })
}

/// Render the tree as an indented outline, two spaces per level.
///
/// ```text
/// [FILE] Errands
/// [DIR] Work
///   [FILE] Planning
/// ```
pub fn serialize_tree(tree: &DestinationTreeNode) -> String {
    let mut out = String::new();
    for child in &tree.children {
        write_node(child, 0, &mut out);
    }
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

fn write_node(node: &DestinationTreeNode, depth: usize, out: &mut String) {
    let marker = match node.kind {
        DocumentKind::Container => "[DIR]",
        DocumentKind::Leaf => "[FILE]",
    };
    out.push_str(&"  ".repeat(depth));
    out.push_str(marker);
    out.push(' ');
    out.push_str(&node.title);
    out.push('\n');
    for child in &node.children {
        write_node(child, depth + 1, out);
    }
}

/// Full paths of every leaf, in outline order.
pub fn leaf_paths(tree: &DestinationTreeNode) -> Vec<String> {
    fn walk(node: &DestinationTreeNode, prefix: &str, out: &mut Vec<String>) {
        for child in &node.children {
            let path = format!("{}/{}", prefix, child.title);
            match child.kind {
                DocumentKind::Leaf => out.push(path),
                DocumentKind::Container => walk(child, &path, out),
            }
        }
    }
    let mut out = Vec::new();
    walk(tree, "", &mut out);
    out
}

/// Snapshot the current destination hierarchy from the store, leaving out
/// `exclude` (the document being organized).
#[instrument(skip(store), fields(subsystem = "organize", component = "destination_tree", op = "load"))]
pub async fn load_destination_tree(
    store: &dyn DocumentStore,
    exclude: Option<Uuid>,
) -> Result<DestinationTreeNode> {
    let mut documents = store.list_all(DocumentFilter::destinations()).await?;
    if let Some(id) = exclude {
        documents.retain(|d| d.id != id);
    }
    let tree = build_tree(&documents);
    debug!(
        documents = documents.len(),
        nodes = tree.descendant_count(),
        "Destination tree built"
    );
    Ok(tree)
}
