use crate::xml::doc::{ConfigDocument, NodeId};
use crate::xml::path::resolve_path;

/// Attribute marking an administratively disabled subtree.
pub const INACTIVE_ATTR: &str = "inactive";

/// Outermost inactive elements, in document order.
///
/// An element is selected when it carries the inactive marker and none of its
/// ancestors does; the walk does not descend into a selected subtree.
pub fn inactive_nodes(doc: &ConfigDocument) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = doc
        .children(ConfigDocument::ROOT)
        .iter()
        .rev()
        .copied()
        .collect();

    while let Some(id) = stack.pop() {
        if doc.attribute(id, INACTIVE_ATTR).is_some() {
            out.push(id);
            continue;
        }
        stack.extend(doc.children(id).iter().rev().copied());
    }

    out
}

/// Canonical paths of every outermost inactive subtree in `doc`.
pub fn find_inactive(doc: &ConfigDocument) -> Vec<String> {
    inactive_nodes(doc)
        .into_iter()
        .map(|id| resolve_path(doc, id))
        .collect()
}
