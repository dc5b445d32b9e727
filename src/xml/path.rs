//! Canonical path reconstruction for a node in a [`ConfigDocument`].
//!
//! A path is built from the ancestor chain, root to leaf. Each level is one
//! segment: its tag, qualified by the text of a direct `<name>` child when the
//! element has one (`"ge-0/0/0 interface"`). The RPC envelope and the
//! configuration root are stripped, and bare plural containers that only wrap
//! their singular child are collapsed:
//!
//! ```text
//! configuration interfaces interface unit  =>  interface unit
//! ```

use crate::xml::doc::{ConfigDocument, NodeId};
use std::fmt;

/// RPC envelope wrapping the device output.
pub const RPC_REPLY_TAG: &str = "rpc-reply";

/// Top-level container of the device configuration.
pub const CONFIGURATION_TAG: &str = "configuration";

/// Child element whose text qualifies its parent's tag.
pub const NAME_TAG: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub tag: String,
    pub name: Option<String>,
}

impl Segment {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: None,
        }
    }

    pub fn named(tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: Some(name.into()),
        }
    }

    /// True when this segment is an unnamed plural wrapper of `child`.
    fn wraps(&self, child: &Segment) -> bool {
        self.name.is_none()
            && self.tag.len() == child.tag.len() + 1
            && self.tag.ends_with('s')
            && self.tag.starts_with(child.tag.as_str())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} {}", name, self.tag),
            None => f.write_str(&self.tag),
        }
    }
}

/// Resolve the canonical path of `node`.
pub fn resolve_path(doc: &ConfigDocument, node: NodeId) -> String {
    render(&canonicalize(ancestor_segments(doc, node)))
}

/// Raw segments of the chain from the document node down to `node`.
pub fn ancestor_segments(doc: &ConfigDocument, node: NodeId) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut cur = Some(node);
    while let Some(id) = cur {
        let name = doc
            .child_named(id, NAME_TAG)
            .map(|n| doc.inner_text(n).trim().to_string())
            .filter(|n| !n.is_empty());
        out.push(match name {
            Some(name) => Segment::named(doc.tag(id), name),
            None => Segment::new(doc.tag(id)),
        });
        cur = doc.parent(id);
    }
    out.reverse();
    out
}

/// Apply the stripping and plural-collapse rules to root-to-leaf segments.
pub fn canonicalize(mut segments: Vec<Segment>) -> Vec<Segment> {
    if segments.first().is_some_and(|s| s.tag.is_empty()) {
        segments.remove(0);
    }
    if segments.len() > 1 && segments[0].tag == RPC_REPLY_TAG {
        segments.remove(0);
    }
    if segments.len() > 1 && segments[0].tag == CONFIGURATION_TAG {
        segments.remove(0);
    }

    // Collapse to a fixpoint, rescanning from the top after every removal.
    while let Some(i) = segments.windows(2).position(|w| w[0].wraps(&w[1])) {
        segments.remove(i);
    }

    segments
}

pub fn render(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(Segment::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::doc::parse_document;
    use pretty_assertions::assert_eq;

    fn plain(tags: &[&str]) -> Vec<Segment> {
        tags.iter().map(|t| Segment::new(*t)).collect()
    }

    fn find(doc: &ConfigDocument, path: &[&str]) -> NodeId {
        let mut cur = ConfigDocument::ROOT;
        for tag in path {
            cur = doc.child_named(cur, tag).unwrap();
        }
        cur
    }

    #[test]
    fn drops_configuration_root_and_plural_wrapper() {
        let out = canonicalize(plain(&["configuration", "interfaces", "interface", "unit"]));
        assert_eq!(render(&out), "interface unit");
    }

    #[test]
    fn strips_envelope_then_configuration() {
        let out = canonicalize(plain(&["", "rpc-reply", "configuration", "system", "services"]));
        assert_eq!(render(&out), "system services");
    }

    #[test]
    fn keeps_envelope_when_it_is_the_only_segment() {
        assert_eq!(render(&canonicalize(plain(&["", "rpc-reply"]))), "rpc-reply");
        assert_eq!(render(&canonicalize(plain(&["configuration"]))), "configuration");
        assert_eq!(render(&canonicalize(plain(&["rpc-reply", "configuration"]))), "configuration");
    }

    #[test]
    fn empty_chain_renders_empty() {
        assert_eq!(render(&canonicalize(Vec::new())), "");
        assert_eq!(render(&canonicalize(plain(&[""]))), "");
    }

    #[test]
    fn collapse_reaches_fixpoint() {
        // The second "units" only becomes a wrapper once the first removal
        // brings it next to "unit".
        let out = canonicalize(plain(&["configuration", "units", "units", "unit"]));
        assert_eq!(render(&out), "unit");

        let out = canonicalize(plain(&["policy-options", "policy-statements", "policy-statement"]));
        assert_eq!(render(&out), "policy-options policy-statement");
    }

    #[test]
    fn named_wrapper_is_not_collapsed() {
        let out = canonicalize(vec![
            Segment::named("groups", "core"),
            Segment::new("group"),
        ]);
        assert_eq!(render(&out), "core groups group");
    }

    #[test]
    fn named_qualifier_precedes_tag() {
        let doc = parse_document(
            b"<configuration><interfaces><interface><name>ge-0/0/0</name>\
              <unit><name>0</name></unit></interface></interfaces></configuration>",
        )
        .unwrap();
        let iface = find(&doc, &["configuration", "interfaces", "interface"]);
        assert_eq!(resolve_path(&doc, iface), "ge-0/0/0 interface");

        let unit = find(&doc, &["configuration", "interfaces", "interface", "unit"]);
        assert_eq!(resolve_path(&doc, unit), "ge-0/0/0 interface 0 unit");
    }

    #[test]
    fn resolution_is_repeatable() {
        let doc = parse_document(
            b"<rpc-reply><configuration><protocols><bgp><group><name>ext</name>\
              </group></bgp></protocols></configuration></rpc-reply>",
        )
        .unwrap();
        let group = find(&doc, &["rpc-reply", "configuration", "protocols", "bgp", "group"]);
        let first = resolve_path(&doc, group);
        assert_eq!(first, "protocols bgp ext group");
        assert_eq!(resolve_path(&doc, group), first);
    }

    #[test]
    fn empty_name_child_is_ignored() {
        let doc = parse_document(b"<configuration><vlans><vlan><name/></vlan></vlans></configuration>")
            .unwrap();
        let vlan = find(&doc, &["configuration", "vlans", "vlan"]);
        assert_eq!(resolve_path(&doc, vlan), "vlan");
    }
}
