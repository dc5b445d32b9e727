use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;

/// Handle of a node inside a [`ConfigDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    text: String,
}

impl Node {
    fn new(tag: String, parent: Option<NodeId>) -> Self {
        Self {
            tag,
            parent,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            text: String::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed xml at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("unexpected closing tag </{0}>")]
    UnexpectedEnd(String),
    #[error("document ended with <{0}> still open")]
    Unclosed(String),
    #[error("document contains no elements")]
    Empty,
}

/// One host's configuration snapshot as an arena of element nodes.
///
/// Node 0 is the document node: it has an empty tag and no parent, and the
/// top-level elements hang off it. Nodes refer to their parent by index.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    nodes: Vec<Node>,
}

impl ConfigDocument {
    pub const ROOT: NodeId = NodeId(0);

    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0].attributes.get(name).map(String::as_str)
    }

    /// Concatenated text of `id` and all of its descendants.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        out.push_str(&node.text);
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    /// First direct child element with the given tag.
    pub fn child_named(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.tag(*child) == tag)
    }

    fn push(&mut self, tag: String, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(tag, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }
}

/// Parse raw configuration output into a [`ConfigDocument`].
///
/// Tags and attribute keys are stored by local name (namespace prefixes are
/// dropped). Whitespace-only text is discarded.
pub fn parse_document(input: &[u8]) -> Result<ConfigDocument, ParseError> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut doc = ConfigDocument {
        nodes: vec![Node::new(String::new(), None)],
    };
    let mut open: Vec<NodeId> = vec![ConfigDocument::ROOT];
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| ParseError::Xml {
                position: reader.buffer_position(),
                source,
            })?;
        let top = *open.last().unwrap_or(&ConfigDocument::ROOT);

        match event {
            Event::Start(ref e) => {
                let id = add_element(&mut doc, top, e, reader.buffer_position())?;
                open.push(id);
            }
            Event::Empty(ref e) => {
                add_element(&mut doc, top, e, reader.buffer_position())?;
            }
            Event::End(ref e) => {
                if open.len() <= 1 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    return Err(ParseError::UnexpectedEnd(name));
                }
                open.pop();
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|source| ParseError::Xml {
                    position: reader.buffer_position(),
                    source,
                })?;
                doc.nodes[top.0].text.push_str(&text);
            }
            Event::CData(ref t) => {
                doc.nodes[top.0].text.push_str(&String::from_utf8_lossy(t));
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctypes.
            _ => {}
        }
    }

    if open.len() > 1 {
        let id = open[open.len() - 1];
        return Err(ParseError::Unclosed(doc.tag(id).to_string()));
    }
    if doc.children(ConfigDocument::ROOT).is_empty() {
        return Err(ParseError::Empty);
    }

    Ok(doc)
}

fn add_element(
    doc: &mut ConfigDocument,
    parent: NodeId,
    start: &BytesStart<'_>,
    position: usize,
) -> Result<NodeId, ParseError> {
    let tag = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let id = doc.push(tag, parent);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml {
            position,
            source: e.into(),
        })?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|source| ParseError::Xml { position, source })?
            .into_owned();
        doc.nodes[id.0].attributes.insert(key, value);
    }

    Ok(id)
}
