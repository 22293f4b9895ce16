//! Owned markup trees produced by the cleaner.
//!
//! This module provides:
//! - An arena-backed [`Document`] with lower-cased tag and attribute names
//! - [`NodeRef`], a cheap shared handle into a document
//! - The [`Cleaner`] that repairs tag soup or parses XML into a document
//!
//! Node ids are assigned in document order, so sorting ids sorts nodes the
//! way XPath expects.

mod builder;
mod cleaner;
mod html;
mod xml;

pub use builder::DocumentBuilder;
pub use cleaner::{CleanMode, Cleaner, Substitution};

use std::fmt;
use std::sync::Arc;

/// Index of a node inside its [`Document`].
pub type NodeId = usize;

/// The payload of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root; it has no name.
    Root,
    /// An element with its attributes in source order.
    Element {
        /// Lower-cased tag name.
        name: String,
        /// Lower-cased attribute names with their values.
        attributes: Vec<(String, String)>,
    },
    /// A run of character data.
    Text(String),
    /// A comment.
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned markup tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a document holding only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Returns the id of the root node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Returns the number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the document has nothing below the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Returns the children of a node in document order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Returns the element name, if the node is an element.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the attributes of an element, empty for other nodes.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id].kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Looks up an attribute by its lower-cased name.
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if the node is an element.
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Element { .. })
    }

    /// Returns all descendants of a node in document order, excluding the node.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[id].children {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Returns the XPath string-value of a node.
    ///
    /// Elements and the root concatenate all descendant text nodes in
    /// document order with no separator; tags are dropped.
    #[must_use]
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.nodes[id].kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => text.clone(),
            NodeKind::Root | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.push_text(id, &mut out);
                out
            }
        }
    }

    fn push_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id].children {
            match &self.nodes[child].kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element { .. } => self.push_text(child, out),
                NodeKind::Root | NodeKind::Comment(_) => {}
            }
        }
    }

    /// Copies a node and its descendants into a standalone document.
    ///
    /// The copied node becomes the only child of the new root, so absolute
    /// paths evaluated against the copy only see that subtree.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Self {
        let mut builder = DocumentBuilder::new();
        if id == self.root() {
            for &child in &self.nodes[id].children {
                self.copy_into(child, &mut builder);
            }
        } else {
            self.copy_into(id, &mut builder);
        }
        builder.finish()
    }

    fn copy_into(&self, id: NodeId, builder: &mut DocumentBuilder) {
        match &self.nodes[id].kind {
            NodeKind::Root => {}
            NodeKind::Element { name, attributes } => {
                builder.open_element(name.clone(), attributes.clone());
                for &child in &self.nodes[id].children {
                    self.copy_into(child, builder);
                }
                builder.close_current();
            }
            NodeKind::Text(text) => builder.text(text),
            NodeKind::Comment(text) => builder.comment(text),
        }
    }

    /// Serializes a node back to markup.
    #[must_use]
    pub fn to_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Root => {
                for &child in &self.nodes[id].children {
                    self.write_markup(child, out);
                }
            }
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                if self.nodes[id].children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &self.nodes[id].children {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A shared handle to one node of a document.
#[derive(Clone)]
pub struct NodeRef {
    doc: Arc<Document>,
    id: NodeId,
}

impl NodeRef {
    /// Creates a handle to a node.
    #[must_use]
    pub fn new(doc: Arc<Document>, id: NodeId) -> Self {
        Self { doc, id }
    }

    /// Creates a handle to the root of a document.
    #[must_use]
    pub fn root(doc: Arc<Document>) -> Self {
        let id = doc.root();
        Self { doc, id }
    }

    /// Returns the owning document.
    #[must_use]
    pub fn document(&self) -> &Arc<Document> {
        &self.doc
    }

    /// Returns the node id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the element name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.doc.name(self.id)
    }

    /// Flattens all descendant text in document order.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.doc.string_value(self.id)
    }

    /// Serializes the node to markup.
    #[must_use]
    pub fn to_markup(&self) -> String {
        self.doc.to_markup(self.id)
    }

    /// Copies the node into a standalone tree and returns the copy.
    ///
    /// The copy is the only child of the new root, so absolute paths
    /// evaluated against it cannot escape the original subtree.
    #[must_use]
    pub fn standalone(&self) -> Self {
        if self.id == self.doc.root() {
            return self.clone();
        }
        let copy = Arc::new(self.doc.subtree(self.id));
        let id = copy.children(copy.root()).first().copied().unwrap_or(0);
        Self::new(copy, id)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.id == other.id
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}
