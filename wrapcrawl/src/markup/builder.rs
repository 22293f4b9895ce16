//! Incremental construction of markup documents.

use super::{Document, NodeData, NodeId, NodeKind};

/// Builds a [`Document`] from a stream of open/close/text events.
///
/// Nodes are appended in event order, which keeps ids in document order.
/// Adjacent text runs are merged into one text node.
#[derive(Debug)]
pub struct DocumentBuilder {
    doc: Document,
    stack: Vec<NodeId>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    /// Creates a builder positioned at the root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            doc: Document::new(),
            stack: vec![0],
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(0)
    }

    fn append(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.current();
        let id = self.doc.nodes.len();
        self.doc.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.doc.nodes[parent].children.push(id);
        id
    }

    /// Opens an element; names are lower-cased.
    pub fn open_element(&mut self, name: impl Into<String>, attributes: Vec<(String, String)>) {
        let name = name.into().to_ascii_lowercase();
        let attributes = attributes
            .into_iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .collect();
        let id = self.append(NodeKind::Element { name, attributes });
        self.stack.push(id);
    }

    /// Closes the innermost open element.
    pub fn close_current(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Closes the innermost open element named `name` and everything inside it.
    ///
    /// Returns false when no such element is open; the stack is left as is.
    pub fn close_element(&mut self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        let position = self
            .stack
            .iter()
            .rposition(|&id| self.doc.name(id) == Some(name.as_str()));
        match position {
            Some(index) if index > 0 => {
                self.stack.truncate(index);
                true
            }
            _ => false,
        }
    }

    /// Returns the name of the innermost open element.
    #[must_use]
    pub fn open_name(&self) -> Option<&str> {
        self.doc.name(self.current())
    }

    /// Appends character data, merging with a preceding text node.
    pub fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        if let Some(&last) = self.doc.nodes[parent].children.last() {
            if let NodeKind::Text(existing) = &mut self.doc.nodes[last].kind {
                existing.push_str(text);
                return;
            }
        }
        self.append(NodeKind::Text(text.to_string()));
    }

    /// Appends a comment.
    pub fn comment(&mut self, text: &str) {
        self.append(NodeKind::Comment(text.to_string()));
    }

    /// Finishes the document, implicitly closing open elements.
    #[must_use]
    pub fn finish(self) -> Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_element_pops_to_match() {
        let mut builder = DocumentBuilder::new();
        builder.open_element("table", Vec::new());
        builder.open_element("tr", Vec::new());
        builder.open_element("td", Vec::new());
        assert!(builder.close_element("TR"));
        assert_eq!(builder.open_name(), Some("table"));
        assert!(!builder.close_element("div"));
        assert_eq!(builder.open_name(), Some("table"));
    }

    #[test]
    fn test_adjacent_text_merged() {
        let mut builder = DocumentBuilder::new();
        builder.open_element("p", Vec::new());
        builder.text("a");
        builder.text("b");
        builder.close_current();
        let doc = builder.finish();

        let p = doc.children(doc.root())[0];
        assert_eq!(doc.children(p).len(), 1);
        assert_eq!(doc.string_value(p), "ab");
    }

    #[test]
    fn test_names_lowercased() {
        let mut builder = DocumentBuilder::new();
        builder.open_element("DIV", vec![("CLASS".to_string(), "Hit".to_string())]);
        let doc = builder.finish();

        let div = doc.children(doc.root())[0];
        assert_eq!(doc.name(div), Some("div"));
        assert_eq!(doc.attribute(div, "class"), Some("Hit"));
    }
}
