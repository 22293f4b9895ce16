//! XPath 1.0 subset over markup documents.
//!
//! This module provides:
//! - [`XPath`], a compiled expression that can be evaluated many times
//! - [`XValue`], the four XPath result types
//! - [`XNode`], a node-set member (tree node or attribute)
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wrapcrawl::markup::{CleanMode, Cleaner, NodeRef};
//! use wrapcrawl::xpath::XPath;
//!
//! let doc = Cleaner::new()
//!     .parse("<ul><li>a</li><li>b</li></ul>", CleanMode::Html, &[])
//!     .unwrap();
//! let root = NodeRef::root(Arc::new(doc));
//!
//! let xpath = XPath::compile("//li[last()]").unwrap();
//! assert_eq!(xpath.evaluate_string(&root).unwrap(), "b");
//! ```

mod eval;
mod lexer;
mod parser;

use std::fmt;

use eval::Evaluator;
use parser::Expr;

use crate::errors::XPathError;
use crate::markup::{Document, NodeId, NodeRef};

/// A member of a node-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    /// A tree node (root, element, text or comment).
    Node(NodeId),
    /// The attribute at an index of an element.
    Attr(NodeId, usize),
}

impl XNode {
    /// Sort key in document order: attributes follow their element and
    /// precede its children.
    fn order_key(self) -> (NodeId, usize) {
        match self {
            Self::Node(id) => (id, 0),
            Self::Attr(id, index) => (id, index + 1),
        }
    }
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum XValue {
    /// Nodes in document order without duplicates.
    Nodes(Vec<XNode>),
    /// A string.
    Str(String),
    /// A number.
    Num(f64),
    /// A boolean.
    Bool(bool),
}

impl XValue {
    /// Converts with the XPath `string()` rules.
    #[must_use]
    pub fn to_xpath_string(&self, doc: &Document) -> String {
        Evaluator::new(doc).string(self)
    }

    /// Converts with the XPath `number()` rules.
    #[must_use]
    pub fn to_xpath_number(&self, doc: &Document) -> f64 {
        Evaluator::new(doc).number(self)
    }

    /// Converts with the XPath `boolean()` rules.
    #[must_use]
    pub fn to_xpath_boolean(&self) -> bool {
        eval::to_boolean(self)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Nodes(_) => "node-set",
            Self::Str(_) => "string",
            Self::Num(_) => "number",
            Self::Bool(_) => "boolean",
        }
    }
}

/// A compiled XPath expression.
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns `XPathError::Syntax` for malformed expressions and unknown
    /// functions or axes.
    pub fn compile(source: &str) -> Result<Self, XPathError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Returns the source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression with `context` as the context node.
    ///
    /// # Errors
    ///
    /// Returns `XPathError::Eval` on type errors and wrong arities.
    pub fn evaluate(&self, context: &NodeRef) -> Result<XValue, XPathError> {
        Evaluator::new(context.document()).evaluate(&self.expr, XNode::Node(context.id()))
    }

    /// Evaluates and converts the result with `string()`.
    ///
    /// # Errors
    ///
    /// See [`XPath::evaluate`].
    pub fn evaluate_string(&self, context: &NodeRef) -> Result<String, XPathError> {
        let value = self.evaluate(context)?;
        Ok(value.to_xpath_string(context.document()))
    }

    /// Evaluates a node-set and returns its tree nodes in document order.
    ///
    /// Attribute members are skipped since they cannot be tree contexts.
    ///
    /// # Errors
    ///
    /// Returns `XPathError::Eval` if the result is not a node-set.
    pub fn select(&self, context: &NodeRef) -> Result<Vec<NodeRef>, XPathError> {
        match self.evaluate(context)? {
            XValue::Nodes(nodes) => Ok(nodes
                .into_iter()
                .filter_map(|node| match node {
                    XNode::Node(id) => Some(NodeRef::new(context.document().clone(), id)),
                    XNode::Attr(..) => None,
                })
                .collect()),
            other => Err(XPathError::Eval(format!(
                "'{}' does not select nodes (got {})",
                self.source,
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
