//! Declarative extraction rules.
//!
//! A rule tree is loaded once from XML and evaluated by the [`Interpreter`]
//! against a node or string [`Context`], producing a [`Value`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wrapcrawl::markup::{CleanMode, Cleaner, NodeRef};
//! use wrapcrawl::rules::{Context, Interpreter, PropertyBag, RuleNode, Value};
//!
//! let rule = RuleNode::from_xml(
//!     r#"<iterate xpath="//li"><concat/></iterate>"#,
//! ).unwrap();
//! let doc = Cleaner::new()
//!     .parse("<ul><li>a</li><li> b </li></ul>", CleanMode::Html, &[])
//!     .unwrap();
//!
//! let mut bag = PropertyBag::new();
//! let context = Context::Node(NodeRef::root(Arc::new(doc)));
//! let value = Interpreter::new(&mut bag).evaluate(&context, &rule).unwrap();
//! assert_eq!(value, Value::List(vec![Value::from("a"), Value::from("b")]));
//! ```

mod bag;
mod interpreter;
mod tree;
mod value;

pub use bag::PropertyBag;
pub use interpreter::{Context, Interpreter};
pub use tree::{Element, Operator, RuleNode};
pub use value::Value;

#[cfg(test)]
mod interpreter_tests;
