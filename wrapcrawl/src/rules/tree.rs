//! Rule trees and the XML element loader shared with scripts.

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::ConfigError;

/// A generic XML element with lower-cased tag and attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Tag name.
    pub tag: String,
    /// Attributes.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in order; text content is ignored.
    pub children: Vec<Element>,
}

impl Element {
    /// Parses an XML document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Xml` for malformed input and
    /// `ConfigError::MissingRoot` when there is no element at all.
    pub fn parse(xml: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => stack.push(Self::from_start(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = Self::from_start(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(ConfigError::Xml(format!(
                        "at byte {}: {}",
                        reader.buffer_position(),
                        err
                    )))
                }
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(ConfigError::Xml(format!("unclosed element <{}>", open.tag)));
        }
        root.ok_or(ConfigError::MissingRoot)
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self, ConfigError> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
        let mut attributes = BTreeMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ConfigError::Xml(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = attr
                .unescape_value()
                .map_err(|err| ConfigError::Xml(err.to_string()))?
                .into_owned();
            attributes.insert(key, value);
        }
        Ok(Self {
            tag,
            attributes,
            children: Vec::new(),
        })
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// The extraction operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Identity passthrough.
    Context,
    /// Guard over nested `expect` checks.
    Verify,
    /// A single regex check inside `verify`.
    Expect,
    /// Builds a map from keyed children.
    Extract,
    /// Writes children into the property bag.
    Property,
    /// Maps the child over an XPath node-set.
    Iterate,
    /// Joins a list into a string.
    Collect,
    /// Flattens descendant text.
    Concat,
    /// XPath `string()` of an expression.
    Text,
    /// XPath string resolved to a URL.
    Url,
    /// Regex replace-all.
    Substitute,
    /// Tokenizes a string.
    Split,
    /// Keyed regex search.
    Find,
    /// Unkeyed regex search keeping the last match.
    FindOne,
}

impl Operator {
    /// Parses an operator tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "context" => Self::Context,
            "verify" => Self::Verify,
            "expect" => Self::Expect,
            "extract" => Self::Extract,
            "property" => Self::Property,
            "iterate" => Self::Iterate,
            "collect" => Self::Collect,
            "concat" => Self::Concat,
            "text" => Self::Text,
            "url" => Self::Url,
            "substitute" => Self::Substitute,
            "split" => Self::Split,
            "find" => Self::Find,
            "findone" => Self::FindOne,
            _ => return None,
        })
    }

    /// Returns the tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Verify => "verify",
            Self::Expect => "expect",
            Self::Extract => "extract",
            Self::Property => "property",
            Self::Iterate => "iterate",
            Self::Collect => "collect",
            Self::Concat => "concat",
            Self::Text => "text",
            Self::Url => "url",
            Self::Substitute => "substitute",
            Self::Split => "split",
            Self::Find => "find",
            Self::FindOne => "findone",
        }
    }

    /// Attributes that must be present at load time.
    const fn required_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Iterate | Self::Text | Self::Url => &["xpath"],
            Self::Substitute | Self::FindOne => &["pattern"],
            Self::Find => &["key", "pattern"],
            Self::Expect => &["regex"],
            _ => &[],
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of an immutable rule tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleNode {
    op: Operator,
    attributes: BTreeMap<String, String>,
    children: Vec<RuleNode>,
}

impl RuleNode {
    /// Creates a rule node without attributes or children.
    #[must_use]
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Appends a child.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Parses a rule tree from XML; the root element is the root rule.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for malformed XML, unknown operators and
    /// missing required attributes.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        Self::from_element(&Element::parse(xml)?)
    }

    /// Converts a loaded element into a rule node.
    ///
    /// # Errors
    ///
    /// See [`RuleNode::from_xml`].
    pub fn from_element(element: &Element) -> Result<Self, ConfigError> {
        let op = Operator::from_tag(&element.tag).ok_or_else(|| ConfigError::UnknownOperator {
            tag: element.tag.clone(),
        })?;

        for attribute in op.required_attributes() {
            if !element.attributes.contains_key(*attribute) {
                return Err(ConfigError::missing(op.as_str(), *attribute));
            }
        }

        let children = element
            .children
            .iter()
            .map(Self::from_element)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            op,
            attributes: element.attributes.clone(),
            children,
        })
    }

    /// Returns the operator.
    #[must_use]
    pub const fn operator(&self) -> Operator {
        self.op
    }

    /// Returns a raw attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Returns the children in order.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_nested_rules() {
        let rule = RuleNode::from_xml(
            r#"<iterate xpath="//tr">
                 <extract>
                   <text key="title" xpath="td[2]"/>
                   <url key="link" xpath="td/a/@href"/>
                 </extract>
               </iterate>"#,
        )
        .unwrap();

        assert_eq!(rule.operator(), Operator::Iterate);
        assert_eq!(rule.attribute("xpath"), Some("//tr"));
        let extract = &rule.children()[0];
        assert_eq!(extract.children().len(), 2);
        assert_eq!(extract.children()[1].attribute("key"), Some("link"));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = RuleNode::from_xml("<extract><scrape/></extract>").unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownOperator {
                tag: "scrape".to_string()
            }
        );
    }

    #[test]
    fn test_missing_required_attribute() {
        let err = RuleNode::from_xml(r#"<find pattern="x"/>"#).unwrap_err();
        assert_eq!(err, ConfigError::missing("find", "key"));
    }

    #[test]
    fn test_element_parse_errors() {
        assert_eq!(Element::parse("   ").unwrap_err(), ConfigError::MissingRoot);
        assert!(matches!(
            Element::parse("<a><b></a>").unwrap_err(),
            ConfigError::Xml(_)
        ));
        assert!(matches!(Element::parse("<a>").unwrap_err(), ConfigError::Xml(_)));
    }

    #[test]
    fn test_tags_lowercased() {
        let element = Element::parse(r#"<Script><cleanXML/></Script>"#).unwrap();
        assert_eq!(element.tag, "script");
        assert_eq!(element.children[0].tag, "cleanxml");
    }
}
