//! Values produced by the extraction interpreter.

use std::collections::BTreeMap;

use url::Url;

use crate::errors::ValueTypeError;
use crate::markup::NodeRef;

/// An extracted value.
///
/// `Null` means "no contribution" and is dropped from lists and maps.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A string.
    Scalar(String),
    /// An ordered list without `Null` members.
    List(Vec<Value>),
    /// Keyed values without `Null` members.
    Map(BTreeMap<String, Value>),
    /// A resolved absolute URL.
    Url(Url),
    /// A tree node.
    Node(NodeRef),
}

impl Value {
    /// Returns true for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the variant name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Url(_) => "url",
            Self::Node(_) => "node",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueTypeError {
        ValueTypeError {
            expected,
            found: self.type_name(),
        }
    }

    /// Narrows to a scalar.
    ///
    /// # Errors
    ///
    /// Returns `ValueTypeError` for other variants.
    pub fn as_scalar(&self) -> Result<&str, ValueTypeError> {
        match self {
            Self::Scalar(text) => Ok(text),
            other => Err(other.mismatch("scalar")),
        }
    }

    /// Narrows to a list.
    ///
    /// # Errors
    ///
    /// Returns `ValueTypeError` for other variants.
    pub fn as_list(&self) -> Result<&[Self], ValueTypeError> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(other.mismatch("list")),
        }
    }

    /// Narrows to a map.
    ///
    /// # Errors
    ///
    /// Returns `ValueTypeError` for other variants.
    pub fn as_map(&self) -> Result<&BTreeMap<String, Self>, ValueTypeError> {
        match self {
            Self::Map(map) => Ok(map),
            other => Err(other.mismatch("map")),
        }
    }

    /// Narrows to a URL.
    ///
    /// # Errors
    ///
    /// Returns `ValueTypeError` for other variants.
    pub fn as_url(&self) -> Result<&Url, ValueTypeError> {
        match self {
            Self::Url(url) => Ok(url),
            other => Err(other.mismatch("url")),
        }
    }

    /// Narrows to a node.
    ///
    /// # Errors
    ///
    /// Returns `ValueTypeError` for other variants.
    pub fn as_node(&self) -> Result<&NodeRef, ValueTypeError> {
        match self {
            Self::Node(node) => Ok(node),
            other => Err(other.mismatch("node")),
        }
    }

    /// Returns the textual form of string-like values.
    ///
    /// Scalars and URLs give their text, nodes their flattened content.
    /// Lists, maps and `Null` give `None`.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Scalar(text) => Some(text.clone()),
            Self::Url(url) => Some(url.to_string()),
            Self::Node(node) => Some(node.text_content()),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Returns the map entry for `key`, if this is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Converts to JSON for diagnostics; nodes are serialized as markup.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Scalar(text) => serde_json::Value::String(text.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Self::Url(url) => serde_json::Value::String(url.to_string()),
            Self::Node(node) => serde_json::Value::String(node.to_markup()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Scalar(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Scalar(text)
    }
}

impl From<Url> for Value {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items.into_iter().filter(|item| !item.is_null()).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map.into_iter().filter(|(_, value)| !value.is_null()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrowing_accessors() {
        let value = Value::from("abc");
        assert_eq!(value.as_scalar().unwrap(), "abc");

        let err = value.as_list().unwrap_err();
        assert_eq!(err.expected, "list");
        assert_eq!(err.found, "scalar");

        assert!(Value::Null.as_map().is_err());
    }

    #[test]
    fn test_collections_drop_null() {
        let list = Value::from(vec![Value::from("a"), Value::Null, Value::from("b")]);
        assert_eq!(list.as_list().unwrap().len(), 2);

        let mut map = BTreeMap::new();
        map.insert("title".to_string(), Value::from("T"));
        map.insert("year".to_string(), Value::Null);
        let map = Value::from(map);
        assert_eq!(map.as_map().unwrap().len(), 1);
        assert_eq!(map.get("title"), Some(&Value::from("T")));
    }

    #[test]
    fn test_to_json() {
        let mut map = BTreeMap::new();
        map.insert("authors".to_string(), Value::from(vec![Value::from("A")]));
        map.insert(
            "link".to_string(),
            Value::Url(Url::parse("http://example.org/a").unwrap()),
        );

        assert_eq!(
            Value::Map(map).to_json(),
            serde_json::json!({"authors": ["A"], "link": "http://example.org/a"})
        );
    }

    #[test]
    fn test_as_text() {
        let url = Value::Url(Url::parse("http://example.org/x?y=1").unwrap());
        assert_eq!(url.as_text().as_deref(), Some("http://example.org/x?y=1"));
        assert_eq!(Value::Null.as_text(), None);
    }
}
