//! Pluggable collaborators of a wrapper and their reference implementations.

use std::collections::BTreeMap;

use dashmap::DashMap;
use md5::{Digest, Md5};
use tracing::debug;

use super::{Document, Query, ResultList};
use crate::config::YearRange;
use crate::rules::Value;

/// Cache key of a query: the MD5 hex digest of its canonical text.
#[must_use]
pub fn cache_key(query: &Query) -> String {
    hex::encode(Md5::digest(query.to_string().as_bytes()))
}

/// Result cache keyed by [`cache_key`].
#[cfg_attr(test, mockall::automock)]
pub trait Cache: Send + Sync {
    /// Returns cached results.
    fn get(&self, key: &str) -> Option<ResultList>;
    /// Stores results.
    fn put(&self, key: &str, results: ResultList);
    /// Drops every entry.
    fn flush(&self);
}

/// An in-process cache.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, ResultList>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<ResultList> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: &str, results: ResultList) {
        self.entries.insert(key.to_string(), results);
    }

    fn flush(&self) {
        self.entries.clear();
    }
}

/// Final acceptance test for a valid document.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentFilter: Send + Sync {
    /// Returns true to keep the document.
    fn check(&self, document: &Document) -> bool;
}

/// Keeps every document.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DocumentFilter for AcceptAll {
    fn check(&self, _document: &Document) -> bool {
        true
    }
}

/// Keeps documents published within a year range.
#[derive(Debug, Clone, Copy)]
pub struct YearRangeFilter {
    range: YearRange,
}

impl YearRangeFilter {
    /// Creates a filter.
    #[must_use]
    pub const fn new(range: YearRange) -> Self {
        Self { range }
    }
}

impl DocumentFilter for YearRangeFilter {
    fn check(&self, document: &Document) -> bool {
        document.year.is_some_and(|year| self.range.contains(year))
    }
}

/// Renders a query in a source's search syntax.
pub trait QueryConverter: Send + Sync {
    /// Converts the query.
    fn convert(&self, query: &Query) -> String;
}

/// Space-separated terms, `OR` between alternatives, `-` before negations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainQueryConverter;

impl QueryConverter for PlainQueryConverter {
    fn convert(&self, query: &Query) -> String {
        match query {
            Query::Term(text) if text.contains(char::is_whitespace) => format!("\"{text}\""),
            Query::Term(text) => text.clone(),
            Query::And(operands) => join(self, operands, " "),
            Query::Or(operands) => format!("({})", join(self, operands, " OR ")),
            Query::Not(operand) => format!("-{}", self.convert(operand)),
        }
    }
}

fn join(converter: &PlainQueryConverter, operands: &[Query], separator: &str) -> String {
    operands
        .iter()
        .map(|operand| converter.convert(operand))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Turns one extracted record into a document.
pub trait DocumentMapper: Send + Sync {
    /// Maps the record.
    fn map(&self, record: &BTreeMap<String, Value>) -> Document;
}

/// Maps `title`, `authors`/`author` and `year`; every other key becomes a
/// free field. The control keys `nextpage` and `details` are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMapper;

impl FieldMapper {
    fn authors(value: &Value) -> Vec<String> {
        match value {
            Value::List(items) => items.iter().flat_map(Self::authors).collect(),
            other => other
                .as_text()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .into_iter()
                .collect(),
        }
    }

    /// The first run of four digits, so `"(c) 2004, ACM"` gives 2004.
    fn year(text: &str) -> Option<i32> {
        let bytes = text.as_bytes();
        bytes
            .windows(4)
            .enumerate()
            .find(|(i, window)| {
                window.iter().all(u8::is_ascii_digit)
                    && !bytes.get(i + 4).is_some_and(u8::is_ascii_digit)
                    && !(*i > 0 && bytes[i - 1].is_ascii_digit())
            })
            .and_then(|(i, _)| text[i..i + 4].parse().ok())
    }
}

impl DocumentMapper for FieldMapper {
    fn map(&self, record: &BTreeMap<String, Value>) -> Document {
        let mut document = Document::new();
        for (key, value) in record {
            match key.as_str() {
                "title" => {
                    document.title = value
                        .as_text()
                        .map(|title| title.trim().to_string())
                        .filter(|title| !title.is_empty());
                }
                "authors" | "author" => document.authors.extend(Self::authors(value)),
                "year" => document.year = value.as_text().as_deref().and_then(Self::year),
                "nextpage" | "details" => {}
                _ => match value {
                    Value::List(items) => {
                        let joined: Vec<String> =
                            items.iter().filter_map(Value::as_text).collect();
                        document.fields.insert(key.clone(), joined.join("; "));
                    }
                    other => {
                        if let Some(text) = other.as_text() {
                            document.fields.insert(key.clone(), text);
                        } else {
                            debug!(field = %key, kind = other.type_name(), "Unmapped field");
                        }
                    }
                },
            }
        }
        document
    }
}

/// The runtime that owns a wrapper; told to stop when the wrapper halts.
#[cfg_attr(test, mockall::automock)]
pub trait HostRuntime: Send + Sync {
    /// Stops the owning runtime.
    fn halt(&self, reason: &str);
}

/// A host that ignores halt requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHost;

impl HostRuntime for NoOpHost {
    fn halt(&self, _reason: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cache_key_is_md5_of_canonical_text() {
        let query = Query::and([Query::term("a"), Query::term("b")]);
        assert_eq!(cache_key(&query), hex::encode(Md5::digest(b"(a AND b)")));
        assert_eq!(cache_key(&query).len(), 32);
        assert_ne!(cache_key(&query), cache_key(&Query::term("a")));
    }

    #[test]
    fn test_in_memory_cache() {
        let cache = InMemoryCache::new();
        assert!(cache.get("k").is_none());

        cache.put("k", ResultList::new());
        assert!(cache.get("k").is_some());
        assert_eq!(cache.len(), 1);

        cache.flush();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_year_range_filter() {
        let filter = YearRangeFilter::new(YearRange::new(2000, 2005));
        assert!(filter.check(&Document::new().with_year(2003)));
        assert!(!filter.check(&Document::new().with_year(1999)));
        assert!(!filter.check(&Document::new()));
        assert!(AcceptAll.check(&Document::new()));
    }

    #[test]
    fn test_plain_query_converter() {
        let query = Query::and([
            Query::term("graph mining"),
            Query::or([Query::term("kdd"), Query::term("icdm")]),
            Query::negate(Query::term("survey")),
        ]);
        assert_eq!(
            PlainQueryConverter.convert(&query),
            "\"graph mining\" (kdd OR icdm) -survey"
        );
    }

    #[test]
    fn test_field_mapper() {
        let record: BTreeMap<String, Value> = [
            ("title".to_string(), Value::from(" Graph Mining ")),
            (
                "authors".to_string(),
                Value::List(vec![Value::from("Ada"), Value::from(" Bob")]),
            ),
            ("year".to_string(), Value::from("(c) 2004, ACM")),
            ("venue".to_string(), Value::from("KDD")),
            (
                "keywords".to_string(),
                Value::List(vec![Value::from("graphs"), Value::from("mining")]),
            ),
            ("details".to_string(), Value::from("t1")),
        ]
        .into_iter()
        .collect();

        let document = FieldMapper.map(&record);
        assert_eq!(document.title.as_deref(), Some("Graph Mining"));
        assert_eq!(document.authors, vec!["Ada".to_string(), "Bob".to_string()]);
        assert_eq!(document.year, Some(2004));
        assert_eq!(document.fields.get("venue").map(String::as_str), Some("KDD"));
        assert_eq!(
            document.fields.get("keywords").map(String::as_str),
            Some("graphs; mining")
        );
        assert!(!document.fields.contains_key("details"));
    }

    #[test]
    fn test_year_parsing() {
        assert_eq!(FieldMapper::year("2004"), Some(2004));
        assert_eq!(FieldMapper::year("vol 12345, 1999"), Some(1999));
        assert_eq!(FieldMapper::year("n/a"), None);
    }
}
