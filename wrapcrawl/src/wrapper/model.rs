//! Normalized documents and result lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A bibliographic record in the engine's normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Title.
    pub title: Option<String>,
    /// Author names in order.
    pub authors: Vec<String>,
    /// Publication year.
    pub year: Option<i32>,
    /// Every other extracted field.
    pub fields: BTreeMap<String, String>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Adds an author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// Sets the year.
    #[must_use]
    pub const fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Sets a free field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Fills fields missing here from `other`; present values are kept.
    pub fn merge(&mut self, other: &Self) {
        if self.title.as_deref().map_or(true, |title| title.trim().is_empty()) {
            self.title.clone_from(&other.title);
        }
        if self.authors.is_empty() {
            self.authors.clone_from(&other.authors);
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        for (name, value) in &other.fields {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// A document with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedResult {
    /// The wrapper's source id.
    pub source_id: String,
    /// The document.
    pub document: Document,
    /// Token identifying the detail page, if any.
    pub detail_token: Option<String>,
    /// When details were fetched successfully.
    pub details_fetched_at: Option<DateTime<Utc>>,
}

impl WrappedResult {
    /// Wraps a document.
    #[must_use]
    pub fn new(source_id: impl Into<String>, document: Document) -> Self {
        Self {
            source_id: source_id.into(),
            document,
            detail_token: None,
            details_fetched_at: None,
        }
    }

    /// Sets the detail token.
    #[must_use]
    pub fn with_detail_token(mut self, token: Option<String>) -> Self {
        self.detail_token = token;
        self
    }

    /// Whether two results describe the same record of the same source.
    fn same_record(&self, other: &Self) -> bool {
        if self.source_id != other.source_id {
            return false;
        }
        match (&self.detail_token, &other.detail_token) {
            (Some(a), Some(b)) => a == b,
            _ => self.document == other.document,
        }
    }
}

/// An ordered, duplicate-free list of results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultList {
    items: Vec<WrappedResult>,
}

impl ResultList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result unless the list already holds the same record.
    /// Returns whether it was added.
    pub fn push(&mut self, result: WrappedResult) -> bool {
        if self.items.iter().any(|item| item.same_record(&result)) {
            return false;
        }
        self.items.push(result);
        true
    }

    /// Set-union with `other`, keeping this list's order first.
    pub fn merge(&mut self, other: Self) {
        for item in other.items {
            self.push(item);
        }
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The results in order.
    #[must_use]
    pub fn items(&self) -> &[WrappedResult] {
        &self.items
    }

    /// The results, mutably.
    pub fn items_mut(&mut self) -> &mut [WrappedResult] {
        &mut self.items
    }

    /// Iterates over the results.
    pub fn iter(&self) -> std::slice::Iter<'_, WrappedResult> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a ResultList {
    type Item = &'a WrappedResult;
    type IntoIter = std::slice::Iter<'a, WrappedResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
