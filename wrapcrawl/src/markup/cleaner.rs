//! The markup cleaner: text in, tolerant tree out.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::html::parse_html;
use super::xml::parse_xml;
use super::Document;
use crate::errors::MarkupError;

/// How the cleaner turns text into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanMode {
    /// Substitutions, then HTML tag-soup repair.
    #[default]
    Html,
    /// Substitutions, then lenient XML parsing.
    Xml,
    /// Substitutions, then strict XML parsing.
    Strict,
    /// HTML repair of the untouched input; substitutions are skipped.
    Original,
}

impl CleanMode {
    /// Maps a script command tag to a mode.
    #[must_use]
    pub fn from_command(tag: &str) -> Option<Self> {
        match tag {
            "clean" => Some(Self::Html),
            "cleanxml" => Some(Self::Xml),
            "noclean" => Some(Self::Strict),
            "cleanoriginal" => Some(Self::Original),
            _ => None,
        }
    }

    /// Returns true if the mode produces an XML tree.
    #[must_use]
    pub fn is_xml(self) -> bool {
        matches!(self, Self::Xml | Self::Strict)
    }
}

impl fmt::Display for CleanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => write!(f, "clean"),
            Self::Xml => write!(f, "cleanXML"),
            Self::Strict => write!(f, "noclean"),
            Self::Original => write!(f, "cleanOriginal"),
        }
    }
}

/// A text substitution applied before parsing, used to patch known-broken
/// markup idioms of a source.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: Regex,
    replacement: String,
}

impl Substitution {
    /// Compiles a substitution.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Applies the substitution to every match in `input`.
    #[must_use]
    pub fn apply(&self, input: &str) -> String {
        self.pattern
            .replace_all(input, self.replacement.as_str())
            .into_owned()
    }
}

/// Turns fetched text into a normalized tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cleaner;

impl Cleaner {
    /// Creates a cleaner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parses `input` in the given mode after applying `substitutions`.
    ///
    /// # Errors
    ///
    /// Returns `MarkupError::Empty` for blank input and XML errors from the
    /// strict or lenient XML modes.
    pub fn parse(
        &self,
        input: &str,
        mode: CleanMode,
        substitutions: &[Substitution],
    ) -> Result<Document, MarkupError> {
        if input.trim().is_empty() {
            return Err(MarkupError::Empty);
        }

        let patched = if mode == CleanMode::Original || substitutions.is_empty() {
            input.to_string()
        } else {
            substitutions
                .iter()
                .fold(input.to_string(), |text, sub| sub.apply(&text))
        };

        debug!(mode = %mode, bytes = patched.len(), "Cleaning markup");

        match mode {
            CleanMode::Html | CleanMode::Original => Ok(parse_html(&patched)),
            CleanMode::Xml => parse_xml(&patched, true),
            CleanMode::Strict => parse_xml(&patched, false),
        }
    }

    /// Like [`Cleaner::parse`] but logs failures and returns `None`.
    #[must_use]
    pub fn clean(
        &self,
        input: &str,
        mode: CleanMode,
        substitutions: &[Substitution],
    ) -> Option<Document> {
        match self.parse(input, mode, substitutions) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(mode = %mode, error = %err, "Markup could not be cleaned");
                None
            }
        }
    }
}
