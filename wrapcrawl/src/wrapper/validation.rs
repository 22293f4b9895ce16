//! Minimal completeness checks for mapped documents.

use thiserror::Error;

use super::Document;

/// Why a candidate document was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    /// The document has no author.
    #[error("document has no author")]
    NoAuthors,
    /// The title is missing or blank.
    #[error("document has an empty title")]
    EmptyTitle,
    /// The publication year is not set.
    #[error("document has no publication year")]
    NoYear,
}

/// Accepts documents with at least one author, a non-empty title and a
/// publication year.
///
/// # Errors
///
/// Returns the first failed check.
pub fn validate(document: &Document) -> Result<(), ValidationIssue> {
    if !document.authors.iter().any(|author| !author.trim().is_empty()) {
        return Err(ValidationIssue::NoAuthors);
    }
    if document
        .title
        .as_deref()
        .map_or(true, |title| title.trim().is_empty())
    {
        return Err(ValidationIssue::EmptyTitle);
    }
    if document.year.is_none() {
        return Err(ValidationIssue::NoYear);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Document {
        Document::new()
            .with_title("Stream Joins")
            .with_author("Cy")
            .with_year(1999)
    }

    #[test]
    fn test_complete_document_passes() {
        assert_eq!(validate(&complete()), Ok(()));
    }

    #[test]
    fn test_incomplete_documents_are_rejected() {
        let mut no_authors = complete();
        no_authors.authors.clear();
        assert_eq!(validate(&no_authors), Err(ValidationIssue::NoAuthors));

        let mut blank_author = complete();
        blank_author.authors = vec!["  ".to_string()];
        assert_eq!(validate(&blank_author), Err(ValidationIssue::NoAuthors));

        let mut empty_title = complete();
        empty_title.title = Some(" ".to_string());
        assert_eq!(validate(&empty_title), Err(ValidationIssue::EmptyTitle));

        let mut no_year = complete();
        no_year.year = None;
        assert_eq!(validate(&no_year), Err(ValidationIssue::NoYear));
    }
}
