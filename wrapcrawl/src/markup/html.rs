//! Tag-soup repair through html5ever.

use scraper::{ElementRef, Html, Node};

use super::{Document, DocumentBuilder};

/// Parses HTML with browser error recovery and converts it to a [`Document`].
///
/// Unclosed tags, stray end tags and invalid entities are repaired the way a
/// browser would; the result always has `html`, `head` and `body` elements.
pub(crate) fn parse_html(input: &str) -> Document {
    let html = Html::parse_document(input);
    let mut builder = DocumentBuilder::new();
    append_element(&mut builder, html.root_element());
    builder.finish()
}

fn append_element(builder: &mut DocumentBuilder, element: ElementRef<'_>) {
    let value = element.value();
    let attributes = value
        .attrs()
        .map(|(key, val)| (key.to_string(), val.to_string()))
        .collect();
    builder.open_element(value.name(), attributes);

    for child in element.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    append_element(builder, child_element);
                }
            }
            Node::Text(text) => builder.text(&text.text),
            Node::Comment(comment) => builder.comment(&comment.comment),
            _ => {}
        }
    }

    builder.close_current();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repairs_unclosed_tags() {
        let doc = parse_html("<TABLE><tr><TD>one<td>two</table>");
        let names: Vec<&str> = doc
            .descendants(doc.root())
            .into_iter()
            .filter_map(|id| doc.name(id))
            .collect();

        assert!(names.contains(&"tbody"));
        assert_eq!(names.iter().filter(|n| **n == "td").count(), 2);
    }

    #[test]
    fn test_decodes_entities() {
        let doc = parse_html("<p>Fish &amp; Chips&nbsp;&bogus;</p>");
        let text = doc.string_value(doc.root());
        assert!(text.starts_with("Fish & Chips\u{a0}"));
        assert!(text.contains("&bogus;"));
    }
}
