//! XML parsing into markup documents.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Document, DocumentBuilder};
use crate::errors::MarkupError;

/// Parses XML into a [`Document`].
///
/// In lenient mode mismatched or stray end tags are tolerated, unclosed
/// elements are closed at end of input, and undecodable entities are kept
/// verbatim. Strict mode rejects all of these.
pub(crate) fn parse_xml(input: &str, lenient: bool) -> Result<Document, MarkupError> {
    let mut reader = Reader::from_str(input);
    {
        let config = reader.config_mut();
        config.check_end_names = !lenient;
        config.allow_unmatched_ends = lenient;
    }

    let mut builder = DocumentBuilder::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (name, attributes) = element_parts(&e, lenient)?;
                builder.open_element(name, attributes);
            }
            Ok(Event::Empty(e)) => {
                let (name, attributes) = element_parts(&e, lenient)?;
                builder.open_element(name, attributes);
                builder.close_current();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if !builder.close_element(&name) && !lenient {
                    return Err(MarkupError::Xml(format!("stray end tag </{name}>")));
                }
            }
            Ok(Event::Text(e)) => match e.unescape() {
                Ok(text) => builder.text(&text),
                Err(err) if lenient => {
                    tracing::debug!(error = %err, "Keeping undecodable XML text verbatim");
                    builder.text(&String::from_utf8_lossy(&e));
                }
                Err(err) => return Err(MarkupError::Xml(err.to_string())),
            },
            Ok(Event::CData(e)) => builder.text(&String::from_utf8_lossy(&e)),
            Ok(Event::Comment(e)) => builder.comment(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(MarkupError::Xml(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    err
                )));
            }
        }
        buf.clear();
    }

    if !lenient {
        if let Some(open) = builder.open_name() {
            return Err(MarkupError::Unclosed(open.to_string()));
        }
    }

    Ok(builder.finish())
}

fn element_parts(
    e: &BytesStart<'_>,
    lenient: bool,
) -> Result<(String, Vec<(String, String)>), MarkupError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut attributes = Vec::new();

    for attr in e.attributes().with_checks(!lenient) {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) if lenient => {
                tracing::debug!(element = %name, error = %err, "Skipping malformed attribute");
                continue;
            }
            Err(err) => return Err(MarkupError::Xml(err.to_string())),
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) if lenient => String::from_utf8_lossy(&attr.value).into_owned(),
            Err(err) => return Err(MarkupError::Xml(err.to_string())),
        };
        attributes.push((key, value));
    }

    Ok((name, attributes))
}
