//! Error types for the wrapcrawl engine.
//!
//! Errors follow the engine's failure classes: configuration errors raised
//! while loading a script, transient step errors raised during one script
//! execution, and the crawl faults that decide whether a query or a whole
//! wrapper stops.

use std::collections::HashMap;
use thiserror::Error;

/// The umbrella error type for wrapcrawl operations.
#[derive(Debug, Error)]
pub enum WrapcrawlError {
    /// A script or rule tree could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A network fetch failed.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// An XPath expression failed to compile or evaluate.
    #[error("{0}")]
    XPath(#[from] XPathError),

    /// A crawl fault escaped to the caller.
    #[error("{0}")]
    Fault(#[from] CrawlFault),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for WrapcrawlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised while loading a script or rule tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The XML source is not well formed.
    #[error("Malformed script XML: {0}")]
    Xml(String),

    /// The document has no `<script>` root element.
    #[error("Script document has no <script> root element")]
    MissingRoot,

    /// A rule tree element uses an unknown operator tag.
    #[error("Unknown operator <{tag}>")]
    UnknownOperator {
        /// The offending tag.
        tag: String,
    },

    /// A top-level script element uses an unknown command tag.
    #[error("Unknown command <{tag}>")]
    UnknownCommand {
        /// The offending tag.
        tag: String,
    },

    /// A required attribute is missing.
    #[error("Missing attribute '{attribute}' on <{tag}>")]
    MissingAttribute {
        /// The element tag.
        tag: String,
        /// The missing attribute.
        attribute: String,
    },

    /// An attribute value could not be interpreted.
    #[error("Invalid attribute '{attribute}' on <{tag}>: {reason}")]
    InvalidAttribute {
        /// The element tag.
        tag: String,
        /// The attribute name.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a missing attribute error.
    #[must_use]
    pub fn missing(tag: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            tag: tag.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an invalid attribute error.
    #[must_use]
    pub fn invalid(
        tag: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            tag: tag.into(),
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a markup tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// The input contained no markup at all.
    #[error("Empty markup input")]
    Empty,

    /// The XML parser rejected the input.
    #[error("Malformed XML {0}")]
    Xml(String),

    /// Strict parsing found elements that were never closed.
    #[error("Unclosed element <{0}> at end of input")]
    Unclosed(String),
}

/// Errors raised by the HTTP fetch primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request URL could not be parsed or resolved.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The raw URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The requested URL.
        url: String,
    },

    /// Connection, timeout or protocol failure.
    #[error("Transport error for {url}: {reason}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Underlying error message.
        reason: String,
    },

    /// The HTTP client could not be built from the configuration.
    #[error("Invalid fetch configuration: {0}")]
    Client(String),

    /// The body could not be decoded with the declared encoding.
    #[error("Failed to decode body from {url}: {reason}")]
    Decode {
        /// The requested URL.
        url: String,
        /// Underlying error message.
        reason: String,
    },
}

impl FetchError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation for diagnostics.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        match self {
            Self::InvalidUrl { url, reason } => {
                map.insert("type".to_string(), serde_json::json!("InvalidUrl"));
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Status { status, url } => {
                map.insert("type".to_string(), serde_json::json!("Status"));
                map.insert("status".to_string(), serde_json::json!(status));
                map.insert("url".to_string(), serde_json::json!(url));
            }
            Self::Transport { url, reason } => {
                map.insert("type".to_string(), serde_json::json!("Transport"));
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Client(reason) => {
                map.insert("type".to_string(), serde_json::json!("Client"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Decode { url, reason } => {
                map.insert("type".to_string(), serde_json::json!("Decode"));
                map.insert("url".to_string(), serde_json::json!(url));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors raised while compiling or evaluating an XPath expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    /// The expression is not valid XPath.
    #[error("XPath syntax error in '{expr}' at {position}: {message}")]
    Syntax {
        /// The source expression.
        expr: String,
        /// Byte offset of the error.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// The expression compiled but could not be evaluated.
    #[error("XPath evaluation error: {0}")]
    Eval(String),
}

/// Raised when a string context cannot be re-parsed as a tree.
///
/// This is the only interpreter error that escapes to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot re-parse context as a tree during <{operator}>: {reason}")]
pub struct ParseFault {
    /// The operator that needed a tree.
    pub operator: String,
    /// Why parsing failed.
    pub reason: String,
}

impl ParseFault {
    /// Creates a new parse fault.
    #[must_use]
    pub fn new(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            reason: reason.into(),
        }
    }
}

/// Raised when a value is narrowed to the wrong variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected a {expected} value but found {found}")]
pub struct ValueTypeError {
    /// The requested variant.
    pub expected: &'static str,
    /// The actual variant.
    pub found: &'static str,
}

/// A fault that ends a script execution or a whole wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlFault {
    /// The current query returns an empty result; the wrapper stays usable.
    #[error("Recoverable fault: {reason}")]
    Recoverable {
        /// Why the query was abandoned.
        reason: String,
    },

    /// The wrapper and its owning runtime must halt.
    #[error("Fatal fault: {reason}")]
    Fatal {
        /// Why the wrapper was halted.
        reason: String,
    },
}

impl CrawlFault {
    /// Creates a recoverable fault.
    #[must_use]
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable {
            reason: reason.into(),
        }
    }

    /// Creates a fatal fault.
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns true if the fault halts the wrapper.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Returns the fault reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Recoverable { reason } | Self::Fatal { reason } => reason,
        }
    }

    /// Promotes the fault to a fatal one, keeping the reason.
    #[must_use]
    pub fn escalate(self) -> Self {
        match self {
            Self::Recoverable { reason } => Self::Fatal { reason },
            fatal @ Self::Fatal { .. } => fatal,
        }
    }
}

/// Result type for operations that can end in a crawl fault.
pub type Outcome<T> = Result<T, CrawlFault>;
