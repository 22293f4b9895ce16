//! Script loading: the `<script>` XML document and its commands.

use std::path::Path;

use crate::errors::{ConfigError, WrapcrawlError};
use crate::markup::{CleanMode, Substitution};
use crate::net::Method;
use crate::rules::{Element, RuleNode};

/// A request parameter; `value` is a literal or a `$name` property reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Literal value or `$name`.
    pub value: String,
}

impl Param {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The `fetch` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCommand {
    /// First page on which the fetch runs.
    pub min_page: u32,
    /// Last page on which the fetch runs; unbounded when unset.
    pub max_page: Option<u32>,
    /// HTTP method.
    pub method: Method,
    /// URL literal or `$name`; the previous result is used when unset.
    pub url: Option<String>,
    /// Declared response encoding.
    pub encoding: Option<String>,
    /// Query string parameters.
    pub params: Vec<Param>,
    /// Form parameters, sent in the body for POST.
    pub forms: Vec<Param>,
}

impl Default for FetchCommand {
    fn default() -> Self {
        Self {
            min_page: 1,
            max_page: None,
            method: Method::Get,
            url: None,
            encoding: None,
            params: Vec::new(),
            forms: Vec::new(),
        }
    }
}

impl FetchCommand {
    /// Whether the fetch runs on `page`.
    #[must_use]
    pub fn runs_on(&self, page: u32) -> bool {
        self.min_page <= page && self.max_page.map_or(true, |max| page <= max)
    }

    fn from_element(element: &Element) -> Result<Self, ConfigError> {
        let mut command = Self {
            url: element.attribute("url").map(String::from),
            encoding: element.attribute("encoding").map(String::from),
            ..Self::default()
        };
        if let Some(raw) = element.attribute("minpage") {
            command.min_page = page_number(raw, "minpage")?;
        }
        if let Some(raw) = element.attribute("maxpage") {
            command.max_page = Some(page_number(raw, "maxpage")?);
        }
        if let Some(raw) = element.attribute("method") {
            command.method = Method::parse(raw)
                .ok_or_else(|| ConfigError::invalid("fetch", "method", format!("'{raw}'")))?;
        }

        for child in &element.children {
            let name = child
                .attribute("name")
                .ok_or_else(|| ConfigError::missing(&child.tag, "name"))?;
            let value = child.attribute("value").unwrap_or_default();
            let param = Param::new(name, value);
            match child.tag.as_str() {
                "param" => command.params.push(param),
                "form" => command.forms.push(param),
                other => {
                    return Err(ConfigError::UnknownCommand {
                        tag: format!("fetch/{other}"),
                    })
                }
            }
        }
        Ok(command)
    }
}

fn page_number(raw: &str, attribute: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid("fetch", attribute, format!("'{raw}' is not a page number")))
}

/// One step of a script.
#[derive(Debug, Clone)]
pub enum Command {
    /// Load a tree, or text to be cleaned, from a property.
    Document {
        /// Property name.
        name: String,
    },
    /// Read a local resource.
    Load {
        /// File path, literal or `$name`.
        file: String,
    },
    /// Enable the session cookie jar.
    UseCookies,
    /// Fetch a page.
    Fetch(FetchCommand),
    /// Clean the current text into a tree.
    Clean {
        /// Cleaning mode.
        mode: CleanMode,
        /// Substitutions applied before parsing.
        substitutions: Vec<Substitution>,
    },
    /// Dump the current tree.
    Structured,
    /// Evaluate rules against the current value.
    Parse {
        /// The parse element's children.
        rules: Vec<RuleNode>,
    },
    /// Persist the current value.
    Save,
}

impl Command {
    /// The command's tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Document { .. } => "document",
            Self::Load { .. } => "load",
            Self::UseCookies => "usecookies",
            Self::Fetch(_) => "fetch",
            Self::Clean { mode, .. } => match mode {
                CleanMode::Html => "clean",
                CleanMode::Xml => "cleanXML",
                CleanMode::Strict => "noclean",
                CleanMode::Original => "cleanOriginal",
            },
            Self::Structured => "structured",
            Self::Parse { .. } => "parse",
            Self::Save => "save",
        }
    }

    /// Whether the command replaces the current value.
    ///
    /// Only these commands can end an execution by producing `Null`.
    #[must_use]
    pub const fn produces_value(&self) -> bool {
        !matches!(self, Self::UseCookies | Self::Structured | Self::Save)
    }

    fn from_element(element: &Element) -> Result<Self, ConfigError> {
        if let Some(mode) = CleanMode::from_command(&element.tag) {
            let substitutions = element
                .children
                .iter()
                .map(substitution)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Clean {
                mode,
                substitutions,
            });
        }

        match element.tag.as_str() {
            "document" => Ok(Self::Document {
                name: required(element, "name")?,
            }),
            "load" => Ok(Self::Load {
                file: required(element, "file")?,
            }),
            "usecookies" => Ok(Self::UseCookies),
            "fetch" => FetchCommand::from_element(element).map(Self::Fetch),
            "structured" => Ok(Self::Structured),
            "parse" => {
                let rules = element
                    .children
                    .iter()
                    .map(RuleNode::from_element)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Parse { rules })
            }
            "save" => Ok(Self::Save),
            other => Err(ConfigError::UnknownCommand {
                tag: other.to_string(),
            }),
        }
    }
}

fn required(element: &Element, attribute: &str) -> Result<String, ConfigError> {
    element
        .attribute(attribute)
        .map(String::from)
        .ok_or_else(|| ConfigError::missing(&element.tag, attribute))
}

fn substitution(element: &Element) -> Result<Substitution, ConfigError> {
    if element.tag != "replace" {
        return Err(ConfigError::UnknownCommand {
            tag: format!("clean/{}", element.tag),
        });
    }
    let pattern = required(element, "pattern")?;
    let replacement = element.attribute("replacewith").unwrap_or_default();
    Substitution::new(&pattern, replacement)
        .map_err(|err| ConfigError::invalid("replace", "pattern", err.to_string()))
}

/// An ordered command sequence loaded once per wrapper.
#[derive(Debug, Clone, Default)]
pub struct Script {
    commands: Vec<Command>,
}

impl Script {
    /// Creates a script from commands.
    #[must_use]
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Parses a `<script>` document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for malformed XML, a missing `<script>` root,
    /// unknown commands or operators, and missing or invalid attributes.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let root = Element::parse(xml)?;
        if root.tag != "script" {
            return Err(ConfigError::MissingRoot);
        }
        let commands = root
            .children
            .iter()
            .map(Command::from_element)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { commands })
    }

    /// Reads and parses a script file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WrapcrawlError> {
        let xml = std::fs::read_to_string(path)?;
        Ok(Self::from_xml(&xml)?)
    }

    /// The commands in order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}
