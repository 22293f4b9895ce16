//! # Wrapcrawl
//!
//! A declarative wrapper engine for federated digital-library search.
//!
//! Wrapcrawl turns heterogeneous search pages into uniform bibliographic
//! records with support for:
//!
//! - **Markup cleaning**: Tag-soup HTML and XML parsed into an owned tree
//! - **XPath evaluation**: A compact XPath 1.0 engine over that tree
//! - **Extraction rules**: Declarative rule trees evaluated against pages
//! - **Scripts**: Fetch, clean and parse steps with retries and an error ceiling
//! - **Wrappers**: Paged and two-step crawl loops with a two-tier fault policy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wrapcrawl::prelude::*;
//!
//! let fetcher = Arc::new(ReqwestFetcher::new(&FetchConfig::default())?);
//! let orchestrator = Orchestrator::new(EngineConfig::default(), fetcher);
//! let listing = Script::from_file("scripts/dblp.xml")?;
//!
//! let config = WrapperConfig::new("dblp", "https://dblp.example.org/search");
//! let mut wrapper = Wrapper::new(config, orchestrator, listing);
//! let results = wrapper.ask_document(&Query::term("stream joins"), true).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod markup;
pub mod net;
pub mod observability;
pub mod rules;
pub mod script;
pub mod testing;
pub mod wrapper;
pub mod xpath;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::HaltToken;
    pub use crate::config::{
        CrawlMode, EngineConfig, FetchConfig, WrapperConfig, WrapperKind, YearRange,
    };
    pub use crate::errors::{CrawlFault, FetchError, Outcome, WrapcrawlError};
    pub use crate::markup::{CleanMode, Cleaner, NodeRef};
    pub use crate::net::{FetchRequest, FetchResponse, Fetcher, ReqwestFetcher, RetryConfig};
    pub use crate::observability::init_tracing;
    pub use crate::rules::{Context, Interpreter, PropertyBag, RuleNode, Value};
    pub use crate::script::{Orchestrator, Script, Session};
    pub use crate::wrapper::{Document, Query, ResultList, WrappedResult, Wrapper};
    pub use crate::xpath::XPath;
}
