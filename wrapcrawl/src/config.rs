//! Engine and wrapper configuration.
//!
//! All structs deserialize from JSON with defaults for every field, so a
//! partial document such as `{"max_errors": 5}` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::WrapcrawlError;
use crate::net::RetryConfig;

/// Upstream HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host name.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxyConfig {
    /// Creates a proxy config.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The proxy URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Configuration for HTTP fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Optional upstream proxy.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    format!("wrapcrawl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            proxy: None,
            headers: HashMap::new(),
        }
    }
}

impl FetchConfig {
    /// Creates a new fetch configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}

/// Configuration shared by every script execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HTTP settings.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Delay between failed fetch attempts.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Step errors tolerated per execution; one more raises a recoverable fault.
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    /// Directory for per-request diagnostics; disabled when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Base directory for `load` commands.
    #[serde(default)]
    pub resource_dir: Option<PathBuf>,
}

fn default_max_errors() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            max_errors: default_max_errors(),
            log_dir: None,
            resource_dir: None,
        }
    }
}

impl EngineConfig {
    /// Creates a new engine configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, WrapcrawlError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the fetch configuration.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the error ceiling.
    #[must_use]
    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Sets the diagnostics directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Sets the resource directory.
    #[must_use]
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = Some(dir.into());
        self
    }
}

/// How a query is split into script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// One pass for the entire query.
    #[default]
    WholeQuery,
    /// One pass per conjunction of the query's disjunctive normal form.
    Conjunctions,
}

/// Shape of a wrapper's crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    /// Listing pages carry the records.
    #[default]
    Paged,
    /// Listing pages carry detail tokens; an export script returns the records.
    TwoStep,
}

/// Inclusive publication year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    /// First year.
    pub from: i32,
    /// Last year.
    pub to: i32,
}

impl YearRange {
    /// Creates a year range.
    #[must_use]
    pub const fn new(from: i32, to: i32) -> Self {
        Self { from, to }
    }

    /// Whether `year` lies in the range.
    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        self.from <= year && year <= self.to
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Per-source wrapper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperConfig {
    /// Identifier recorded as result provenance.
    pub source_id: String,
    /// Entry URL, stored in the `url` property for the first page.
    pub start_url: String,
    /// Query splitting mode.
    #[serde(default)]
    pub mode: CrawlMode,
    /// Crawl shape.
    #[serde(default)]
    pub kind: WrapperKind,
    /// Maximum listing pages per query.
    #[serde(default = "default_max_fetch_pages")]
    pub max_fetch_pages: u32,
    /// Maximum conjunctions processed in conjunction mode.
    #[serde(default = "default_max_conjunctions")]
    pub max_conjunctions: usize,
    /// Consecutive recoverable faults tolerated before the wrapper halts.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Optional cap on collected results per query.
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Optional publication year filter, also passed to scripts.
    #[serde(default)]
    pub year_range: Option<YearRange>,
    /// Detail URL template with a `{token}` placeholder.
    #[serde(default)]
    pub detail_url_template: Option<String>,
    /// Keep the query's cookie jar for detail fetches.
    #[serde(default = "default_true")]
    pub reuse_cookies: bool,
}

fn default_max_fetch_pages() -> u32 {
    5
}

fn default_max_conjunctions() -> usize {
    8
}

fn default_max_failures() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl WrapperConfig {
    /// Creates a wrapper configuration with defaults.
    #[must_use]
    pub fn new(source_id: impl Into<String>, start_url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            start_url: start_url.into(),
            mode: CrawlMode::default(),
            kind: WrapperKind::default(),
            max_fetch_pages: default_max_fetch_pages(),
            max_conjunctions: default_max_conjunctions(),
            max_failures: default_max_failures(),
            max_results: None,
            year_range: None,
            detail_url_template: None,
            reuse_cookies: true,
        }
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, WrapcrawlError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the crawl mode.
    #[must_use]
    pub fn with_mode(mut self, mode: CrawlMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the crawl shape.
    #[must_use]
    pub fn with_kind(mut self, kind: WrapperKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the page limit.
    #[must_use]
    pub fn with_max_fetch_pages(mut self, pages: u32) -> Self {
        self.max_fetch_pages = pages;
        self
    }

    /// Sets the conjunction limit.
    #[must_use]
    pub fn with_max_conjunctions(mut self, count: usize) -> Self {
        self.max_conjunctions = count;
        self
    }

    /// Sets the consecutive failure ceiling.
    #[must_use]
    pub fn with_max_failures(mut self, failures: u32) -> Self {
        self.max_failures = failures;
        self
    }

    /// Sets the result cap.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Sets the year range.
    #[must_use]
    pub fn with_year_range(mut self, range: YearRange) -> Self {
        self.year_range = Some(range);
        self
    }

    /// Sets the detail URL template.
    #[must_use]
    pub fn with_detail_url_template(mut self, template: impl Into<String>) -> Self {
        self.detail_url_template = Some(template.into());
        self
    }

    /// Sets cookie reuse for detail fetches.
    #[must_use]
    pub fn with_reuse_cookies(mut self, reuse: bool) -> Self {
        self.reuse_cookies = reuse;
        self
    }
}
