//! The wrapper crawl loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use super::collaborators::{
    cache_key, AcceptAll, Cache, DocumentFilter, DocumentMapper, FieldMapper, HostRuntime,
    InMemoryCache, NoOpHost, PlainQueryConverter, QueryConverter, YearRangeFilter,
};
use super::validation::validate;
use super::{Query, ResultList, WrappedResult};
use crate::cancellation::HaltToken;
use crate::config::{CrawlMode, WrapperConfig, WrapperKind};
use crate::errors::{CrawlFault, Outcome};
use crate::rules::Value;
use crate::script::{Orchestrator, Script, Session};

/// Property keys shared between the wrapper and its scripts.
pub mod keys {
    /// URL of the page to fetch.
    pub const URL: &str = "url";
    /// The converted query.
    pub const QUERY: &str = "query";
    /// The configured result cap.
    pub const MAX_RESULTS: &str = "maxResults";
    /// The configured year range as `from-to`.
    pub const YEAR_RANGE: &str = "yearRange";
    /// Next listing page, extracted by the listing script.
    pub const NEXT_PAGE: &str = "nextpage";
    /// Detail token of a record.
    pub const DETAILS: &str = "details";
    /// Harvested detail tokens passed to the export script.
    pub const IDS: &str = "ids";
}

/// A per-source adapter that turns a query into normalized results.
///
/// Faults are classified in two tiers: a recoverable fault abandons the
/// current query, while exceeding `max_failures` consecutive faults halts
/// the wrapper and its host for good.
pub struct Wrapper {
    config: WrapperConfig,
    orchestrator: Orchestrator,
    listing: Arc<Script>,
    export: Option<Arc<Script>>,
    detail: Option<Arc<Script>>,
    cache: Arc<dyn Cache>,
    filter: Arc<dyn DocumentFilter>,
    converter: Arc<dyn QueryConverter>,
    mapper: Arc<dyn DocumentMapper>,
    host: Arc<RwLock<Arc<dyn HostRuntime>>>,
    halt: Arc<HaltToken>,
    failures: u32,
    cookies: Vec<String>,
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("source_id", &self.config.source_id)
            .field("failures", &self.failures)
            .field("halt", &self.halt)
            .finish_non_exhaustive()
    }
}

impl Wrapper {
    /// Creates a wrapper around a listing script.
    ///
    /// Defaults: an in-memory cache, a year-range filter when the config
    /// sets a range (otherwise accept-all), the plain query converter, the
    /// field mapper and a host that ignores halts.
    #[must_use]
    pub fn new(config: WrapperConfig, orchestrator: Orchestrator, listing: Script) -> Self {
        let filter: Arc<dyn DocumentFilter> = match config.year_range {
            Some(range) => Arc::new(YearRangeFilter::new(range)),
            None => Arc::new(AcceptAll),
        };
        let host: Arc<RwLock<Arc<dyn HostRuntime>>> =
            Arc::new(RwLock::new(Arc::new(NoOpHost)));
        let halt = Arc::new(HaltToken::new());
        let notified = Arc::clone(&host);
        halt.on_halt(move |reason| notified.read().halt(reason));
        Self {
            config,
            orchestrator,
            listing: Arc::new(listing),
            export: None,
            detail: None,
            cache: Arc::new(InMemoryCache::new()),
            filter,
            converter: Arc::new(PlainQueryConverter),
            mapper: Arc::new(FieldMapper),
            host,
            halt,
            failures: 0,
            cookies: Vec::new(),
        }
    }

    /// Sets the export script run by two-step wrappers.
    #[must_use]
    pub fn with_export_script(mut self, script: Script) -> Self {
        self.export = Some(Arc::new(script));
        self
    }

    /// Sets the detail script used by [`Wrapper::fetch_details`].
    #[must_use]
    pub fn with_detail_script(mut self, script: Script) -> Self {
        self.detail = Some(Arc::new(script));
        self
    }

    /// Sets the cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the document filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn DocumentFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the query converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn QueryConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Sets the document mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Arc<dyn DocumentMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Sets the host runtime, told to stop whenever the halt token fires.
    #[must_use]
    pub fn with_host(self, host: Arc<dyn HostRuntime>) -> Self {
        *self.host.write() = host;
        self
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// The halt token shared with every session of this wrapper.
    #[must_use]
    pub fn halt_token(&self) -> Arc<HaltToken> {
        Arc::clone(&self.halt)
    }

    /// Whether the wrapper has halted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halt.is_halted()
    }

    /// Consecutive recoverable faults so far.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Answers a query. Never fails; faults yield an empty list.
    pub async fn ask_document(&mut self, query: &Query, use_cache: bool) -> ResultList {
        if self.is_halted() {
            debug!(source = %self.config.source_id, "Wrapper halted; query ignored");
            return ResultList::new();
        }

        let key = cache_key(query);
        if use_cache {
            if let Some(hit) = self.cache.get(&key) {
                debug!(source = %self.config.source_id, query = %query, "Cache hit");
                return hit;
            }
        }

        match self.retrieve_metadata(query).await {
            Some(results) => {
                if use_cache {
                    self.cache.put(&key, results.clone());
                }
                results
            }
            None => ResultList::new(),
        }
    }

    /// Runs the mode-specific crawl and applies the fault policy.
    ///
    /// Returns `None` when the query ended in a fault.
    pub async fn retrieve_metadata(&mut self, query: &Query) -> Option<ResultList> {
        info!(source = %self.config.source_id, query = %query, mode = ?self.config.mode, "Retrieving metadata");
        match self.process(query).await {
            Ok(results) => {
                info!(source = %self.config.source_id, count = results.len(), "Query finished");
                Some(results)
            }
            Err(fault) if fault.is_fatal() => {
                self.halt_wrapper(&fault);
                None
            }
            Err(fault) => {
                warn!(source = %self.config.source_id, reason = fault.reason(), "Query abandoned");
                None
            }
        }
    }

    async fn process(&mut self, query: &Query) -> Outcome<ResultList> {
        match self.config.mode {
            CrawlMode::WholeQuery => self.crawl(query).await,
            CrawlMode::Conjunctions => {
                let mut merged = ResultList::new();
                let conjunctions = query.conjunctions();
                if conjunctions.len() > self.config.max_conjunctions {
                    warn!(
                        source = %self.config.source_id,
                        total = conjunctions.len(),
                        limit = self.config.max_conjunctions,
                        "Too many conjunctions; extra ones are dropped"
                    );
                }
                for conjunction in conjunctions.iter().take(self.config.max_conjunctions) {
                    if self.is_halted() {
                        break;
                    }
                    merged.merge(self.crawl(conjunction).await?);
                }
                Ok(merged)
            }
        }
    }

    fn new_session(&self, query: &Query) -> Session {
        let mut session = Session::new(self.halt_token());
        let bag = session.bag_mut();
        bag.set(keys::URL, self.config.start_url.as_str());
        bag.set(keys::QUERY, self.converter.convert(query));
        if let Some(max) = self.config.max_results {
            bag.set(keys::MAX_RESULTS, max.to_string());
        }
        if let Some(range) = self.config.year_range {
            bag.set(keys::YEAR_RANGE, range.to_string());
        }
        session
    }

    async fn crawl(&mut self, query: &Query) -> Outcome<ResultList> {
        let mut session = self.new_session(query);
        let results = match self.config.kind {
            WrapperKind::Paged => self.page_loop(&mut session, true).await,
            WrapperKind::TwoStep => self.two_step(&mut session).await,
        };
        self.keep_cookies(session.cookies());
        results
    }

    /// Runs the listing script page by page. With `keep_records`, mapped
    /// records are collected; otherwise only detail tokens are harvested
    /// into the returned list as bare results.
    async fn page_loop(&mut self, session: &mut Session, keep_records: bool) -> Outcome<ResultList> {
        let listing = Arc::clone(&self.listing);
        let mut results = ResultList::new();
        let mut iterations = 0;

        loop {
            if self.is_halted() {
                break;
            }
            let value = self.run_script(&listing, session).await?;
            iterations += 1;

            let records = follow_data(&value);
            for record in &records {
                if keep_records {
                    if let Some(result) = self.accept(record) {
                        results.push(result);
                    }
                } else if let Some(token) = record.get(keys::DETAILS).and_then(Value::as_text) {
                    results.push(
                        WrappedResult::new(&self.config.source_id, super::Document::new())
                            .with_detail_token(Some(token)),
                    );
                }
            }

            let next = next_page(&records, session);
            info!(
                source = %self.config.source_id,
                session_id = %session.id(),
                page = iterations,
                records = records.len(),
                collected = results.len(),
                next = next.as_deref().unwrap_or(""),
                "Page processed"
            );

            if self
                .config
                .max_results
                .is_some_and(|max| keep_records && results.len() >= max)
            {
                break;
            }
            match next {
                Some(url) if iterations < self.config.max_fetch_pages => {
                    session.bag_mut().set(keys::URL, url);
                }
                _ => break,
            }
        }
        Ok(results)
    }

    async fn two_step(&mut self, session: &mut Session) -> Outcome<ResultList> {
        let Some(export) = self.export.clone() else {
            return Err(CrawlFault::fatal(format!(
                "two-step wrapper '{}' has no export script",
                self.config.source_id
            )));
        };

        let harvested = self.page_loop(session, false).await?;
        let ids: Vec<Value> = harvested
            .iter()
            .filter_map(|result| result.detail_token.clone())
            .map(Value::Scalar)
            .collect();
        if ids.is_empty() {
            info!(source = %self.config.source_id, "No detail tokens harvested");
            return Ok(ResultList::new());
        }
        info!(source = %self.config.source_id, count = ids.len(), "Exporting harvested records");
        session.bag_mut().set(keys::IDS, Value::List(ids));

        let value = self.run_script(&export, session).await?;
        let mut results = ResultList::new();
        for record in follow_data(&value) {
            if let Some(result) = self.accept(&record) {
                results.push(result);
            }
            if self
                .config
                .max_results
                .is_some_and(|max| results.len() >= max)
            {
                break;
            }
        }
        Ok(results)
    }

    /// Maps, validates and filters one record.
    fn accept(&self, record: &BTreeMap<String, Value>) -> Option<WrappedResult> {
        let document = self.mapper.map(record);
        if let Err(issue) = validate(&document) {
            debug!(source = %self.config.source_id, issue = %issue, "Record rejected");
            return None;
        }
        if !self.filter.check(&document) {
            debug!(source = %self.config.source_id, "Record filtered out");
            return None;
        }
        let token = record.get(keys::DETAILS).and_then(Value::as_text);
        Some(WrappedResult::new(&self.config.source_id, document).with_detail_token(token))
    }

    /// Runs one script execution and tracks consecutive faults.
    async fn run_script(&mut self, script: &Script, session: &mut Session) -> Outcome<Value> {
        match self.orchestrator.execute(script, session).await {
            Ok(value) => {
                self.failures = 0;
                Ok(value)
            }
            Err(fault) => {
                self.failures += 1;
                warn!(
                    source = %self.config.source_id,
                    failures = self.failures,
                    max_failures = self.config.max_failures,
                    reason = fault.reason(),
                    "Script execution failed"
                );
                if self.failures > self.config.max_failures {
                    Err(fault.escalate())
                } else {
                    Err(fault)
                }
            }
        }
    }

    /// Appends a session's cookies to the wrapper jar. A cookie with the
    /// same name replaces the older value in place.
    fn keep_cookies(&mut self, cookies: &[String]) {
        for cookie in cookies {
            let name = cookie_name(cookie);
            match self.cookies.iter_mut().find(|kept| cookie_name(kept) == name) {
                Some(kept) => kept.clone_from(cookie),
                None => self.cookies.push(cookie.clone()),
            }
        }
    }

    /// The cookies relayed to detail fetches.
    #[must_use]
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    fn halt_wrapper(&self, fault: &CrawlFault) {
        error!(source = %self.config.source_id, reason = fault.reason(), "Halting wrapper");
        self.halt.halt(fault.reason());
    }

    /// Fetches detail pages for results that have a detail token and no
    /// detail timestamp, merging the detail record into each document.
    ///
    /// Returns the number of results updated.
    pub async fn fetch_details(&mut self, results: &mut ResultList) -> usize {
        let Some(script) = self.detail.clone() else {
            debug!(source = %self.config.source_id, "No detail script configured");
            return 0;
        };

        let mut updated = 0;
        for item in results.items_mut() {
            if item.details_fetched_at.is_some() {
                continue;
            }
            if self.is_halted() {
                break;
            }
            let Some(token) = item.detail_token.clone() else {
                continue;
            };
            let Some(url) = self.detail_url(&token) else {
                warn!(source = %self.config.source_id, token = %token, "Cannot resolve detail URL");
                continue;
            };

            let mut session = Session::new(self.halt_token());
            if self.config.reuse_cookies {
                session = session.with_cookies(self.cookies.clone());
            }
            session.bag_mut().set(keys::URL, url);
            session.bag_mut().set(keys::DETAILS, token.as_str());

            match self.run_script(&script, &mut session).await {
                Ok(value) => {
                    let Some(record) = follow_data(&value).into_iter().next() else {
                        debug!(source = %self.config.source_id, token = %token, "Detail page yielded nothing");
                        continue;
                    };
                    let detail = self.mapper.map(&record);
                    item.document.merge(&detail);
                    item.details_fetched_at = Some(Utc::now());
                    updated += 1;
                }
                Err(fault) if fault.is_fatal() => {
                    self.halt_wrapper(&fault);
                    break;
                }
                Err(fault) => {
                    warn!(source = %self.config.source_id, token = %token, reason = fault.reason(), "Detail fetch failed");
                }
            }
        }
        updated
    }

    /// Resolves a detail token: an absolute URL as is, else through the
    /// template, else relative to the start URL.
    fn detail_url(&self, token: &str) -> Option<Url> {
        if let Ok(url) = Url::parse(token) {
            return Some(url);
        }
        if let Some(template) = &self.config.detail_url_template {
            return Url::parse(&template.replace("{token}", token)).ok();
        }
        Url::parse(&self.config.start_url)
            .and_then(|base| base.join(token))
            .ok()
    }
}

fn cookie_name(cookie: &str) -> &str {
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split('=').next())
        .map_or("", str::trim)
}

/// The records of one execution: a map, or the maps inside a list.
fn follow_data(value: &Value) -> Vec<BTreeMap<String, Value>> {
    match value {
        Value::Map(map) => vec![map.clone()],
        Value::List(items) => items.iter().flat_map(follow_data).collect(),
        _ => Vec::new(),
    }
}

/// The next listing page from the records or the bag. The bag entry is
/// consumed so a page without a link ends the loop.
fn next_page(records: &[BTreeMap<String, Value>], session: &mut Session) -> Option<String> {
    let from_bag = session.bag_mut().remove(keys::NEXT_PAGE);
    records
        .iter()
        .find_map(|record| record.get(keys::NEXT_PAGE).cloned())
        .or(from_bag)
        .and_then(|value| value.as_text())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}
