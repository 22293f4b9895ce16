use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::config::{CrawlMode, EngineConfig, WrapperConfig, WrapperKind, YearRange};
use crate::errors::FetchError;
use crate::net::{FetchResponse, Method, RetryConfig};
use crate::script::{Orchestrator, Script};
use crate::testing::{
    listing_page, ListingRow, RecordingHost, ScriptedFetcher, DETAIL_SCRIPT, EXPORT_SCRIPT,
    LISTING_SCRIPT,
};

const START: &str = "http://lib.example.org/search";

fn wrapper(fetcher: &Arc<ScriptedFetcher>, config: WrapperConfig, max_errors: u32) -> Wrapper {
    let engine = EngineConfig::new()
        .with_retry(RetryConfig::immediate())
        .with_max_errors(max_errors);
    let orchestrator = Orchestrator::new(engine, fetcher.clone());
    Wrapper::new(config, orchestrator, Script::from_xml(LISTING_SCRIPT).unwrap())
}

fn config() -> WrapperConfig {
    WrapperConfig::new("dblp", START)
}

fn row(title: &str, year: &str) -> ListingRow {
    ListingRow::new(title, "Ada; Bob", year)
}

fn titles(results: &ResultList) -> Vec<String> {
    results
        .iter()
        .filter_map(|result| result.document.title.clone())
        .collect()
}

#[tokio::test]
async fn test_paging_follows_next_links_until_absent() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_page(listing_page(&[row("P1", "2001")], Some("?page=2")))
            .with_page(listing_page(&[row("P2", "2002")], Some("?page=3")))
            .with_page(listing_page(&[row("P3", "2003")], None)),
    );
    let mut wrapper = wrapper(&fetcher, config().with_max_fetch_pages(5), 2);

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    assert_eq!(fetcher.call_count(), 3);
    assert_eq!(
        fetcher.urls(),
        vec![
            START.to_string(),
            format!("{START}?page=2"),
            format!("{START}?page=3"),
        ]
    );
    assert_eq!(titles(&results), vec!["P1", "P2", "P3"]);
    assert_eq!(
        results.items()[0].document.authors,
        vec!["Ada".to_string(), "Bob".to_string()]
    );
    assert_eq!(results.items()[0].source_id, "dblp");
    assert_eq!(wrapper.failures(), 0);
}

#[tokio::test]
async fn test_paging_respects_page_cap() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_fallback_page(listing_page(&[row("Loop", "2001")], Some("?page=next"))),
    );
    let mut wrapper = wrapper(&fetcher, config().with_max_fetch_pages(2), 2);

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_query_is_converted_into_the_request() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(listing_page(&[], None)));
    let mut wrapper = wrapper(&fetcher, config(), 2);

    let query = Query::and([Query::term("graph mining"), Query::negate(Query::term("survey"))]);
    let results = wrapper.ask_document(&query, false).await;

    assert!(results.is_empty());
    assert_eq!(
        fetcher.requests()[0].query,
        vec![("q".to_string(), "\"graph mining\" -survey".to_string())]
    );
}

#[tokio::test]
async fn test_invalid_records_are_dropped() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(listing_page(
        &[
            row("Complete", "2001"),
            ListingRow::new("No Authors", "", "2001"),
            row("No Year", "n/a"),
            row("", "2001"),
        ],
        None,
    )));
    let mut wrapper = wrapper(&fetcher, config(), 2);

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    assert_eq!(titles(&results), vec!["Complete"]);
}

#[tokio::test]
async fn test_year_range_filters_documents() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_page(listing_page(&[row("Old", "1999"), row("New", "2003")], None)),
    );
    let config = config().with_year_range(YearRange::new(2000, 2005));
    let mut wrapper = wrapper(&fetcher, config, 2);

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    assert_eq!(titles(&results), vec!["New"]);
}

#[tokio::test]
async fn test_custom_filter_is_consulted() {
    let fetcher = Arc::new(
        ScriptedFetcher::new().with_page(listing_page(&[row("A", "2001"), row("B", "2002")], None)),
    );
    let mut filter = MockDocumentFilter::new();
    filter
        .expect_check()
        .times(2)
        .returning(|document| document.title.as_deref() == Some("B"));
    let mut wrapper = wrapper(&fetcher, config(), 2).with_filter(Arc::new(filter));

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    assert_eq!(titles(&results), vec!["B"]);
}

#[tokio::test]
async fn test_max_results_stops_paging() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_fallback_page(listing_page(
        &[row("A", "2001"), row("B", "2002")],
        Some("?page=2"),
    )));
    let mut wrapper = wrapper(&fetcher, config().with_max_results(2), 2);

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_conjunctions_are_crawled_and_merged() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_page(listing_page(
                &[row("Shared", "2001").with_token("s1"), row("Only B", "2002")],
                None,
            ))
            .with_page(listing_page(
                &[row("Shared", "2001").with_token("s1"), row("Only C", "2003")],
                None,
            )),
    );
    let config = config().with_mode(CrawlMode::Conjunctions);
    let mut wrapper = wrapper(&fetcher, config, 2);

    let query = Query::and([
        Query::term("a"),
        Query::or([Query::term("b"), Query::term("c")]),
    ]);
    let results = wrapper.ask_document(&query, false).await;

    let sent: Vec<String> = fetcher
        .requests()
        .iter()
        .map(|request| request.query[0].1.clone())
        .collect();
    assert_eq!(sent, vec!["a b", "a c"]);
    assert_eq!(titles(&results), vec!["Shared", "Only B", "Only C"]);
    assert_eq!(results.items()[0].detail_token.as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_conjunction_cap() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_fallback_page(listing_page(&[], None)));
    let config = config()
        .with_mode(CrawlMode::Conjunctions)
        .with_max_conjunctions(2);
    let mut wrapper = wrapper(&fetcher, config, 2);

    let query = Query::or([Query::term("a"), Query::term("b"), Query::term("c")]);
    wrapper.ask_document(&query, false).await;

    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn test_consecutive_failures_escalate_and_halt() {
    let fetcher = Arc::new(ScriptedFetcher::always_failing());
    let mut host = MockHostRuntime::new();
    host.expect_halt().times(1).return_const(());
    let mut wrapper =
        wrapper(&fetcher, config().with_max_failures(1), 0).with_host(Arc::new(host));
    let query = Query::term("graphs");

    assert!(wrapper.ask_document(&query, false).await.is_empty());
    assert!(!wrapper.is_halted());
    assert_eq!(wrapper.failures(), 1);

    assert!(wrapper.ask_document(&query, false).await.is_empty());
    assert!(wrapper.is_halted());
    assert_eq!(fetcher.call_count(), 2);

    assert!(wrapper.ask_document(&query, false).await.is_empty());
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_error(FetchError::transport(START, "reset"))
            .with_page(listing_page(&[row("A", "2001")], None))
            .with_error(FetchError::transport(START, "reset")),
    );
    let mut wrapper = wrapper(&fetcher, config().with_max_failures(1), 0);
    let query = Query::term("graphs");

    wrapper.ask_document(&query, false).await;
    assert_eq!(wrapper.failures(), 1);
    assert_eq!(wrapper.ask_document(&query, false).await.len(), 1);
    assert_eq!(wrapper.failures(), 0);
    wrapper.ask_document(&query, false).await;
    assert_eq!(wrapper.failures(), 1);
    assert!(!wrapper.is_halted());
}

#[tokio::test]
async fn test_cache_hit_skips_crawl() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let query = Query::term("graphs");
    let key = cache_key(&query);

    let mut cached = ResultList::new();
    cached.push(WrappedResult::new(
        "dblp",
        Document::new().with_title("Cached").with_author("Ada").with_year(2001),
    ));
    let mut cache = MockCache::new();
    cache
        .expect_get()
        .withf(move |k| k == key)
        .times(1)
        .return_const(Some(cached));
    cache.expect_put().never();
    let mut wrapper = wrapper(&fetcher, config(), 2).with_cache(Arc::new(cache));

    let results = wrapper.ask_document(&query, true).await;

    assert_eq!(titles(&results), vec!["Cached"]);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_successful_results_are_cached() {
    let fetcher =
        Arc::new(ScriptedFetcher::new().with_page(listing_page(&[row("A", "2001")], None)));
    let cache = Arc::new(InMemoryCache::new());
    let mut wrapper = wrapper(&fetcher, config(), 2).with_cache(cache.clone());
    let query = Query::term("graphs");

    let first = wrapper.ask_document(&query, true).await;
    let second = wrapper.ask_document(&query, true).await;

    assert_eq!(first, second);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_failed_results_are_not_cached() {
    let fetcher = Arc::new(ScriptedFetcher::always_failing());
    let mut cache = MockCache::new();
    cache.expect_get().return_const(None);
    cache.expect_put().never();
    let mut wrapper = wrapper(&fetcher, config(), 0).with_cache(Arc::new(cache));

    assert!(wrapper.ask_document(&Query::term("graphs"), true).await.is_empty());
}

const EXPORT_BODY: &str = r#"<?xml version="1.0"?>
<records>
  <record id="r1"><title>First</title><author>Ada</author><author>Bob</author><year>2001</year></record>
  <record id="r2"><title>Second</title><author>Cy</author><year>2002</year></record>
  <record id="r3"><title>Untitled</title><year>2003</year></record>
</records>"#;

#[tokio::test]
async fn test_two_step_exports_harvested_tokens_in_one_request() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_page(listing_page(
                &[row("", "").with_token("r1"), row("", "").with_token("r2")],
                Some("?page=2"),
            ))
            .with_page(listing_page(
                &[row("", "").with_token("r2"), row("", "").with_token("r3")],
                None,
            ))
            .with_page(EXPORT_BODY),
    );
    let config = config().with_kind(WrapperKind::TwoStep);
    let mut wrapper = wrapper(&fetcher, config, 2)
        .with_export_script(Script::from_xml(EXPORT_SCRIPT).unwrap());

    let results = wrapper.ask_document(&Query::term("graphs"), false).await;

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 3);
    let export = &requests[2];
    assert_eq!(export.method, Method::Post);
    assert_eq!(export.url, "http://lib.example.org/export");
    assert_eq!(
        export.form,
        vec![
            ("ids".to_string(), "r1".to_string()),
            ("ids".to_string(), "r2".to_string()),
            ("ids".to_string(), "r3".to_string()),
        ]
    );
    assert_eq!(titles(&results), vec!["First", "Second"]);
    assert_eq!(results.items()[1].detail_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn test_two_step_without_tokens_skips_export() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(listing_page(&[row("A", "2001")], None)));
    let config = config().with_kind(WrapperKind::TwoStep);
    let mut wrapper = wrapper(&fetcher, config, 2)
        .with_export_script(Script::from_xml(EXPORT_SCRIPT).unwrap());

    assert!(wrapper.ask_document(&Query::term("graphs"), false).await.is_empty());
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_two_step_without_export_script_halts() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let host = Arc::new(RecordingHost::new());
    let config = config().with_kind(WrapperKind::TwoStep);
    let mut wrapper = wrapper(&fetcher, config, 2).with_host(host.clone());

    assert!(wrapper.ask_document(&Query::term("graphs"), false).await.is_empty());

    assert!(wrapper.is_halted());
    assert_eq!(host.halt_count(), 1);
    assert!(host.reasons()[0].contains("no export script"));
    assert_eq!(fetcher.call_count(), 0);
}

const DETAIL_PAGE: &str = r#"<html><body>
<div class="abstract">We mine graphs.</div>
<span class="publisher">ACM</span>
</body></html>"#;

#[tokio::test]
async fn test_fetch_details_merges_and_timestamps_successes_only() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_response(FetchResponse {
                set_cookies: vec!["sid=42".to_string()],
                ..FetchResponse::ok(
                    START,
                    listing_page(
                        &[
                            row("A", "2001").with_token("t1"),
                            row("B", "2002").with_token("t2"),
                            row("C", "2003"),
                        ],
                        None,
                    ),
                )
            })
            .with_page(DETAIL_PAGE)
            .with_error(FetchError::transport(START, "reset")),
    );
    let config = config().with_detail_url_template("http://lib.example.org/details?id={token}");
    let mut wrapper = wrapper(&fetcher, config, 0)
        .with_detail_script(Script::from_xml(DETAIL_SCRIPT).unwrap());

    let mut results = wrapper.ask_document(&Query::term("graphs"), false).await;
    assert_eq!(results.len(), 3);

    let updated = wrapper.fetch_details(&mut results).await;

    assert_eq!(updated, 1);
    let first = &results.items()[0];
    assert!(first.details_fetched_at.is_some());
    assert_eq!(
        first.document.fields.get("abstract").map(String::as_str),
        Some("We mine graphs.")
    );
    assert_eq!(first.document.title.as_deref(), Some("A"));
    assert!(results.items()[1].details_fetched_at.is_none());
    assert!(results.items()[2].details_fetched_at.is_none());

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].url, "http://lib.example.org/details?id=t1");
    assert_eq!(requests[1].cookies, vec!["sid=42".to_string()]);
    assert_eq!(requests[2].url, "http://lib.example.org/details?id=t2");
    assert!(!wrapper.is_halted());
}

#[tokio::test]
async fn test_fetch_details_skips_already_fetched() {
    let fetcher = Arc::new(ScriptedFetcher::new().with_fallback_page(DETAIL_PAGE));
    let mut wrapper =
        wrapper(&fetcher, config(), 2).with_detail_script(Script::from_xml(DETAIL_SCRIPT).unwrap());

    let mut results = ResultList::new();
    results.push(
        WrappedResult::new("dblp", Document::new().with_title("A"))
            .with_detail_token(Some("details?id=t1".to_string())),
    );

    assert_eq!(wrapper.fetch_details(&mut results).await, 1);
    assert_eq!(
        fetcher.urls(),
        vec!["http://lib.example.org/details?id=t1".to_string()]
    );
    assert_eq!(wrapper.fetch_details(&mut results).await, 0);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_external_halt_notifies_host() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let host = Arc::new(RecordingHost::new());
    let mut wrapper = wrapper(&fetcher, config(), 2).with_host(host.clone());

    wrapper.halt_token().halt("shutdown");

    assert_eq!(host.reasons(), vec!["shutdown".to_string()]);
    assert!(wrapper.ask_document(&Query::term("graphs"), false).await.is_empty());
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(host.halt_count(), 1);
}

#[tokio::test]
async fn test_cookies_from_every_conjunction_are_relayed() {
    let listing = |cookie: &str, token: &str| FetchResponse {
        set_cookies: vec![cookie.to_string()],
        ..FetchResponse::ok(
            START,
            listing_page(&[row(token, "2001").with_token(token)], None),
        )
    };
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_response(listing("sid=1", "t1"))
            .with_response(listing("lang=en", "t2"))
            .with_fallback_page(DETAIL_PAGE),
    );
    let config = config()
        .with_mode(CrawlMode::Conjunctions)
        .with_detail_url_template("http://lib.example.org/details?id={token}");
    let mut wrapper = wrapper(&fetcher, config, 2)
        .with_detail_script(Script::from_xml(DETAIL_SCRIPT).unwrap());

    let query = Query::or([Query::term("a"), Query::term("b")]);
    let mut results = wrapper.ask_document(&query, false).await;
    assert_eq!(results.len(), 2);
    assert_eq!(
        wrapper.cookies(),
        &["sid=1".to_string(), "lang=en".to_string()]
    );

    assert_eq!(wrapper.fetch_details(&mut results).await, 2);
    let requests = fetcher.requests();
    assert_eq!(
        requests[2].cookies,
        vec!["sid=1".to_string(), "lang=en".to_string()]
    );
}
