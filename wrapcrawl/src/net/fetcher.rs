//! The fetch protocol and its reqwest implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use tracing::debug;
use url::Url;

use super::request::{FetchRequest, FetchResponse, Method};
use crate::config::FetchConfig;
use crate::errors::FetchError;
use crate::observability::StepTimer;

/// Protocol for fetching remote pages.
///
/// Implementations decode the body to text and report the status as-is;
/// deciding whether a status counts as a failure is the caller's concern.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs one request.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Builds a client from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::Client(format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::Client(format!("header value for '{name}': {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| FetchError::Client(format!("proxy {}: {e}", proxy.url())))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = Url::parse(&request.url).map_err(|e| FetchError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let timer = StepTimer::start("fetch");

        let mut builder = match request.method {
            Method::Get => {
                let mut builder = self.client.get(url);
                if !request.query.is_empty() {
                    builder = builder.query(&request.query);
                }
                if !request.form.is_empty() {
                    builder = builder.query(&request.form);
                }
                builder
            }
            Method::Post => {
                let mut builder = self.client.post(url);
                if !request.query.is_empty() {
                    builder = builder.query(&request.query);
                }
                builder.form(&request.form)
            }
        };
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::transport(&request.url, e.to_string()))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(String::from)
            .collect();

        let encoding = request.encoding.as_deref().unwrap_or("utf-8");
        let body = response
            .text_with_charset(encoding)
            .await
            .map_err(|e| FetchError::Decode {
                url: final_url.clone(),
                reason: e.to_string(),
            })?;

        let duration_ms = timer.finish();
        debug!(
            method = %request.method,
            url = %final_url,
            status,
            bytes = body.len(),
            duration_ms,
            "Fetched page"
        );

        Ok(FetchResponse {
            status,
            final_url,
            body,
            set_cookies,
            duration_ms,
        })
    }
}
