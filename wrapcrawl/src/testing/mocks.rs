//! Test doubles for the fetch protocol and the host runtime.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::FetchError;
use crate::net::{FetchRequest, FetchResponse, Fetcher};
use crate::wrapper::HostRuntime;

#[derive(Debug, Clone)]
enum Reply {
    Page(String),
    Response(FetchResponse),
    Error(FetchError),
}

impl Reply {
    fn into_result(self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        match self {
            Self::Page(body) => Ok(FetchResponse::ok(&request.url, body)),
            Self::Response(response) => Ok(response),
            Self::Error(err) => Err(err),
        }
    }
}

/// A fetcher that replays queued replies in order and records every request.
///
/// When the queue is empty the fallback reply is used; without one the
/// fetch fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    queue: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    /// Creates a fetcher with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher whose every call fails with a transport error.
    #[must_use]
    pub fn always_failing() -> Self {
        let fetcher = Self::new();
        *fetcher.fallback.lock() = Some(Reply::Error(FetchError::transport(
            "scripted",
            "connection refused",
        )));
        fetcher
    }

    /// Queues a 200 page; its final URL is the request URL.
    #[must_use]
    pub fn with_page(self, body: impl Into<String>) -> Self {
        self.push_page(body);
        self
    }

    /// Queues a full response.
    #[must_use]
    pub fn with_response(self, response: FetchResponse) -> Self {
        self.queue.lock().push_back(Reply::Response(response));
        self
    }

    /// Queues an error.
    #[must_use]
    pub fn with_error(self, error: FetchError) -> Self {
        self.queue.lock().push_back(Reply::Error(error));
        self
    }

    /// Replies with this page once the queue is exhausted.
    #[must_use]
    pub fn with_fallback_page(self, body: impl Into<String>) -> Self {
        *self.fallback.lock() = Some(Reply::Page(body.into()));
        self
    }

    /// Queues a 200 page.
    pub fn push_page(&self, body: impl Into<String>) {
        self.queue.lock().push_back(Reply::Page(body.into()));
    }

    /// Number of fetches performed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    /// The URLs requested, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.lock().push(request.clone());
        let reply = self
            .queue
            .lock()
            .pop_front()
            .or_else(|| self.fallback.lock().clone());
        match reply {
            Some(reply) => reply.into_result(request),
            None => Err(FetchError::transport(&request.url, "no scripted reply")),
        }
    }
}

/// A host runtime that records halt requests.
#[derive(Debug, Default)]
pub struct RecordingHost {
    reasons: Mutex<Vec<String>>,
}

impl RecordingHost {
    /// Creates a recording host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of halt requests.
    #[must_use]
    pub fn halt_count(&self) -> usize {
        self.reasons.lock().len()
    }

    /// The recorded halt reasons.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl HostRuntime for RecordingHost {
    fn halt(&self, reason: &str) {
        self.reasons.lock().push(reason.to_string());
    }
}
