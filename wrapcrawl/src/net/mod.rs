//! HTTP fetch primitive.
//!
//! Provides the [`Fetcher`] protocol, the reqwest-backed implementation,
//! and the backoff used between failed attempts.

mod fetcher;
mod request;
mod retry;

pub use fetcher::{Fetcher, ReqwestFetcher};
pub use request::{FetchRequest, FetchResponse, Method};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig};
