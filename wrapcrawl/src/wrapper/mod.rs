//! Per-source wrappers.
//!
//! A [`Wrapper`] turns a boolean [`Query`] into a [`ResultList`] by driving
//! the script orchestrator over a source's listing pages. Documents are
//! mapped, validated and filtered by pluggable collaborators before they
//! reach the result list.

mod collaborators;
mod crawl;
mod model;
mod query;
mod validation;

pub use collaborators::{
    cache_key, AcceptAll, Cache, DocumentFilter, DocumentMapper, FieldMapper, HostRuntime,
    InMemoryCache, NoOpHost, PlainQueryConverter, QueryConverter, YearRangeFilter,
};
pub use crawl::{keys, Wrapper};
pub use model::{Document, ResultList, WrappedResult};
pub use query::Query;
pub use validation::{validate, ValidationIssue};

#[cfg(test)]
pub(crate) use collaborators::{MockCache, MockDocumentFilter, MockHostRuntime};

#[cfg(test)]
mod crawl_tests;
