//! Testing utilities for scripts and wrappers.
//!
//! This module provides:
//! - A scripted fetcher replaying canned pages
//! - A host runtime that records halt requests
//! - Listing page builders and sample scripts

mod fixtures;
mod mocks;

pub use fixtures::{listing_page, ListingRow, DETAIL_SCRIPT, EXPORT_SCRIPT, LISTING_SCRIPT};
pub use mocks::{RecordingHost, ScriptedFetcher};
