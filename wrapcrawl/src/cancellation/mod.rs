//! Cooperative cancellation.
//!
//! A [`HaltToken`] is shared between a wrapper and its script sessions and
//! polled before every network call.

mod token;

pub use token::{HaltCallback, HaltToken};
