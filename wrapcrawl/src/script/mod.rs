//! The script orchestrator.
//!
//! A [`Script`] is an ordered list of commands (`fetch`, `clean`, `parse`,
//! ...) loaded from a `<script>` XML document. The [`Orchestrator`] runs it
//! against a [`Session`], which carries the page counter, the cookie jar,
//! the base URL and the [`PropertyBag`] across the executions of one query.
//!
//! Step failures are counted per execution. Once the count exceeds the
//! configured `max_errors`, the execution ends with a recoverable fault.

mod command;
mod diagnostics;
mod orchestrator;
mod session;

pub use command::{Command, FetchCommand, Param, Script};
pub use diagnostics::{DiagnosticsLog, RequestIdGenerator};
pub use orchestrator::Orchestrator;
pub use session::{ExecutionState, Session};

pub use crate::rules::PropertyBag;
