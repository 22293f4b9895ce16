//! Per-query execution state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::cancellation::HaltToken;
use crate::rules::{Interpreter, PropertyBag};

/// Lifecycle of one script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// No execution has started.
    #[default]
    Init,
    /// Commands are running.
    Running,
    /// The execution produced a value.
    Done,
    /// The execution ended with `Null`, a fault, or a halt.
    Aborted,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        write!(f, "{label}")
    }
}

/// State carried across the script executions of one query.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    page: u32,
    cookies_enabled: bool,
    cookies: Vec<String>,
    errors: u32,
    base_url: Option<Url>,
    halt: Arc<HaltToken>,
    state: ExecutionState,
    bag: PropertyBag,
}

impl Session {
    /// Creates a session on page 1 polling `halt`.
    #[must_use]
    pub fn new(halt: Arc<HaltToken>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page: 1,
            cookies_enabled: false,
            cookies: Vec::new(),
            errors: 0,
            base_url: None,
            halt,
            state: ExecutionState::Init,
            bag: PropertyBag::new(),
        }
    }

    /// Starts with an existing cookie jar, enabled.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<String>) -> Self {
        self.cookies_enabled = true;
        self.cookies = cookies;
        self
    }

    /// Session id for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current page, starting at 1.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Whether the cookie jar is in use.
    #[must_use]
    pub const fn cookies_enabled(&self) -> bool {
        self.cookies_enabled
    }

    /// Enables the cookie jar; enabling twice changes nothing.
    pub fn enable_cookies(&mut self) {
        self.cookies_enabled = true;
    }

    /// The raw `Set-Cookie` values collected so far.
    #[must_use]
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Appends cookies when the jar is enabled.
    pub fn add_cookies(&mut self, cookies: &[String]) {
        if self.cookies_enabled {
            self.cookies.extend_from_slice(cookies);
        }
    }

    /// Step errors in the current execution.
    #[must_use]
    pub const fn errors(&self) -> u32 {
        self.errors
    }

    /// Counts a step error and returns the new count.
    pub fn record_error(&mut self) -> u32 {
        self.errors += 1;
        self.errors
    }

    /// Base URL for relative links.
    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Sets the base URL.
    pub fn set_base_url(&mut self, url: Url) {
        self.base_url = Some(url);
    }

    /// Whether the owning wrapper has halted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halt.is_halted()
    }

    /// State of the last execution.
    #[must_use]
    pub const fn state(&self) -> ExecutionState {
        self.state
    }

    /// The property bag.
    #[must_use]
    pub const fn bag(&self) -> &PropertyBag {
        &self.bag
    }

    /// The property bag, mutably.
    pub fn bag_mut(&mut self) -> &mut PropertyBag {
        &mut self.bag
    }

    /// An interpreter writing to this session's bag and resolving against
    /// its base URL.
    pub fn interpreter(&mut self) -> Interpreter<'_> {
        Interpreter::new(&mut self.bag).with_base_url(self.base_url.clone())
    }

    pub(crate) fn begin_execution(&mut self) {
        self.errors = 0;
        self.state = ExecutionState::Running;
    }

    pub(crate) fn finish_execution(&mut self, state: ExecutionState) {
        self.state = state;
        self.page += 1;
    }
}
