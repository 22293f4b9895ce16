//! Runs a script's commands against a session.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::command::{Command, FetchCommand, Param};
use super::diagnostics::{DiagnosticsLog, RequestIdGenerator};
use super::session::{ExecutionState, Session};
use super::Script;
use crate::config::EngineConfig;
use crate::errors::{CrawlFault, FetchError, Outcome};
use crate::markup::{CleanMode, Cleaner, NodeRef, Substitution};
use crate::net::{FetchRequest, FetchResponse, Fetcher};
use crate::observability::StepTimer;
use crate::rules::{Context, PropertyBag, Value};

/// Executes scripts, one command at a time, threading the last result
/// through the sequence.
pub struct Orchestrator {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
    ids: Arc<RequestIdGenerator>,
    diagnostics: DiagnosticsLog,
    cleaner: Cleaner,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator; diagnostics go to `config.log_dir` if set.
    #[must_use]
    pub fn new(config: EngineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let diagnostics = config
            .log_dir
            .clone()
            .map_or_else(DiagnosticsLog::disabled, DiagnosticsLog::new);
        Self {
            config,
            fetcher,
            ids: Arc::new(RequestIdGenerator::new()),
            diagnostics,
            cleaner: Cleaner::new(),
        }
    }

    /// Shares a request id generator with other orchestrators.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<RequestIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Replaces the diagnostics log.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsLog) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs every command of `script` once.
    ///
    /// The sequence stops at the first command that yields `Null`. The page
    /// counter advances exactly once, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `CrawlFault::Recoverable` once the step errors of this
    /// execution exceed `max_errors`.
    pub async fn execute(&self, script: &Script, session: &mut Session) -> Outcome<Value> {
        session.begin_execution();
        let request_id = self.ids.next_id();
        info!(
            session_id = %session.id(),
            page = session.page(),
            request_id = %request_id,
            "Executing script"
        );

        let outcome = self.run(script, session).await;

        let state = match &outcome {
            Ok(value) if !value.is_null() => ExecutionState::Done,
            _ => ExecutionState::Aborted,
        };
        if let Ok(value) = &outcome {
            if value.is_null() {
                info!(session_id = %session.id(), page = session.page(), "result is null");
            }
            self.diagnostics.write_result(&request_id, value);
        }
        session.finish_execution(state);
        outcome
    }

    async fn run(&self, script: &Script, session: &mut Session) -> Outcome<Value> {
        let mut last = Value::Null;
        for command in script.commands() {
            if session.is_halted() {
                info!(session_id = %session.id(), "Wrapper halted; abandoning execution");
                return Ok(Value::Null);
            }

            let timer = StepTimer::start("command");
            last = self.step(command, last, session).await?;
            debug!(
                session_id = %session.id(),
                command = command.name(),
                result = last.type_name(),
                duration_ms = timer.finish(),
                "Command finished"
            );

            if command.produces_value() && last.is_null() {
                break;
            }
        }
        Ok(last)
    }

    async fn step(&self, command: &Command, last: Value, session: &mut Session) -> Outcome<Value> {
        match command {
            Command::Document { name } => self.document(name, session),
            Command::Load { file } => self.load(file, session).await,
            Command::UseCookies => {
                session.enable_cookies();
                Ok(last)
            }
            Command::Fetch(fetch) => self.fetch(fetch, last, session).await,
            Command::Clean {
                mode,
                substitutions,
            } => self.clean(*mode, substitutions, last, session),
            Command::Structured => {
                if let Value::Node(node) = &last {
                    let markup = node.to_markup();
                    debug!(session_id = %session.id(), markup = %markup, "Structured tree");
                    self.diagnostics
                        .write_structured(&self.ids.next_id(), &markup);
                }
                Ok(last)
            }
            Command::Parse { rules } => {
                let context = match last {
                    Value::Node(node) => Context::Node(node),
                    other => Context::Text(other.as_text().unwrap_or_default()),
                };
                let evaluated = session.interpreter().evaluate_all(&context, rules);
                match evaluated {
                    Ok(value) => Ok(value),
                    Err(fault) => {
                        self.step_failed(session, "parse", &fault)?;
                        Ok(Value::Null)
                    }
                }
            }
            Command::Save => {
                self.diagnostics.write_save(&self.ids.next_id(), &last);
                Ok(last)
            }
        }
    }

    /// Counts a step error and raises a recoverable fault once the count
    /// exceeds the ceiling.
    fn step_failed(&self, session: &mut Session, step: &str, error: &dyn Display) -> Outcome<()> {
        let errors = session.record_error();
        warn!(
            session_id = %session.id(),
            page = session.page(),
            step,
            errors,
            max_errors = self.config.max_errors,
            error = %error,
            "Script step failed"
        );
        if errors > self.config.max_errors {
            return Err(CrawlFault::recoverable(format!(
                "{errors} errors in one execution, last in {step}: {error}"
            )));
        }
        Ok(())
    }

    fn document(&self, name: &str, session: &mut Session) -> Outcome<Value> {
        let property = session.bag().get(name).cloned();
        match property {
            Some(value @ (Value::Node(_) | Value::Scalar(_))) => Ok(value),
            Some(other) => match other.as_text() {
                Some(text) => Ok(Value::Scalar(text)),
                None => {
                    let found = other.type_name();
                    self.step_failed(
                        session,
                        "document",
                        &format!("property '{name}' holds a {found}"),
                    )?;
                    Ok(Value::Null)
                }
            },
            None => {
                self.step_failed(session, "document", &format!("property '{name}' is not set"))?;
                Ok(Value::Null)
            }
        }
    }

    async fn load(&self, file: &str, session: &mut Session) -> Outcome<Value> {
        let Some(file) = session.bag().resolve(file) else {
            self.step_failed(session, "load", &"file reference is not set")?;
            return Ok(Value::Null);
        };
        let path = self
            .config
            .resource_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(&file), |dir| dir.join(&file));

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Value::Scalar(text)),
            Err(err) => {
                self.step_failed(session, "load", &format!("{}: {err}", path.display()))?;
                Ok(Value::Null)
            }
        }
    }

    fn clean(
        &self,
        mode: CleanMode,
        substitutions: &[Substitution],
        last: Value,
        session: &mut Session,
    ) -> Outcome<Value> {
        if matches!(last, Value::Node(_)) {
            return Ok(last);
        }
        let text = last.as_text().unwrap_or_default();
        match self.cleaner.parse(&text, mode, substitutions) {
            Ok(doc) => Ok(Value::Node(NodeRef::root(Arc::new(doc)))),
            Err(err) => {
                self.step_failed(session, &mode.to_string(), &err)?;
                Ok(Value::Null)
            }
        }
    }

    async fn fetch(&self, fetch: &FetchCommand, last: Value, session: &mut Session) -> Outcome<Value> {
        if !fetch.runs_on(session.page()) {
            debug!(
                session_id = %session.id(),
                page = session.page(),
                min_page = fetch.min_page,
                max_page = ?fetch.max_page,
                "Fetch skipped on this page"
            );
            return Ok(if last.is_null() {
                Value::Scalar(String::new())
            } else {
                last
            });
        }

        let raw_url = match &fetch.url {
            Some(url) => session.bag().resolve(url),
            None => last.as_text(),
        };
        let url = match raw_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
            Some(raw) => match resolve_url(session.base_url(), raw) {
                Ok(url) => url,
                Err(err) => {
                    self.step_failed(session, "fetch", &err)?;
                    return Ok(Value::Null);
                }
            },
            None => {
                self.step_failed(session, "fetch", &"no URL to fetch")?;
                return Ok(Value::Null);
            }
        };

        let mut request = FetchRequest {
            method: fetch.method,
            url: url.to_string(),
            query: expand_params(&fetch.params, session.bag()),
            form: expand_params(&fetch.forms, session.bag()),
            cookies: Vec::new(),
            encoding: fetch.encoding.clone(),
        };

        let mut attempt = 0;
        loop {
            if session.is_halted() {
                info!(session_id = %session.id(), url = %request.url, "Wrapper halted; fetch skipped");
                return Ok(Value::Null);
            }
            if session.cookies_enabled() {
                request.cookies = session.cookies().to_vec();
            }

            let request_id = self.ids.next_id();
            self.diagnostics.write_url(&request_id, &request);
            info!(
                session_id = %session.id(),
                page = session.page(),
                request_id = %request_id,
                method = %request.method,
                url = %request.url,
                attempt,
                "Fetching"
            );

            match self.fetch_once(&request).await {
                Ok(response) => {
                    session.add_cookies(&response.set_cookies);
                    match Url::parse(&response.final_url) {
                        Ok(final_url) => session.set_base_url(final_url),
                        Err(_) => session.set_base_url(url.clone()),
                    }
                    return Ok(Value::Scalar(response.body));
                }
                Err(err) => {
                    self.step_failed(session, "fetch", &err)?;
                    let delay = self.config.retry.delay_for(attempt);
                    attempt += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn fetch_once(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let response = self.fetcher.fetch(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(FetchError::Status {
                status: response.status,
                url: response.final_url,
            })
        }
    }
}

fn resolve_url(base: Option<&Url>, raw: &str) -> Result<Url, FetchError> {
    let resolved = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };
    resolved.map_err(|err| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })
}

/// Expands request parameters against the bag.
///
/// Literal values pass through. A `$name` value reads the property: a list
/// repeats the parameter once per item, an `a=1&b=2` blob is split into its
/// own pairs, and a missing property drops the parameter.
pub(crate) fn expand_params(params: &[Param], bag: &PropertyBag) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for param in params {
        let Some(name) = param.value.strip_prefix('$') else {
            pairs.push((param.name.clone(), param.value.clone()));
            continue;
        };
        match bag.get(name) {
            Some(Value::List(items)) => pairs.extend(
                items
                    .iter()
                    .filter_map(Value::as_text)
                    .map(|item| (param.name.clone(), item)),
            ),
            Some(value) => match value.as_text() {
                Some(text) if text.contains('&') && text.contains('=') => pairs.extend(
                    url::form_urlencoded::parse(text.as_bytes())
                        .map(|(key, value)| (key.into_owned(), value.into_owned())),
                ),
                Some(text) => pairs.push((param.name.clone(), text)),
                None => debug!(parameter = %param.name, property = name, "Property has no text"),
            },
            None => debug!(parameter = %param.name, property = name, "Property missing; parameter skipped"),
        }
    }
    pairs
}
