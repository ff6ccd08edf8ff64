// Taskweave — Action handlers and dispatch

pub mod factory;
pub mod github;
pub mod gmail;
pub mod notion;
pub mod text;
pub mod transform;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use factory::build_dispatcher;

pub type Params = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure raised by a handler while performing an action.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("action '{0}' is not supported")]
    Unsupported(String),
    #[error("missing required parameter '{0}'")]
    MissingParam(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

/// Failure surfaced by the dispatcher to the engine.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unsupported action '{action}' for step type '{step_type}'")]
    UnsupportedAction { step_type: String, action: String },
    #[error("action '{action}' on '{step_type}' failed: {message}")]
    ActionExecution {
        step_type: String,
        action: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Step type this handler serves, e.g. `text-generation`.
    fn step_type(&self) -> &str;

    /// Additional step type names routed to this handler.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    /// Action names accepted by [`perform`](Self::perform).
    fn actions(&self) -> &[&str];

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError>;
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Handler table keyed by step type. Built once, then shared read-only.
#[derive(Clone, Default)]
pub struct ActionDispatcher {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its step type and aliases. A later
    /// registration for the same name replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let mut names = vec![handler.step_type().to_string()];
        names.extend(handler.aliases().iter().map(|a| a.to_string()));
        for name in names {
            if self.handlers.insert(name.clone(), handler.clone()).is_some() {
                tracing::warn!(step_type = %name, "Replacing action handler");
            }
        }
        self
    }

    pub fn with(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(handler);
        self
    }

    pub async fn dispatch(
        &self,
        step_type: &str,
        action: &str,
        params: &Params,
    ) -> Result<Value, DispatchError> {
        let unsupported = || DispatchError::UnsupportedAction {
            step_type: step_type.to_string(),
            action: action.to_string(),
        };

        let handler = self.handlers.get(step_type).ok_or_else(|| {
            tracing::error!(step_type = %step_type, action = %action, "No handler registered");
            unsupported()
        })?;

        if !handler.actions().contains(&action) {
            tracing::error!(step_type = %step_type, action = %action, "Action not supported by handler");
            return Err(unsupported());
        }

        tracing::info!(step_type = %step_type, action = %action, "Dispatching action");
        let start = std::time::Instant::now();
        let result = handler.perform(action, params).await;
        let duration = start.elapsed();

        match result {
            Ok(output) => {
                tracing::info!(step_type = %step_type, action = %action, duration_ms = %duration.as_millis(), "Action completed");
                Ok(output)
            }
            Err(ActionError::Unsupported(_)) => Err(unsupported()),
            Err(e) => {
                tracing::error!(step_type = %step_type, action = %action, duration_ms = %duration.as_millis(), error = %e, "Action failed");
                Err(DispatchError::ActionExecution {
                    step_type: step_type.to_string(),
                    action: action.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    pub fn supports(&self, step_type: &str, action: &str) -> bool {
        self.handlers
            .get(step_type)
            .is_some_and(|h| h.actions().contains(&action))
    }

    /// Registered step types (aliases included) with their actions, sorted.
    pub fn handlers(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<_> = self
            .handlers
            .iter()
            .map(|(name, h)| {
                (
                    name.clone(),
                    h.actions().iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

pub(crate) fn required_str<'a>(params: &'a Params, name: &str) -> Result<&'a str, ActionError> {
    match params.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ActionError::InvalidParam {
            name: name.to_string(),
            reason: "expected a string".into(),
        }),
        None => Err(ActionError::MissingParam(name.to_string())),
    }
}

pub(crate) fn optional_str<'a>(params: &'a Params, name: &str) -> Result<Option<&'a str>, ActionError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required_str(params, name).map(Some),
    }
}

/// Numbers arrive either as JSON numbers or, after interpolation, as strings.
pub(crate) fn optional_u64(params: &Params, name: &str) -> Result<Option<u64>, ActionError> {
    let invalid = || ActionError::InvalidParam {
        name: name.to_string(),
        reason: "expected a non-negative integer".into(),
    };
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

pub(crate) fn optional_f64(params: &Params, name: &str) -> Result<Option<f64>, ActionError> {
    let invalid = || ActionError::InvalidParam {
        name: name.to_string(),
        reason: "expected a number".into(),
    };
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Accepts a JSON array, a JSON array as text (an interpolated list), or a
/// comma-separated string.
pub(crate) fn optional_string_list(params: &Params, name: &str) -> Result<Vec<String>, ActionError> {
    let invalid = || ActionError::InvalidParam {
        name: name.to_string(),
        reason: "expected an array of strings".into(),
    };
    let strings = |items: &[Value]| -> Result<Vec<String>, ActionError> {
        items
            .iter()
            .map(|v| v.as_str().map(String::from).ok_or_else(invalid))
            .collect()
    };

    match params.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => strings(items),
        Some(Value::String(s)) if s.trim_start().starts_with('[') => {
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(items)) => strings(&items),
                _ => Err(invalid()),
            }
        }
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()),
        Some(_) => Err(invalid()),
    }
}

/// Structured param that may arrive as JSON text after interpolation.
pub(crate) fn json_param<'a>(params: &'a Params, name: &str) -> Result<Cow<'a, Value>, ActionError> {
    match params.get(name) {
        None => Err(ActionError::MissingParam(name.to_string())),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map(Cow::Owned)
            .map_err(|e| ActionError::InvalidParam {
                name: name.to_string(),
                reason: format!("not a JSON document: {}", e),
            }),
        Some(other) => Ok(Cow::Borrowed(other)),
    }
}

/// RFC 3986 unreserved characters stay literal.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode one URL path segment taken from a parameter.
pub(crate) fn path_segment(name: &str, value: &str) -> Result<String, ActionError> {
    let value = value.trim();
    if value.is_empty() || value == "." || value == ".." {
        return Err(ActionError::InvalidParam {
            name: name.to_string(),
            reason: format!("'{}' is not a valid path segment", value),
        });
    }
    Ok(utf8_percent_encode(value, PATH_SEGMENT).to_string())
}

/// Send a request and decode a JSON body, turning non-2xx into `Api`.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, ActionError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "could not read body".to_string());
        return Err(ActionError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
