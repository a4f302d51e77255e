//! Error taxonomy and classification

mod classify;
mod desensitize;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use classify::{ErrorClassifier, ErrorOverride, ErrorTypeOverrides};
pub use desensitize::desensitize_url;

/// Closed set of error kinds callers can compare against
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum AgentRuntimeErrorType {
    /// Authentication rejected by the provider
    #[serde(rename = "InvalidProviderAPIKey")]
    #[strum(serialize = "InvalidProviderAPIKey")]
    InvalidProviderApiKey,
    /// Geographic or access restriction
    #[serde(rename = "LocationNotSupportError")]
    #[strum(serialize = "LocationNotSupportError")]
    LocationNotSupport,
    /// Vendor-reported API error
    ProviderBizError,
    /// Anything unclassified, including caller aborts
    AgentRuntimeError,
    InsufficientQuota,
    QuotaLimitReached,
    ModelNotFound,
    ExceededContextWindow,
    PermissionDenied,
    InvalidRequest,
}

/// Classified failure of a runtime call
///
/// `endpoint` is already desensitized when the runtime points at a custom host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{error_type} from provider `{provider}`{}", describe(.error.as_ref()))]
pub struct ChatCompletionError {
    pub error_type: AgentRuntimeErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ChatCompletionError {
    /// Whether the call was cancelled by the caller rather than rejected upstream
    pub fn is_abort(&self) -> bool {
        self.error_type == AgentRuntimeErrorType::AgentRuntimeError
            && self
                .error
                .as_ref()
                .and_then(|e| e.get("name"))
                .and_then(Value::as_str)
                == Some(ABORT_ERROR_NAME)
    }

    /// Human readable message from the underlying error detail, if any
    pub fn message(&self) -> Option<&str> {
        let error = self.error.as_ref()?;
        error
            .get("message")
            .or_else(|| error.get("error").and_then(|inner| inner.get("message")))
            .and_then(Value::as_str)
    }
}

fn describe(error: Option<&Value>) -> String {
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

pub(crate) const ABORT_ERROR_NAME: &str = "AbortError";
pub(crate) const ABORT_ERROR_MESSAGE: &str = "The user aborted a request.";

/// Failure talking to the upstream HTTP API
#[derive(Debug, Error)]
pub enum TransportError {
    /// Upstream answered with a non-success status
    #[error("upstream returned {status}")]
    Status { status: StatusCode, body: Value },

    /// Connection, TLS or body read failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Cancelled through the caller's signal
    #[error("The user aborted a request.")]
    Aborted,
}

impl TransportError {
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn body(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Errors returned by runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Classified upstream or runtime failure
    #[error(transparent)]
    Chat(#[from] ChatCompletionError),

    /// Caller supplied an unusable request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unclassified transport failure (model listing propagates these as-is)
    #[error(transparent)]
    Upstream(#[from] TransportError),

    /// Image pipeline failure
    #[error("{0}")]
    Image(String),
}

impl RuntimeError {
    /// Classified form of this error, if it has been classified
    pub const fn as_chat(&self) -> Option<&ChatCompletionError> {
        match self {
            Self::Chat(error) => Some(error),
            _ => None,
        }
    }

    pub fn error_type(&self) -> Option<AgentRuntimeErrorType> {
        self.as_chat().map(|e| e.error_type)
    }

    pub fn is_abort(&self) -> bool {
        match self {
            Self::Chat(error) => error.is_abort(),
            Self::Upstream(TransportError::Aborted) => true,
            _ => false,
        }
    }
}
