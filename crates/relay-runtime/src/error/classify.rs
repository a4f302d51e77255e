use serde_json::{Value, json};

use super::{
    ABORT_ERROR_MESSAGE, ABORT_ERROR_NAME, AgentRuntimeErrorType, ChatCompletionError, RuntimeError, TransportError,
    desensitize_url,
};
use crate::factory::config::{ErrorHook, StreamBizErrorHook};

/// Provider-specific replacements for the two configurable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorTypeOverrides {
    /// Used for vendor errors with no more specific classification
    pub biz_error: AgentRuntimeErrorType,
    /// Used for HTTP 401 and missing credentials
    pub invalid_api_key: AgentRuntimeErrorType,
}

impl Default for ErrorTypeOverrides {
    fn default() -> Self {
        Self {
            biz_error: AgentRuntimeErrorType::ProviderBizError,
            invalid_api_key: AgentRuntimeErrorType::InvalidProviderApiKey,
        }
    }
}

/// Classification returned by a provider's `handle_error` hook
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorOverride {
    pub error_type: AgentRuntimeErrorType,
    /// Replacement error detail; the upstream detail is kept when `None`
    pub error: Option<Value>,
}

/// Maps transport and vendor failures onto [`AgentRuntimeErrorType`]
#[derive(Clone)]
pub struct ErrorClassifier {
    provider: String,
    endpoint: String,
    error_types: ErrorTypeOverrides,
    handle_error: Option<ErrorHook>,
    handle_stream_biz_error_type: Option<StreamBizErrorHook>,
}

impl ErrorClassifier {
    /// Build a classifier for a runtime talking to `base_url`
    ///
    /// The reported endpoint is masked unless `base_url` is the provider's
    /// compiled-in default.
    pub fn new(provider: impl Into<String>, base_url: &str, default_base_url: &str) -> Self {
        let endpoint = if base_url.trim_end_matches('/') == default_base_url.trim_end_matches('/') {
            base_url.to_owned()
        } else {
            desensitize_url(base_url)
        };

        Self {
            provider: provider.into(),
            endpoint,
            error_types: ErrorTypeOverrides::default(),
            handle_error: None,
            handle_stream_biz_error_type: None,
        }
    }

    #[must_use]
    pub const fn with_error_types(mut self, error_types: ErrorTypeOverrides) -> Self {
        self.error_types = error_types;
        self
    }

    #[must_use]
    pub fn with_handle_error(mut self, hook: Option<ErrorHook>) -> Self {
        self.handle_error = hook;
        self
    }

    #[must_use]
    pub fn with_stream_biz_error_type(mut self, hook: Option<StreamBizErrorHook>) -> Self {
        self.handle_stream_biz_error_type = hook;
        self
    }

    /// Endpoint as it appears in classified errors
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Classify a transport failure
    pub fn classify(&self, error: &TransportError) -> ChatCompletionError {
        if let Some(hook) = &self.handle_error
            && let Some(custom) = hook(error)
        {
            tracing::debug!(provider = %self.provider, error_type = %custom.error_type, "custom error classification");
            return self.build(custom.error_type, custom.error.or_else(|| Some(detail(error))));
        }

        let Some(status) = error.status() else {
            return self.build(AgentRuntimeErrorType::AgentRuntimeError, Some(detail(error)));
        };

        let detail = detail(error);

        match status.as_u16() {
            401 => return self.build(self.error_types.invalid_api_key, Some(detail)),
            403 => return self.build(AgentRuntimeErrorType::LocationNotSupport, Some(detail)),
            _ => {}
        }

        if message_of(&detail).is_some_and(|m| m.contains("Insufficient Balance")) {
            return self.build(AgentRuntimeErrorType::InsufficientQuota, Some(detail));
        }

        let error_type = match detail.get("code").and_then(Value::as_str) {
            Some("insufficient_quota") => AgentRuntimeErrorType::InsufficientQuota,
            Some("model_not_found") => AgentRuntimeErrorType::ModelNotFound,
            Some("context_length_exceeded" | "string_above_max_length") => {
                AgentRuntimeErrorType::ExceededContextWindow
            }
            _ => self.error_types.biz_error,
        };

        self.build(error_type, Some(detail))
    }

    /// Classify any runtime error, leaving already classified ones untouched
    pub fn classify_runtime(&self, error: RuntimeError) -> RuntimeError {
        match error {
            RuntimeError::Chat(_) => error,
            RuntimeError::Upstream(transport) => self.classify(&transport).into(),
            RuntimeError::InvalidRequest(message) | RuntimeError::Image(message) => self
                .build(
                    AgentRuntimeErrorType::AgentRuntimeError,
                    Some(json!({ "name": "Error", "message": message })),
                )
                .into(),
        }
    }

    /// Classify an `error` object delivered inside an otherwise healthy stream
    pub fn classify_stream_error(&self, body: &Value) -> ChatCompletionError {
        let detail = body.get("error").cloned().unwrap_or_else(|| body.clone());
        let error_type = self
            .handle_stream_biz_error_type
            .as_ref()
            .and_then(|hook| hook(&detail))
            .unwrap_or(AgentRuntimeErrorType::ProviderBizError);

        self.build(error_type, Some(detail))
    }

    /// Error for a runtime constructed without credentials
    pub fn missing_api_key(&self) -> ChatCompletionError {
        ChatCompletionError {
            error_type: self.error_types.invalid_api_key,
            error: None,
            provider: self.provider.clone(),
            endpoint: None,
        }
    }

    fn build(&self, error_type: AgentRuntimeErrorType, error: Option<Value>) -> ChatCompletionError {
        ChatCompletionError {
            error_type,
            error,
            provider: self.provider.clone(),
            endpoint: Some(self.endpoint.clone()),
        }
    }
}

/// Structured detail of a transport failure
fn detail(error: &TransportError) -> Value {
    match error {
        TransportError::Status { status, body } => {
            let mut detail = match body.get("error") {
                Some(inner @ Value::Object(_)) => inner.clone(),
                Some(Value::String(message)) => json!({ "message": message }),
                _ if body.is_object() => body.clone(),
                _ => json!({ "message": body }),
            };
            if let Value::Object(map) = &mut detail {
                map.entry("status").or_insert_with(|| json!(status.as_u16()));
            }
            detail
        }
        TransportError::Aborted => json!({ "name": ABORT_ERROR_NAME, "message": ABORT_ERROR_MESSAGE }),
        TransportError::Network(e) => {
            let name = if e.is_timeout() { "TimeoutError" } else { "APIConnectionError" };
            json!({ "name": name, "message": e.to_string() })
        }
        TransportError::Decode(message) => json!({ "name": "DecodeError", "message": message }),
    }
}

fn message_of(detail: &Value) -> Option<&str> {
    detail.get("message").and_then(Value::as_str)
}
