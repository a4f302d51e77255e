use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;

use crate::error::{AgentRuntimeErrorType, ErrorOverride, TransportError};
use crate::factory::{ChatCompletionHooks, ProviderConfig};

pub const BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// `SiliconCloud`
///
/// A 403 means the account lacks access to the model, not a region block.
pub fn config() -> ProviderConfig {
    ProviderConfig {
        chat_completion: ChatCompletionHooks {
            handle_error: Some(Arc::new(handle_error)),
            handle_stream_biz_error_type: Some(Arc::new(stream_error_type)),
            ..ChatCompletionHooks::default()
        },
        ..ProviderConfig::new("siliconcloud", BASE_URL)
    }
}

fn handle_error(error: &TransportError) -> Option<ErrorOverride> {
    (error.status() == Some(StatusCode::FORBIDDEN)).then_some(ErrorOverride {
        error_type: AgentRuntimeErrorType::PermissionDenied,
        error: None,
    })
}

fn stream_error_type(detail: &Value) -> Option<AgentRuntimeErrorType> {
    let message = detail.get("message").and_then(Value::as_str)?;
    message
        .to_ascii_lowercase()
        .contains("rate limit")
        .then_some(AgentRuntimeErrorType::QuotaLimitReached)
}
