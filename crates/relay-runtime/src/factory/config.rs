//! Declarative provider configuration
//!
//! A provider is plain data plus optional strategy closures. Every hook is
//! `Arc<dyn Fn ...>` so configs are cheap to clone and share across runtimes.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::HeaderMap;
use regex::Regex;
use serde_json::Value;

use crate::error::{AgentRuntimeErrorType, ErrorOverride, ErrorTypeOverrides, RuntimeError, TransportError};
use crate::protocol::openai::{ChatCompletion, ModelObject};
use crate::stream::{ByteStream, EventStream, StreamSettings};
use crate::transport::Transport;
use crate::types::{ChatPayload, CreateImagePayload, CreateImageResponse, ModelCard};

/// Rewrites the chat payload before it is sent
pub type PayloadHook = Arc<dyn Fn(ChatPayload) -> ChatPayload + Send + Sync>;

/// Replaces the default stream normalizer
pub type StreamHook = Arc<dyn Fn(ByteStream, StreamSettings) -> EventStream + Send + Sync>;

/// Replays a complete chat completion as chunk-shaped frames
pub type TransformResponseHook = Arc<dyn Fn(&ChatCompletion) -> Vec<Value> + Send + Sync>;

/// Consulted before the default error classification
pub type ErrorHook = Arc<dyn Fn(&TransportError) -> Option<ErrorOverride> + Send + Sync>;

/// Classifies an `error` object delivered inside a stream
pub type StreamBizErrorHook = Arc<dyn Fn(&Value) -> Option<AgentRuntimeErrorType> + Send + Sync>;

/// Rewrites a JSON schema before it is sent
pub type SchemaHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Decides at call time whether raw upstream traffic is logged
pub type DebugPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Maps one `/models` entry to a model card
pub type TransformModelHook = Arc<dyn Fn(&ModelObject) -> ModelCard + Send + Sync>;

/// Fetches the model list from an arbitrary catalog
pub type ModelsFetcher =
    Arc<dyn Fn(Transport) -> BoxFuture<'static, Result<Vec<ModelCard>, RuntimeError>> + Send + Sync>;

/// Replaces the default image pipeline
pub type CreateImageHook = Arc<
    dyn Fn(CreateImagePayload, Transport) -> BoxFuture<'static, Result<CreateImageResponse, RuntimeError>>
        + Send
        + Sync,
>;

/// Selects models that must use the responses API
#[derive(Debug, Clone)]
pub enum ResponsesModelMatcher {
    /// Model id contains this string
    Substring(String),
    /// Model id matches this pattern
    Pattern(Regex),
}

impl ResponsesModelMatcher {
    pub fn matches(&self, model: &str) -> bool {
        match self {
            Self::Substring(needle) => model.contains(needle.as_str()),
            Self::Pattern(pattern) => pattern.is_match(model),
        }
    }
}

/// How `models()` obtains its list
#[derive(Clone, Default)]
pub enum ModelsStrategy {
    /// `GET /models`, block-list filtering and the known-model table
    #[default]
    Default,
    /// `GET /models` and block-list filtering, then this transform per entry
    Transform(TransformModelHook),
    /// Delegate entirely
    Custom(ModelsFetcher),
}

/// Chat behaviour overrides
#[derive(Clone, Default)]
pub struct ChatCompletionHooks {
    pub handle_payload: Option<PayloadHook>,
    pub handle_stream: Option<StreamHook>,
    pub handle_transform_response_to_stream: Option<TransformResponseHook>,
    pub handle_error: Option<ErrorHook>,
    pub handle_stream_biz_error_type: Option<StreamBizErrorHook>,
    /// Never send the caller's `user` id
    pub no_user_id: bool,
    /// Never request `stream_options.include_usage`
    pub exclude_usage: bool,
    /// Route every chat through the responses API
    pub use_response: bool,
    pub use_response_models: Vec<ResponsesModelMatcher>,
}

/// Responses API overrides
#[derive(Clone, Default)]
pub struct ResponsesHooks {
    pub handle_payload: Option<PayloadHook>,
}

/// Structured output behaviour
#[derive(Clone, Default)]
pub struct GenerateObjectConfig {
    pub handle_schema: Option<SchemaHook>,
    pub use_response: bool,
    pub use_response_models: Vec<ResponsesModelMatcher>,
    /// Emulate schema output with a single forced tool call
    pub use_tools_calling: bool,
}

/// Raw traffic logging switches
#[derive(Clone, Default)]
pub struct DebugConfig {
    pub chat_completion: Option<DebugPredicate>,
    pub responses: Option<DebugPredicate>,
}

/// Everything that distinguishes one OpenAI-compatible vendor from another
#[derive(Clone, Default)]
pub struct ProviderConfig {
    /// Provider id, reported in errors
    pub provider: String,
    /// Compiled-in base URL
    pub base_url: String,
    /// Fallback key for servers that ignore authentication
    pub api_key: Option<String>,
    pub default_headers: HeaderMap,
    pub chat_completion: ChatCompletionHooks,
    pub responses: ResponsesHooks,
    pub generate_object: GenerateObjectConfig,
    pub debug: DebugConfig,
    pub models: ModelsStrategy,
    pub error_type: ErrorTypeOverrides,
    pub create_image: Option<CreateImageHook>,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("no_user_id", &self.chat_completion.no_user_id)
            .field("exclude_usage", &self.chat_completion.exclude_usage)
            .field("use_response", &self.chat_completion.use_response)
            .field("use_tools_calling", &self.generate_object.use_tools_calling)
            .field("error_type", &self.error_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matchers() {
        assert!(ResponsesModelMatcher::Substring("gpt-5".to_owned()).matches("openai/gpt-5-mini"));
        assert!(!ResponsesModelMatcher::Substring("gpt-5".to_owned()).matches("gpt-4o"));

        let pattern = ResponsesModelMatcher::Pattern(Regex::new(r"^o\d-pro").unwrap());
        assert!(pattern.matches("o3-pro-2025"));
        assert!(!pattern.matches("gpt-o3-pro"));
    }
}
