//! Runtime factory
//!
//! A [`RuntimeFactory`] turns a declarative [`ProviderConfig`] into
//! [`OpenAiCompatibleRuntime`] instances bound to one credential and endpoint.
//! All vendor differences live in the config; the runtime itself carries no
//! per-vendor branches.

mod chat;
pub mod config;
mod image;
mod models;
mod object;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use http::HeaderMap;
use secrecy::SecretString;

pub use config::{
    ChatCompletionHooks, CreateImageHook, DebugConfig, DebugPredicate, ErrorHook, GenerateObjectConfig,
    ModelsFetcher, ModelsStrategy, PayloadHook, ProviderConfig, ResponsesHooks, ResponsesModelMatcher, SchemaHook,
    StreamBizErrorHook, StreamHook, TransformModelHook, TransformResponseHook,
};
pub use models::{CHAT_MODELS_BLOCK_LIST, KNOWN_MODELS, KnownModel, released_at};

use crate::error::{ErrorClassifier, RuntimeError};
use crate::stream::{EventStream, SseStream, StreamCallbacks, StreamSettings, into_sse};
use crate::transport::Transport;
use crate::types::{
    ApiMode, ChatOptions, ChatPayload, CreateImagePayload, CreateImageResponse, GenerateObjectOptions,
    GenerateObjectOutput, GenerateObjectPayload, ModelCard, StreamChunk,
};

/// Models that only work through the responses API
pub const RESPONSES_API_MODELS: &[&str] = &[
    "codex-mini-latest",
    "computer-use-preview",
    "gpt-5-codex",
    "gpt-5-pro",
    "o1-pro",
    "o3-deep-research",
    "o3-pro",
    "o4-mini-deep-research",
];

/// Inputs for deciding between chat completions and the responses API
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesRouting<'a> {
    /// Explicit caller choice; wins over everything else
    pub user_api_mode: Option<ApiMode>,
    /// Per-call request for the responses API
    pub response_api: bool,
    /// Provider-wide switch
    pub use_response: bool,
    pub use_response_models: &'a [ResponsesModelMatcher],
}

/// Whether `model` should be served through the responses API
pub fn should_use_responses(model: &str, routing: ResponsesRouting<'_>) -> bool {
    match routing.user_api_mode {
        Some(ApiMode::Responses) => return true,
        Some(ApiMode::ChatCompletion) => return false,
        None => {}
    }

    routing.response_api
        || routing.use_response
        || routing.use_response_models.iter().any(|m| m.matches(model))
        || RESPONSES_API_MODELS.contains(&model)
}

/// Per-instance construction options
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub api_key: Option<String>,
    /// Overrides the provider's compiled-in base URL
    pub base_url: Option<String>,
    /// Instance id reported in errors; defaults to the provider id
    pub id: Option<String>,
    /// Merged over the provider's default headers
    pub default_headers: HeaderMap,
    /// Inline hosted images as base64 before sending
    pub vision_base64: bool,
    /// Log raw upstream traffic regardless of the provider's debug predicates
    pub debug: bool,
}

/// Builds runtimes for one provider
#[derive(Debug, Clone)]
pub struct RuntimeFactory {
    config: Arc<ProviderConfig>,
}

impl RuntimeFactory {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Create a runtime instance
    ///
    /// # Errors
    ///
    /// Returns the provider's invalid-API-key error when neither the options
    /// nor the provider config supply a non-blank key.
    pub fn create(&self, options: RuntimeOptions) -> Result<OpenAiCompatibleRuntime, RuntimeError> {
        OpenAiCompatibleRuntime::new(Arc::clone(&self.config), options)
    }
}

/// Operations every runtime exposes
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Instance id
    fn id(&self) -> &str;

    /// Run a chat and return a normalized event stream
    async fn chat(&self, payload: ChatPayload, options: ChatOptions) -> Result<ChatResponse, RuntimeError>;

    /// List the provider's chat models
    async fn models(&self) -> Result<Vec<ModelCard>, RuntimeError>;

    /// Produce structured output; `None` when the model's output cannot be parsed
    async fn generate_object(
        &self,
        payload: GenerateObjectPayload,
        options: GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError>;

    /// Generate or edit an image
    async fn create_image(&self, payload: CreateImagePayload) -> Result<CreateImageResponse, RuntimeError>;
}

/// Streaming chat result
pub struct ChatResponse {
    pub headers: HeaderMap,
    events: EventStream,
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatResponse")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl ChatResponse {
    pub fn new(headers: HeaderMap, events: EventStream) -> Self {
        Self { headers, events }
    }

    pub fn into_events(self) -> EventStream {
        self.events
    }

    /// SSE-encoded body (`id`, `event`, `data` lines per chunk)
    pub fn into_sse(self) -> SseStream {
        into_sse(self.events)
    }

    /// Drain the stream, stopping at the first error
    pub async fn collect(self) -> Result<Vec<StreamChunk>, RuntimeError> {
        let mut events = self.events;
        let mut chunks = Vec::new();
        while let Some(chunk) = events.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }
}

/// Runtime for one OpenAI-compatible endpoint and credential
#[derive(Clone)]
pub struct OpenAiCompatibleRuntime {
    id: String,
    config: Arc<ProviderConfig>,
    transport: Transport,
    classifier: ErrorClassifier,
    vision_base64: bool,
    debug: bool,
}

impl std::fmt::Debug for OpenAiCompatibleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleRuntime")
            .field("id", &self.id)
            .field("provider", &self.config.provider)
            .field("base_url", &self.transport.base_url())
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleRuntime {
    fn new(config: Arc<ProviderConfig>, options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let base_url = non_blank(options.base_url.as_deref()).unwrap_or(&config.base_url).to_owned();
        let id = non_blank(options.id.as_deref()).unwrap_or(&config.provider).to_owned();

        let classifier = ErrorClassifier::new(&config.provider, &base_url, &config.base_url)
            .with_error_types(config.error_type)
            .with_handle_error(config.chat_completion.handle_error.clone())
            .with_stream_biz_error_type(config.chat_completion.handle_stream_biz_error_type.clone());

        let Some(api_key) = non_blank(options.api_key.as_deref()).or_else(|| non_blank(config.api_key.as_deref()))
        else {
            tracing::warn!(provider = %config.provider, "runtime created without an API key");
            return Err(classifier.missing_api_key().into());
        };

        let mut headers = config.default_headers.clone();
        headers.extend(options.default_headers);

        let transport = Transport::new(&base_url, SecretString::from(api_key.to_owned()), headers);

        tracing::debug!(provider = %config.provider, id = %id, base_url = %transport.base_url(), "runtime created");

        Ok(Self {
            id,
            config,
            transport,
            classifier,
            vision_base64: options.vision_base64,
            debug: options.debug,
        })
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    fn debug_chat_completion(&self) -> bool {
        self.debug || self.config.debug.chat_completion.as_ref().is_some_and(|p| p())
    }

    fn debug_responses(&self) -> bool {
        self.debug || self.config.debug.responses.as_ref().is_some_and(|p| p())
    }

    fn stream_settings(&self, input_start_at: Instant, callbacks: Option<Arc<dyn StreamCallbacks>>) -> StreamSettings {
        StreamSettings {
            classifier: self.classifier.clone(),
            input_start_at,
            callbacks,
        }
    }
}

#[async_trait]
impl ModelRuntime for OpenAiCompatibleRuntime {
    fn id(&self) -> &str {
        &self.id
    }

    async fn chat(&self, payload: ChatPayload, options: ChatOptions) -> Result<ChatResponse, RuntimeError> {
        self.chat_impl(payload, options).await
    }

    async fn models(&self) -> Result<Vec<ModelCard>, RuntimeError> {
        self.models_impl().await
    }

    async fn generate_object(
        &self,
        payload: GenerateObjectPayload,
        options: GenerateObjectOptions,
    ) -> Result<Option<GenerateObjectOutput>, RuntimeError> {
        self.generate_object_impl(payload, options).await
    }

    async fn create_image(&self, payload: CreateImagePayload) -> Result<CreateImageResponse, RuntimeError> {
        self.create_image_impl(payload).await
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
