use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};

use crate::factory::{ChatCompletionHooks, ModelsStrategy, ProviderConfig, released_at};
use crate::protocol::openai::ModelObject;
use crate::types::{ChatPayload, ModelCard};

pub const BASE_URL: &str = "https://openrouter.ai/api/v1";

/// `OpenRouter`
pub fn config() -> ProviderConfig {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("http-referer"),
        HeaderValue::from_static("https://github.com/relay-rs/relay"),
    );
    headers.insert(HeaderName::from_static("x-title"), HeaderValue::from_static("relay"));

    ProviderConfig {
        default_headers: headers,
        chat_completion: ChatCompletionHooks {
            handle_payload: Some(Arc::new(handle_payload)),
            ..ChatCompletionHooks::default()
        },
        models: ModelsStrategy::Transform(Arc::new(transform_model)),
        ..ProviderConfig::new("openrouter", BASE_URL)
    }
}

/// `OpenRouter` takes reasoning effort as a unified `reasoning` object
fn handle_payload(mut payload: ChatPayload) -> ChatPayload {
    if let Some(effort) = payload.reasoning_effort.take() {
        payload
            .extra
            .insert("reasoning".to_owned(), json!({ "effort": effort }));
    }
    payload
}

fn transform_model(model: &ModelObject) -> ModelCard {
    let parameters: Vec<&str> = model
        .extra
        .get("supported_parameters")
        .and_then(Value::as_array)
        .map(|params| params.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let vision = model
        .extra
        .get("architecture")
        .and_then(|arch| arch.get("input_modalities"))
        .and_then(Value::as_array)
        .is_some_and(|modalities| modalities.iter().any(|m| m == "image"));

    ModelCard {
        display_name: model.extra.get("name").and_then(Value::as_str).map(str::to_owned),
        description: model.extra.get("description").and_then(Value::as_str).map(str::to_owned),
        context_window_tokens: model.extra.get("context_length").and_then(Value::as_u64),
        max_output: model
            .extra
            .get("top_provider")
            .and_then(|top| top.get("max_completion_tokens"))
            .and_then(Value::as_u64),
        function_call: Some(parameters.contains(&"tools")),
        reasoning: Some(parameters.contains(&"reasoning")),
        vision: Some(vision),
        pricing: model.extra.get("pricing").cloned(),
        released_at: model.created.as_ref().and_then(released_at),
        enabled: Some(true),
        ..ModelCard::new(model.id.clone())
    }
}
