use std::sync::Arc;

use serde_json::Value;

use crate::factory::{ChatCompletionHooks, ModelsStrategy, ProviderConfig, released_at};
use crate::protocol::openai::ModelObject;
use crate::types::{ChatPayload, ModelCard};

pub const BASE_URL: &str = "https://api.groq.com/openai/v1";

const FUNCTION_CALL_MODELS: &[&str] = &["llama-3.1", "llama-3.3", "llama3-groq", "tool-use", "qwen", "kimi-k2"];

/// Groq
pub fn config() -> ProviderConfig {
    ProviderConfig {
        chat_completion: ChatCompletionHooks {
            handle_payload: Some(Arc::new(handle_payload)),
            ..ChatCompletionHooks::default()
        },
        models: ModelsStrategy::Transform(Arc::new(transform_model)),
        ..ProviderConfig::new("groq", BASE_URL)
    }
}

/// Groq rejects non-positive temperatures
fn handle_payload(mut payload: ChatPayload) -> ChatPayload {
    payload.temperature = payload.temperature.filter(|t| *t > 0.0);
    payload
}

fn transform_model(model: &ModelObject) -> ModelCard {
    let id = model.id.to_ascii_lowercase();

    ModelCard {
        context_window_tokens: model.extra.get("context_window").and_then(Value::as_u64),
        function_call: Some(FUNCTION_CALL_MODELS.iter().any(|m| id.contains(m))),
        vision: Some(id.contains("vision") || id.contains("llama-4")),
        reasoning: Some(id.contains("deepseek-r1") || id.contains("qwq")),
        released_at: model.created.as_ref().and_then(released_at),
        enabled: Some(true),
        ..ModelCard::new(model.id.clone())
    }
}
