use std::sync::Arc;

use crate::factory::{ChatCompletionHooks, ProviderConfig};
use crate::types::{ChatPayload, Content, Role};

pub const BASE_URL: &str = "https://api.moonshot.cn/v1";

/// Moonshot (Kimi)
pub fn config() -> ProviderConfig {
    ProviderConfig {
        chat_completion: ChatCompletionHooks {
            handle_payload: Some(Arc::new(handle_payload)),
            ..ChatCompletionHooks::default()
        },
        ..ProviderConfig::new("moonshot", BASE_URL)
    }
}

/// Moonshot's temperature range is half of `OpenAI`'s and it rejects empty
/// assistant turns
fn handle_payload(mut payload: ChatPayload) -> ChatPayload {
    payload.temperature = payload.temperature.map(|t| t / 2.0);

    for message in &mut payload.messages {
        if message.role == Role::Assistant && message.content.text().is_empty() && message.tool_calls.is_none() {
            message.content = Content::Text(" ".to_owned());
        }
    }
    payload
}
