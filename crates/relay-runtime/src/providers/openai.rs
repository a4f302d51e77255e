use crate::factory::{ChatCompletionHooks, GenerateObjectConfig, ProviderConfig, ResponsesModelMatcher};

pub const BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI`, with search and pro models routed through the responses API
pub fn config() -> ProviderConfig {
    let responses_models = || {
        vec![
            ResponsesModelMatcher::Substring("-search-".to_owned()),
            ResponsesModelMatcher::Substring("-pro".to_owned()),
        ]
    };

    ProviderConfig {
        chat_completion: ChatCompletionHooks {
            use_response_models: responses_models(),
            ..ChatCompletionHooks::default()
        },
        generate_object: GenerateObjectConfig {
            use_response_models: responses_models(),
            ..GenerateObjectConfig::default()
        },
        ..ProviderConfig::new("openai", BASE_URL)
    }
}
