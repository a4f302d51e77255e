use jiff::Timestamp;
use jiff::civil::{Date, DateTime};
use jiff::tz::TimeZone;
use serde_json::Value;

use super::{ModelsStrategy, OpenAiCompatibleRuntime};
use crate::error::RuntimeError;
use crate::protocol::openai::{ModelList, ModelObject};
use crate::types::ModelCard;

/// Substrings marking non-chat models in `/models` listings
pub const CHAT_MODELS_BLOCK_LIST: &[&str] = &[
    "embedding",
    "davinci",
    "curie",
    "moderation",
    "ada",
    "babbage",
    "tts",
    "whisper",
    "dall-e",
];

/// Static metadata for a well-known model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownModel {
    pub id: &'static str,
    pub display_name: &'static str,
    pub context_window_tokens: u64,
    pub max_output: Option<u64>,
    pub function_call: bool,
    pub vision: bool,
    pub reasoning: bool,
    pub released_at: Option<&'static str>,
}

impl KnownModel {
    fn card(&self) -> ModelCard {
        ModelCard {
            id: self.id.to_owned(),
            display_name: Some(self.display_name.to_owned()),
            context_window_tokens: Some(self.context_window_tokens),
            max_output: self.max_output,
            function_call: Some(self.function_call),
            vision: Some(self.vision),
            reasoning: Some(self.reasoning),
            released_at: self.released_at.map(str::to_owned),
            enabled: Some(true),
            ..ModelCard::default()
        }
    }
}

const fn known(
    id: &'static str,
    display_name: &'static str,
    context_window_tokens: u64,
    max_output: Option<u64>,
    (function_call, vision, reasoning): (bool, bool, bool),
    released_at: Option<&'static str>,
) -> KnownModel {
    KnownModel {
        id,
        display_name,
        context_window_tokens,
        max_output,
        function_call,
        vision,
        reasoning,
        released_at,
    }
}

/// Models whose metadata is known ahead of time
pub const KNOWN_MODELS: &[KnownModel] = &[
    known("gpt-4o", "GPT-4o", 128_000, Some(16_384), (true, true, false), Some("2024-05-13")),
    known("gpt-4o-mini", "GPT-4o mini", 128_000, Some(16_384), (true, true, false), Some("2024-07-18")),
    known("gpt-4.1", "GPT-4.1", 1_047_576, Some(32_768), (true, true, false), Some("2025-04-14")),
    known("gpt-4.1-mini", "GPT-4.1 mini", 1_047_576, Some(32_768), (true, true, false), Some("2025-04-14")),
    known("gpt-5", "GPT-5", 400_000, Some(128_000), (true, true, true), Some("2025-08-07")),
    known("gpt-5-mini", "GPT-5 mini", 400_000, Some(128_000), (true, true, true), Some("2025-08-07")),
    known("o3", "o3", 200_000, Some(100_000), (true, true, true), Some("2025-04-16")),
    known("o3-mini", "o3-mini", 200_000, Some(100_000), (true, false, true), Some("2025-01-31")),
    known("o3-pro", "o3-pro", 200_000, Some(100_000), (true, true, true), Some("2025-06-10")),
    known("o4-mini", "o4-mini", 200_000, Some(100_000), (true, true, true), Some("2025-04-16")),
    known("deepseek-chat", "DeepSeek V3", 65_536, Some(8_192), (true, false, false), None),
    known("deepseek-reasoner", "DeepSeek R1", 65_536, Some(8_192), (false, false, true), None),
    known("moonshot-v1-128k", "Moonshot V1 128K", 131_072, None, (true, false, false), None),
    known("kimi-k2-0711-preview", "Kimi K2", 131_072, None, (true, false, false), Some("2025-07-11")),
    known("llama-3.3-70b-versatile", "Llama 3.3 70B", 131_072, Some(32_768), (true, false, false), Some("2024-12-06")),
];

/// Known metadata for `id`, matched case-insensitively
pub fn known_model(id: &str) -> Option<&'static KnownModel> {
    KNOWN_MODELS.iter().find(|m| m.id.eq_ignore_ascii_case(id))
}

/// Whether a listed model is a chat model
fn is_chat_model(model: &ModelObject) -> bool {
    let id = model.id.to_ascii_lowercase();
    !CHAT_MODELS_BLOCK_LIST.iter().any(|blocked| id.contains(blocked))
}

/// Normalize a `created` value into a `YYYY-MM-DD` UTC date
///
/// Strings are parsed as dates or timestamps. Numbers with 13 digits are
/// milliseconds, anything else is seconds since the epoch.
pub fn released_at(created: &Value) -> Option<String> {
    let date = match created {
        Value::String(s) => parse_date(s.trim())?,
        Value::Number(n) => {
            let value = n.as_i64().or_else(|| n.as_f64().and_then(round_seconds))?;
            let timestamp = if value.unsigned_abs().to_string().len() == 13 {
                Timestamp::from_millisecond(value)
            } else {
                Timestamp::from_second(value)
            };
            timestamp.ok()?.to_zoned(TimeZone::UTC).date()
        }
        _ => return None,
    };

    Some(date.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn round_seconds(value: f64) -> Option<i64> {
    let rounded = value.round();
    (rounded.is_finite() && rounded.abs() < 9.0e15).then_some(rounded as i64)
}

fn parse_date(s: &str) -> Option<Date> {
    if let Ok(timestamp) = s.parse::<Timestamp>() {
        return Some(timestamp.to_zoned(TimeZone::UTC).date());
    }
    if let Ok(datetime) = s.parse::<DateTime>() {
        return Some(datetime.date());
    }
    if let Ok(millis) = s.parse::<i64>() {
        return released_at(&Value::from(millis)).and_then(|d| d.parse().ok());
    }
    s.parse::<Date>().ok()
}

fn default_card(model: &ModelObject) -> ModelCard {
    let derived = model.created.as_ref().and_then(released_at);

    match known_model(&model.id) {
        Some(known) => {
            let mut card = known.card();
            card.id.clone_from(&model.id);
            card.released_at = card.released_at.or(derived);
            card
        }
        None => ModelCard {
            released_at: derived,
            ..ModelCard::new(model.id.clone())
        },
    }
}

impl OpenAiCompatibleRuntime {
    pub(super) async fn models_impl(&self) -> Result<Vec<ModelCard>, RuntimeError> {
        if let ModelsStrategy::Custom(fetch) = &self.config.models {
            return fetch(self.transport.clone()).await;
        }

        let list: ModelList = self.transport.get_json("models").await.inspect_err(|e| {
            tracing::error!(provider = %self.config.provider, error = %e, "failed to list models");
        })?;

        let cards: Vec<_> = list
            .data
            .iter()
            .filter(|model| is_chat_model(model))
            .map(|model| match &self.config.models {
                ModelsStrategy::Transform(transform) => transform(model),
                _ => default_card(model),
            })
            .collect();

        tracing::debug!(provider = %self.config.provider, listed = list.data.len(), kept = cards.len(), "models listed");

        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn model(id: &str, created: Option<Value>) -> ModelObject {
        ModelObject {
            id: id.to_owned(),
            created,
            ..ModelObject::default()
        }
    }

    #[test]
    fn released_at_handles_seconds_millis_and_strings() {
        assert_eq!(released_at(&json!(1_715_558_400)).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!(1_715_558_400_000_i64)).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!("2024-05-13")).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!("2024-05-13T23:30:00Z")).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!("1715558400000")).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!(1_715_558_400.0)).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!(1_715_558_399.6)).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!(1_715_558_400_000.0)).as_deref(), Some("2024-05-13"));
        assert_eq!(released_at(&json!("not a date")), None);
        assert_eq!(released_at(&json!(null)), None);
    }

    #[test]
    fn block_list_filters_non_chat_models() {
        assert!(is_chat_model(&model("gpt-4o", None)));
        assert!(!is_chat_model(&model("text-embedding-3-small", None)));
        assert!(!is_chat_model(&model("whisper-1", None)));
        assert!(!is_chat_model(&model("DALL-E-3", None)));
        assert!(!is_chat_model(&model("tts-1-hd", None)));
    }

    #[test]
    fn known_models_keep_their_release_date() {
        let card = default_card(&model("GPT-4o", Some(json!(1_600_000_000))));

        assert_eq!(card.id, "GPT-4o");
        assert_eq!(card.display_name.as_deref(), Some("GPT-4o"));
        assert_eq!(card.released_at.as_deref(), Some("2024-05-13"));
        assert_eq!(card.vision, Some(true));
    }

    #[test]
    fn known_model_without_date_uses_created() {
        let card = default_card(&model("deepseek-chat", Some(json!(1_735_689_600))));
        assert_eq!(card.released_at.as_deref(), Some("2025-01-01"));
        assert_eq!(card.reasoning, Some(false));
    }

    #[test]
    fn unknown_model_is_bare_card() {
        let card = default_card(&model("acme-large", Some(json!(1_735_689_600))));
        assert_eq!(
            card,
            ModelCard {
                released_at: Some("2025-01-01".to_owned()),
                ..ModelCard::new("acme-large")
            }
        );
    }
}
