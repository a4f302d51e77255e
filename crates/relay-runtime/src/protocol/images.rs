//! `OpenAI` image endpoints wire format types

use serde::Deserialize;

/// Response of `/images/generations` and `/images/edits`
///
/// Every field is optional so malformed responses can be reported precisely
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub created: Option<u64>,
    /// Anything but an array is treated as missing
    #[serde(default, deserialize_with = "lenient_data")]
    pub data: Option<Vec<Option<ImageDatum>>>,
    #[serde(default)]
    pub usage: Option<ImagesUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageDatum {
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: Option<ImagesInputDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesInputDetails {
    #[serde(default)]
    pub text_tokens: u64,
    #[serde(default)]
    pub image_tokens: u64,
}

fn lenient_data<'de, D>(deserializer: D) -> Result<Option<Vec<Option<ImageDatum>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
