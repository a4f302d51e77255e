use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request for `create_image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateImagePayload {
    /// Model id; an `:image` suffix selects chat-model image generation
    pub model: String,
    pub params: ImageParams,
}

/// Image generation or edit parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParams {
    pub prompt: String,
    /// Input images; when present the edit endpoint is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    /// Single input image, treated as a one-element `image_urls` unless blank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Output size such as `1024x1024`; `auto` is never forwarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Remaining vendor parameters (quality, mask, seed...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageParams {
    /// Input images in order, merging the single and list forms
    pub fn input_images(&self) -> Vec<String> {
        match &self.image_urls {
            Some(urls) if !urls.is_empty() => urls.clone(),
            _ => self
                .image_url
                .iter()
                .filter(|url| !url.trim().is_empty())
                .cloned()
                .collect(),
        }
    }
}

/// Result of `create_image`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImageResponse {
    /// `data:` URL or hosted image URL
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_usage: Option<ImageUsage>,
}

/// Token accounting reported by image endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUsage {
    pub input_text_tokens: u64,
    pub input_image_tokens: u64,
    pub output_image_tokens: u64,
    pub total_tokens: u64,
}
