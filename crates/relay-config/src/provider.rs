use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// One configured provider instance
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Built-in provider config to start from; defaults to the table key
    #[serde(default)]
    pub preset: Option<String>,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Force chat calls onto one upstream API
    #[serde(default)]
    pub api_mode: Option<ApiModeConfig>,
    /// Log raw upstream requests and chunks at debug level
    #[serde(default)]
    pub debug: bool,
    /// Inline hosted image URLs as base64 before sending
    #[serde(default)]
    pub vision_base64: bool,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl ProviderEntry {
    /// Built-in config this entry starts from
    pub fn preset<'a>(&'a self, name: &'a str) -> &'a str {
        self.preset.as_deref().unwrap_or(name)
    }
}

/// Upstream API selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiModeConfig {
    ChatCompletion,
    Responses,
}
