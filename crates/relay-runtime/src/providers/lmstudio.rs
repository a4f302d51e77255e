use crate::factory::ProviderConfig;

pub const BASE_URL: &str = "http://127.0.0.1:1234/v1";

/// Local LM Studio server, which ignores credentials
pub fn config() -> ProviderConfig {
    ProviderConfig {
        api_key: Some("lmstudio".to_owned()),
        ..ProviderConfig::new("lmstudio", BASE_URL)
    }
}
