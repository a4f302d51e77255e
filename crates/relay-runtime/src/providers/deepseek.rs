use crate::factory::ProviderConfig;

pub const BASE_URL: &str = "https://api.deepseek.com/v1";

/// `DeepSeek`
///
/// Balance exhaustion arrives as a 402 with an "Insufficient Balance"
/// message, which the default classifier already maps to `InsufficientQuota`.
pub fn config() -> ProviderConfig {
    ProviderConfig::new("deepseek", BASE_URL)
}
