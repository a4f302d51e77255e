//! Built-in provider configurations

pub mod deepseek;
pub mod groq;
pub mod lmstudio;
pub mod moonshot;
pub mod openai;
pub mod openrouter;
pub mod siliconcloud;

use crate::factory::{ProviderConfig, RuntimeFactory};

/// Ids of every built-in provider
pub const PRESETS: &[&str] = &[
    "deepseek",
    "groq",
    "lmstudio",
    "moonshot",
    "openai",
    "openrouter",
    "siliconcloud",
];

/// Built-in config for a provider id
pub fn lookup(id: &str) -> Option<ProviderConfig> {
    let config = match id {
        "deepseek" => deepseek::config(),
        "groq" => groq::config(),
        "lmstudio" => lmstudio::config(),
        "moonshot" => moonshot::config(),
        "openai" => openai::config(),
        "openrouter" => openrouter::config(),
        "siliconcloud" => siliconcloud::config(),
        _ => return None,
    };
    Some(config)
}

/// Factory for a built-in provider
pub fn factory(id: &str) -> Option<RuntimeFactory> {
    lookup(id).map(RuntimeFactory::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_resolves_to_itself() {
        for id in PRESETS {
            let config = lookup(id).unwrap();
            assert_eq!(config.provider, *id);
            assert!(config.base_url.starts_with("http"), "{id}");
        }

        assert!(lookup("nope").is_none());
    }
}
