use std::path::Path;

use anyhow::Context;
use http::{HeaderName, HeaderValue};

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config = Self::parse(&raw)?;
        tracing::debug!(path = %path.display(), providers = config.providers.len(), "configuration loaded");

        Ok(config)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;
        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or a provider carries an
    /// invalid header
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        for (name, provider) in &self.providers {
            for (header, value) in &provider.headers {
                HeaderName::try_from(header.as_str())
                    .map_err(|e| anyhow::anyhow!("invalid header name '{header}' for provider '{name}': {e}"))?;
                HeaderValue::try_from(value.as_str())
                    .map_err(|e| anyhow::anyhow!("invalid value for header '{header}' of provider '{name}': {e}"))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use crate::{ApiModeConfig, Config, LogFormat};

    #[test]
    fn full_config_parses() {
        let raw = r#"
            [logging]
            filter = "relay=debug"
            format = "json"

            [providers.deepseek]
            api_key = "sk-test"
            debug = true

            [providers.work]
            preset = "openai"
            api_key = "sk-work"
            base_url = "https://proxy.example.com/v1"
            api_mode = "responses"
            vision_base64 = true
            headers = { "X-Team" = "a" }
        "#;

        let config = Config::parse(raw).unwrap();
        assert_eq!(config.logging.filter.as_deref(), Some("relay=debug"));
        assert_eq!(config.logging.format, LogFormat::Json);

        let deepseek = &config.providers["deepseek"];
        assert_eq!(deepseek.preset("deepseek"), "deepseek");
        assert!(deepseek.debug);

        let work = &config.providers["work"];
        assert_eq!(work.preset("work"), "openai");
        assert_eq!(work.api_key.as_ref().unwrap().expose_secret(), "sk-work");
        assert_eq!(work.base_url.as_ref().unwrap().as_str(), "https://proxy.example.com/v1");
        assert_eq!(work.api_mode, Some(ApiModeConfig::Responses));
        assert!(work.vision_base64);
        assert_eq!(work.headers["X-Team"], "a");
    }

    #[test]
    fn api_key_comes_from_environment() {
        temp_env::with_var("RELAY_TEST_KEY", Some("sk-env"), || {
            let config = Config::parse("[providers.openai]\napi_key = \"{{ env.RELAY_TEST_KEY }}\"\n").unwrap();
            assert_eq!(
                config.providers["openai"].api_key.as_ref().unwrap().expose_secret(),
                "sk-env"
            );
        });
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = Config::parse("").unwrap_err();
        assert!(err.to_string().contains("at least one provider"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::parse("[providers.openai]\ntimeout = 5\n").unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = Config::parse("[providers.openai]\nheaders = { \"bad header\" = \"x\" }\n").unwrap_err();
        assert!(err.to_string().contains("invalid header name"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[providers.lmstudio]").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.providers["lmstudio"].api_key.is_none());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Config::load(std::path::Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/relay.toml"));
    }
}
