//! Configuration for the Relay CLI
//!
//! Loaded from TOML with `{{ env.VAR }}` placeholders expanded before parsing.

#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod logging;
pub mod provider;

use indexmap::IndexMap;
use serde::Deserialize;

pub use env::ExpandError;
pub use logging::*;
pub use provider::*;

/// Top-level Relay configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Provider instances keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, ProviderEntry>,
}
