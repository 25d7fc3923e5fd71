//! CLI configuration file.
//!
//! Backends are declared in YAML, one entry per name, with optional
//! per-backend defaults:
//!
//! ```yaml
//! default: fast
//! backends:
//!   fast:
//!     kind: openai
//!     model: gpt-4o-mini
//!     defaults:
//!       max_tokens: 200
//!       timeout: 10s
//!   accurate:
//!     kind: openai
//!     model: gpt-4o
//!     api_key_env: OPENAI_API_KEY
//!     defaults:
//!       timeout: 45s
//!       confidence_floor: 0.5
//!   local:
//!     kind: openai
//!     model: llama3
//!     base_url: http://localhost:11434/v1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use magistrate_core::BackendDefaults;

/// Parsed CLI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend answering checks that name no backend.
    #[serde(default)]
    pub default: Option<String>,

    /// Named backend declarations.
    pub backends: BTreeMap<String, BackendEntry>,
}

/// One configured backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendEntry {
    /// Backend kind; only `openai` is built in.
    pub kind: BackendKind,

    /// Model identifier sent to the backend.
    pub model: String,

    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key; defaults to the kind's
    /// conventional variable.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Baseline options registered for this backend.
    #[serde(default)]
    pub defaults: BackendDefaults,
}

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat completion server.
    Openai,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Openai => "openai",
        }
    }
}

impl Config {
    /// Parse a config from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("Config declares no backends");
        }
        for name in self.backends.keys() {
            if name.is_empty() {
                bail!("Backend names must not be empty; use 'default:' to pick the default");
            }
        }
        if let Some(name) = &self.default {
            if !self.backends.contains_key(name) {
                bail!("Default backend '{name}' is not declared under 'backends'");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = r#"
default: fast
backends:
  fast:
    kind: openai
    model: gpt-4o-mini
    defaults:
      max_tokens: 200
      timeout: 10s
  accurate:
    kind: openai
    model: gpt-4o
    base_url: https://api.openai.com/v1
    defaults:
      confidence_floor: 0.5
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.default.as_deref(), Some("fast"));
        assert_eq!(config.backends.len(), 2);

        let fast = &config.backends["fast"];
        assert_eq!(fast.kind, BackendKind::Openai);
        assert_eq!(fast.model, "gpt-4o-mini");
        assert_eq!(fast.defaults.max_tokens, 200);
        assert_eq!(fast.defaults.timeout, Duration::from_secs(10));

        let accurate = &config.backends["accurate"];
        assert_eq!(accurate.base_url.as_deref(), Some("https://api.openai.com/v1"));
        assert_eq!(accurate.defaults.confidence_floor, Some(0.5));
    }

    #[test]
    fn test_missing_defaults_use_stock_values() {
        let yaml = "backends:\n  only:\n    kind: openai\n    model: gpt-4o-mini\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.backends["only"].defaults, BackendDefaults::default());
    }

    #[test]
    fn test_empty_backend_map_is_rejected() {
        let err = Config::from_yaml("backends: {}\n").unwrap_err();
        assert!(err.to_string().contains("no backends"));
    }

    #[test]
    fn test_unknown_default_is_rejected() {
        let yaml = "default: missing\nbackends:\n  fast:\n    kind: openai\n    model: m\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = "backends:\n  odd:\n    kind: telepathy\n    model: m\n";
        assert!(Config::from_yaml(yaml).is_err());
    }
}
