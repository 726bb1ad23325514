//! Processor Configuration
//!
//! Exactly one credential per process, chosen by the billing environment.
//! Resolved once at startup and never mutated.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which processor account the process talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Test,
    Live,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Live => "live",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "" | "test" => Ok(Environment::Test),
            "live" | "production" => Ok(Environment::Live),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }

    /// Variable holding this environment's credential
    pub fn key_var(&self) -> &'static str {
        match self {
            Environment::Test => "STRIPE_TEST_KEY",
            Environment::Live => "STRIPE_LIVE_KEY",
        }
    }

    fn key_prefixes(&self) -> [&'static str; 2] {
        match self {
            Environment::Test => ["sk_test_", "rk_test_"],
            Environment::Live => ["sk_live_", "rk_live_"],
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processor connection settings
#[derive(Clone)]
pub struct ProcessorConfig {
    pub environment: Environment,

    /// Secret or restricted API key for `environment`
    api_key: SecretString,

    /// Base URL override (local stubs); `None` targets the processor itself
    pub api_base: Option<String>,
}

impl ProcessorConfig {
    /// Validate and build a configuration
    pub fn new(environment: Environment, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired(environment.key_var()));
        }
        if !environment
            .key_prefixes()
            .iter()
            .any(|prefix| api_key.starts_with(prefix))
        {
            return Err(ConfigError::KeyEnvironmentMismatch(environment.as_str()));
        }

        Ok(Self {
            environment,
            api_key: SecretString::new(api_key),
            api_base: None,
        })
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `BILLING_ENV` (`test` or `live`, defaults to `test`)
    /// - `STRIPE_TEST_KEY` or `STRIPE_LIVE_KEY`, matching `BILLING_ENV`
    /// - `STRIPE_API_BASE` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("BILLING_ENV") {
            Some(value) => Environment::parse(&value)?,
            None => Environment::default(),
        };

        let api_key = lookup(environment.key_var())
            .ok_or(ConfigError::MissingRequired(environment.key_var()))?;

        let mut config = Self::new(environment, api_key)?;
        config.api_base = lookup("STRIPE_API_BASE").filter(|base| !base.trim().is_empty());
        Ok(config)
    }

    #[must_use]
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("environment", &self.environment)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_to_test_environment() {
        let config = ProcessorConfig::from_lookup(lookup(&[("STRIPE_TEST_KEY", "sk_test_abc")]))
            .unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.api_key(), "sk_test_abc");
        assert!(config.api_base.is_none());
    }

    #[test]
    fn test_live_environment_reads_live_key() {
        let config = ProcessorConfig::from_lookup(lookup(&[
            ("BILLING_ENV", "live"),
            ("STRIPE_TEST_KEY", "sk_test_abc"),
            ("STRIPE_LIVE_KEY", "rk_live_xyz"),
        ]))
        .unwrap();
        assert_eq!(config.environment, Environment::Live);
        assert_eq!(config.api_key(), "rk_live_xyz");
    }

    #[test]
    fn test_missing_key() {
        let err = ProcessorConfig::from_lookup(lookup(&[("BILLING_ENV", "live")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired("STRIPE_LIVE_KEY"));
    }

    #[test]
    fn test_test_key_rejected_in_live() {
        let err = ProcessorConfig::new(Environment::Live, "sk_test_abc").unwrap_err();
        assert_eq!(err, ConfigError::KeyEnvironmentMismatch("live"));
    }

    #[test]
    fn test_unknown_environment() {
        assert!(matches!(
            Environment::parse("staging"),
            Err(ConfigError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let config = ProcessorConfig::new(Environment::Test, "sk_test_secret").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk_test_secret"));
    }
}
