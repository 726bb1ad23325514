//! Server Configuration

use billing_processor::{ConfigError, Environment};
use thiserror::Error;

/// Which processor implementation backs the server
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessorKind {
    #[default]
    Stripe,
    /// In-memory simulator; only allowed in the test environment
    Mock,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServerConfigError {
    #[error(transparent)]
    Processor(#[from] ConfigError),

    #[error("Unknown processor '{0}' (expected 'stripe' or 'mock')")]
    UnknownProcessor(String),

    #[error("The mock processor cannot run in the live environment")]
    MockInLive,

    #[error("Invalid value for {name}: '{value}'")]
    InvalidFlag { name: &'static str, value: String },
}

/// Settings read once at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub environment: Environment,
    pub processor: ProcessorKind,
    pub serialize_subscription_updates: bool,
}

impl ServerConfig {
    /// Create from environment variables
    ///
    /// Reads `BIND_ADDR`, `BILLING_ENV`, `BILLING_PROCESSOR` and
    /// `BILLING_SERIALIZE_SUBSCRIPTION_UPDATES`.
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("BILLING_ENV") {
            Some(value) => Environment::parse(&value)?,
            None => Environment::default(),
        };

        let processor = match lookup("BILLING_PROCESSOR")
            .map(|v| v.trim().to_lowercase())
            .as_deref()
        {
            None | Some("" | "stripe") => ProcessorKind::Stripe,
            Some("mock") => ProcessorKind::Mock,
            Some(other) => return Err(ServerConfigError::UnknownProcessor(other.to_string())),
        };
        if processor == ProcessorKind::Mock && environment == Environment::Live {
            return Err(ServerConfigError::MockInLive);
        }

        let serialize_subscription_updates = parse_flag(
            "BILLING_SERIALIZE_SUBSCRIPTION_UPDATES",
            lookup("BILLING_SERIALIZE_SUBSCRIPTION_UPDATES"),
        )?;

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            environment,
            processor,
            serialize_subscription_updates,
        })
    }
}

fn parse_flag(name: &'static str, value: Option<String>) -> Result<bool, ServerConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ServerConfigError::InvalidFlag { name, value }),
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
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.processor, ProcessorKind::Stripe);
        assert!(!config.serialize_subscription_updates);
    }

    #[test]
    fn test_mock_with_locking() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BILLING_PROCESSOR", "Mock"),
            ("BILLING_SERIALIZE_SUBSCRIPTION_UPDATES", "true"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.processor, ProcessorKind::Mock);
        assert!(config.serialize_subscription_updates);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_mock_rejected_in_live() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("BILLING_ENV", "live"),
            ("BILLING_PROCESSOR", "mock"),
        ]))
        .unwrap_err();
        assert_eq!(err, ServerConfigError::MockInLive);
    }

    #[test]
    fn test_bad_flag() {
        let err = ServerConfig::from_lookup(lookup(&[(
            "BILLING_SERIALIZE_SUBSCRIPTION_UPDATES",
            "maybe",
        )]))
        .unwrap_err();
        assert!(matches!(err, ServerConfigError::InvalidFlag { .. }));
    }
}
