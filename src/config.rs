use crate::{Error, Result, SimulationOptions};
use std::str::FromStr;

pub const ENV_MAX_DEPTH: &str = "DOCUMCP_MAX_DEPTH";
pub const ENV_MAX_STEPS: &str = "DOCUMCP_MAX_STEPS";
pub const ENV_TIMEOUT_MS: &str = "DOCUMCP_TIMEOUT_MS";
pub const ENV_CONFIDENCE_THRESHOLD: &str = "DOCUMCP_CONFIDENCE_THRESHOLD";
pub const ENV_LLM_BASE_URL: &str = "DOCUMCP_LLM_BASE_URL";
pub const ENV_LLM_MODEL: &str = "DOCUMCP_LLM_MODEL";
pub const ENV_LLM_API_KEY: &str = "DOCUMCP_LLM_API_KEY";
pub const ENV_LLM_TIMEOUT_SECS: &str = "DOCUMCP_LLM_TIMEOUT_SECS";

const DEFAULT_LLM_MODEL: &str = "local-model";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    /// Base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Process-level defaults for every tool call.
///
/// # Examples
///
/// ```
/// use documcp::Config;
///
/// let config = Config::from_lookup(|key| match key {
///     "DOCUMCP_MAX_STEPS" => Some("50".to_string()),
///     _ => None,
/// })
/// .unwrap();
/// assert_eq!(config.simulation.max_steps, 50);
/// assert!(config.llm.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Options used when a request does not override them
    pub simulation: SimulationOptions,

    /// Set when an LLM endpoint is configured
    pub llm: Option<LlmSettings>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut simulation = SimulationOptions::default();
        if let Some(value) = parse(&lookup, ENV_MAX_DEPTH)? {
            simulation.max_depth = value;
        }
        if let Some(value) = parse(&lookup, ENV_MAX_STEPS)? {
            simulation.max_steps = value;
        }
        if let Some(value) = parse(&lookup, ENV_TIMEOUT_MS)? {
            simulation.timeout_ms = value;
        }
        if let Some(value) = parse(&lookup, ENV_CONFIDENCE_THRESHOLD)? {
            simulation.confidence_threshold = value;
        }
        simulation.validate()?;

        let llm = match value(&lookup, ENV_LLM_BASE_URL) {
            Some(base_url) => Some(LlmSettings {
                base_url,
                model: value(&lookup, ENV_LLM_MODEL)
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                api_key: value(&lookup, ENV_LLM_API_KEY),
                timeout_secs: parse(&lookup, ENV_LLM_TIMEOUT_SECS)?
                    .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
            }),
            None => None,
        };

        Ok(Self { simulation, llm })
    }
}

fn value(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match value(lookup, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.simulation, SimulationOptions::default());
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_overrides_and_llm_settings() {
        let config = config(&[
            (ENV_MAX_DEPTH, "4"),
            (ENV_TIMEOUT_MS, "500"),
            (ENV_CONFIDENCE_THRESHOLD, "0.5"),
            (ENV_LLM_BASE_URL, "http://localhost:1234/v1"),
            (ENV_LLM_API_KEY, " secret "),
        ])
        .unwrap();
        assert_eq!(config.simulation.max_depth, 4);
        assert_eq!(config.simulation.timeout_ms, 500);
        assert_eq!(config.simulation.confidence_threshold, 0.5);
        let llm = config.llm.unwrap();
        assert_eq!(llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(llm.api_key.as_deref(), Some("secret"));
        assert_eq!(llm.timeout_secs, DEFAULT_LLM_TIMEOUT_SECS);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[(ENV_MAX_STEPS, "many")]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[(ENV_MAX_STEPS, "0")]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[(ENV_CONFIDENCE_THRESHOLD, "1.5")]),
            Err(Error::InvalidConfig(_))
        ));
    }
}
