//! Environment-driven configuration.

use crate::tokens::DEFAULT_CONTEXT_SIZE;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone)]
pub struct Config {
    /// Provider credential. Missing keys only fail when a call is attempted.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub web_search_enabled: bool,
    /// Token window used by `trim_prompt` when no explicit size is given.
    pub context_size: usize,
    /// Budget for conversation history and context optimization.
    pub max_context_tokens: u64,
    pub retention_hours: u64,
    pub request_timeout: Duration,
    pub state_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            web_search_enabled: false,
            context_size: DEFAULT_CONTEXT_SIZE,
            max_context_tokens: 8000,
            retention_hours: 24,
            request_timeout: Duration::from_secs(60),
            state_path: PathBuf::from("conversations.json"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            model: get("RESPONSES_MODEL").unwrap_or(defaults.model),
            web_search_enabled: match get("WEB_SEARCH_ENABLED") {
                Some(raw) => parse_flag("WEB_SEARCH_ENABLED", &raw)?,
                None => defaults.web_search_enabled,
            },
            context_size: parse_or("CONTEXT_SIZE", get("CONTEXT_SIZE"), defaults.context_size)?,
            max_context_tokens: parse_or(
                "MAX_CONTEXT_TOKENS",
                get("MAX_CONTEXT_TOKENS"),
                defaults.max_context_tokens,
            )?,
            retention_hours: parse_or(
                "CONVERSATION_RETENTION_HOURS",
                get("CONVERSATION_RETENTION_HOURS"),
                defaults.retention_hours,
            )?,
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout.as_secs(),
            )?),
            state_path: get("CONVERSATION_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
        })
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.context_size, 128_000);
        assert_eq!(config.max_context_tokens, 8000);
        assert!(!config.web_search_enabled);
    }

    #[test]
    fn test_reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("WEB_SEARCH_ENABLED", "true"),
            ("CONTEXT_SIZE", "4096"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("CONVERSATION_STATE_PATH", "/tmp/state.json"),
        ]))
        .unwrap();

        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert!(config.web_search_enabled);
        assert_eq!(config.context_size, 4096);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")])).unwrap();
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = Config::from_lookup(lookup(&[("CONTEXT_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_lookup(lookup(&[("WEB_SEARCH_ENABLED", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("WEB_SEARCH_ENABLED"));
    }
}
