use crate::providers::{ProviderKind, ProviderSettings, UnknownProvider};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("DEFAULT_PROVIDER: {0}")]
    Provider(#[from] UnknownProvider),
}

/// Where the hub listens and how workers reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub bind: String,
    pub host: String,
    pub port: u16,
    pub shutdown_grace: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind: lookup("MINDSERVER_BIND").unwrap_or(defaults.bind),
            host: lookup("MINDSERVER_HOST").unwrap_or(defaults.host),
            port: parse_number(&lookup, "MINDSERVER_PORT")?.unwrap_or(defaults.port),
            shutdown_grace: parse_number::<u64>(&lookup, "SHUTDOWN_GRACE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// The WebSocket endpoint workers dial.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }
}

/// Provider credentials, default provider and cache location for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub default_provider: ProviderKind,
    pub openai: ProviderSettings,
    pub claude: ProviderSettings,
    pub gemini: ProviderSettings,
    /// `None` keeps the cache in memory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::OpenAi,
            openai: ProviderSettings::new(None, OPENAI_BASE_URL),
            claude: ProviderSettings::new(None, ANTHROPIC_BASE_URL),
            gemini: ProviderSettings::new(None, GEMINI_BASE_URL),
            cache_dir: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let default_provider = match lookup("DEFAULT_PROVIDER") {
            Some(id) => ProviderKind::from_str(&id)?,
            None => ProviderKind::OpenAi,
        };

        Ok(Self {
            default_provider,
            openai: ProviderSettings::new(
                lookup("OPENAI_API_KEY"),
                lookup("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            ),
            claude: ProviderSettings::new(
                lookup("ANTHROPIC_API_KEY"),
                lookup("ANTHROPIC_BASE_URL").unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            ),
            gemini: ProviderSettings::new(
                lookup("GEMINI_API_KEY"),
                lookup("GEMINI_BASE_URL").unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            ),
            cache_dir: lookup("CACHE_DIR").map(PathBuf::from),
        })
    }

    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Claude => &self.claude,
            ProviderKind::Gemini => &self.gemini,
        }
    }
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_hub_defaults() {
        let config = HubConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.ws_url(), "ws://localhost:8080/ws");
        assert_eq!(config.shutdown_grace, Duration::from_millis(2000));
    }

    #[test]
    fn test_hub_overrides() {
        let config = HubConfig::from_lookup(env(&[
            ("MINDSERVER_HOST", "hub.local"),
            ("MINDSERVER_PORT", "9001"),
            ("SHUTDOWN_GRACE_MS", "50"),
        ]))
        .unwrap();
        assert_eq!(config.ws_url(), "ws://hub.local:9001/ws");
        assert_eq!(config.shutdown_grace, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = HubConfig::from_lookup(env(&[("MINDSERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                var: "MINDSERVER_PORT",
                ..
            }
        ));
    }

    #[test]
    fn test_gateway_config() {
        let config = GatewayConfig::from_lookup(env(&[
            ("DEFAULT_PROVIDER", "google"),
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_API_KEY", "  "),
            ("CACHE_DIR", "/tmp/mindserver-cache"),
        ]))
        .unwrap();
        assert_eq!(config.default_provider, ProviderKind::Gemini);
        assert_eq!(config.gemini.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.openai.api_key, None);
        assert_eq!(config.settings(ProviderKind::Claude).base_url, ANTHROPIC_BASE_URL);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/mindserver-cache")));
    }

    #[test]
    fn test_unknown_default_provider_fails() {
        let err = GatewayConfig::from_lookup(env(&[("DEFAULT_PROVIDER", "mistral")])).unwrap_err();
        assert!(matches!(err, ConfigError::Provider(_)));
    }
}
