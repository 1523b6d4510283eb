//! Ticker Configuration Settings
//!
//! Configuration for the ticker binary, loaded from environment variables.

use std::time::Duration;

use crate::domain::streaming::Mode;
use crate::domain::subscription::InstrumentToken;
use crate::infrastructure::kite::reconnect::{
    DEFAULT_MAX_RETRIES, MIN_RECONNECT_INTERVAL, ReconnectConfig,
};
use crate::infrastructure::kite::session::{Credentials, DEFAULT_ROOT};
use crate::infrastructure::kite::ticker::TickerConfig;

/// Reconnection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    /// Whether auto-reconnect is on.
    pub enabled: bool,
    /// Base interval (clamped to at least five seconds when applied).
    pub interval: Duration,
    /// Maximum attempts before giving up.
    pub max_retries: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: MIN_RECONNECT_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl From<ReconnectSettings> for ReconnectConfig {
    fn from(settings: ReconnectSettings) -> Self {
        Self::default()
            .with_enabled(settings.enabled)
            .with_interval(settings.interval)
            .with_max_retries(settings.max_retries)
    }
}

/// Instruments subscribed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartupSubscription {
    /// Instrument tokens.
    pub tokens: Vec<InstrumentToken>,
    /// Mode applied to all of them.
    pub mode: Mode,
}

/// Complete ticker configuration.
#[derive(Debug, Clone)]
pub struct TickerSettings {
    /// API credentials.
    pub credentials: Credentials,
    /// Socket root URL.
    pub root: String,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Startup subscription.
    pub subscription: StartupSubscription,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl TickerSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty, or a
    /// token list or mode does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`TickerSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = required(&lookup, "KITE_API_KEY")?;
        let access_token = required(&lookup, "KITE_ACCESS_TOKEN")?;

        let root = lookup("KITE_TICKER_ROOT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOT.to_string());

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            enabled: parse_bool(&lookup, "KITE_TICKER_RECONNECT", defaults.enabled),
            interval: parse_duration_secs(
                &lookup,
                "KITE_TICKER_RECONNECT_INTERVAL_SECS",
                defaults.interval,
            ),
            max_retries: parse_or(&lookup, "KITE_TICKER_RECONNECT_TRIES", defaults.max_retries),
        };

        let tokens = match lookup("KITE_TICKER_TOKENS") {
            Some(raw) => parse_tokens(&raw)?,
            None => Vec::new(),
        };
        let mode = match lookup("KITE_TICKER_MODE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KITE_TICKER_MODE".to_string(),
                value: raw,
            })?,
            None => Mode::default(),
        };

        Ok(Self {
            credentials: Credentials::new(api_key, access_token),
            root,
            reconnect,
            subscription: StartupSubscription { tokens, mode },
            metrics_port: parse_or(&lookup, "KITE_TICKER_METRICS_PORT", 0),
        })
    }

    /// Library configuration for these settings.
    #[must_use]
    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig::default()
            .with_root(self.root.clone())
            .with_reconnect(self.reconnect.into())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable does not parse.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        }
    })
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_tokens(raw: &str) -> Result<Vec<InstrumentToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KITE_TICKER_TOKENS".to_string(),
                value: part.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::application::ports::SessionProvider;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDENTIALS: &[(&str, &str)] = &[("KITE_API_KEY", "key"), ("KITE_ACCESS_TOKEN", "token")];

    #[test]
    fn defaults_with_credentials_only() {
        let settings = TickerSettings::from_lookup(lookup(CREDENTIALS)).unwrap();

        assert_eq!(settings.credentials.api_key(), "key");
        assert_eq!(settings.credentials.access_token(), "token");
        assert_eq!(settings.root, "wss://ws.kite.trade/");
        assert_eq!(settings.reconnect, ReconnectSettings::default());
        assert!(settings.subscription.tokens.is_empty());
        assert_eq!(settings.subscription.mode, Mode::Quote);
        assert_eq!(settings.metrics_port, 0);
    }

    #[test]
    fn missing_and_empty_credentials() {
        let err = TickerSettings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "KITE_API_KEY"));

        let err = TickerSettings::from_lookup(lookup(&[
            ("KITE_API_KEY", "key"),
            ("KITE_ACCESS_TOKEN", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "KITE_ACCESS_TOKEN"));
    }

    #[test]
    fn parses_optional_settings() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("KITE_TICKER_ROOT", "ws://127.0.0.1:9000/"),
            ("KITE_TICKER_RECONNECT", "false"),
            ("KITE_TICKER_RECONNECT_INTERVAL_SECS", "2"),
            ("KITE_TICKER_RECONNECT_TRIES", "7"),
            ("KITE_TICKER_TOKENS", "408065, 884737,,256265"),
            ("KITE_TICKER_MODE", "full"),
            ("KITE_TICKER_METRICS_PORT", "9091"),
        ]);

        let settings = TickerSettings::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(settings.root, "ws://127.0.0.1:9000/");
        assert!(!settings.reconnect.enabled);
        assert_eq!(settings.reconnect.max_retries, 7);
        assert_eq!(settings.subscription.tokens, vec![408_065, 884_737, 256_265]);
        assert_eq!(settings.subscription.mode, Mode::Full);
        assert_eq!(settings.metrics_port, 9091);

        let config = settings.ticker_config();
        assert_eq!(config.root, "ws://127.0.0.1:9000/");
        assert_eq!(config.reconnect.interval, Duration::from_secs(5));
        assert!(!config.reconnect.enabled);
    }

    #[test]
    fn rejects_bad_tokens_and_mode() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("KITE_TICKER_TOKENS", "408065,INFY"));
        let err = TickerSettings::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { value, .. } if value == "INFY"));

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("KITE_TICKER_MODE", "verbose"));
        let err = TickerSettings::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "KITE_TICKER_MODE"));
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("KITE_TICKER_RECONNECT", "maybe"),
            ("KITE_TICKER_RECONNECT_TRIES", "-1"),
        ]);
        let settings = TickerSettings::from_lookup(lookup(&pairs)).unwrap();
        assert!(settings.reconnect.enabled);
        assert_eq!(settings.reconnect.max_retries, 50);
    }
}
