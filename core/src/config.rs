//! Client configuration.

use std::time::Duration;

use crate::error::{ApiError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

pub const ENV_BASE_URL: &str = "LIBRARY_BASE_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "LIBRARY_POLL_INTERVAL_MS";

/// Settings shared read-only by every operation of a `LibraryClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Read `LIBRARY_BASE_URL` and `LIBRARY_POLL_INTERVAL_MS`, falling back
    /// to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("{ENV_POLL_INTERVAL_MS}={raw:?} is not a number")))?;
            config = config.with_poll_interval(Duration::from_millis(ms))?;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The interval must be non-zero.
    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self> {
        validate_interval(interval)?;
        self.poll_interval = interval;
        Ok(self)
    }
}

pub(crate) fn validate_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(ApiError::Config("poll interval must be greater than zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://library.example.com"),
            (ENV_POLL_INTERVAL_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://library.example.com");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn unset_env_keeps_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn bad_interval_is_rejected() {
        for raw in ["0", "soon", "-5"] {
            let err = ClientConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL_MS, raw)])).unwrap_err();
            assert!(matches!(err, ApiError::Config(_)), "{raw}: {err:?}");
        }
    }

    #[test]
    fn zero_interval_builder_is_rejected() {
        assert!(ClientConfig::default().with_poll_interval(Duration::ZERO).is_err());
    }
}
