//! Probe configuration loaded from environment variables.
//!
//! Follows 12-factor style: every setting comes from an environment
//! variable (or a `.env` file via `dotenvy`) and falls back to the values
//! the smoke test has always used against a local server.

use std::time::Duration;

use crate::error::ConfigError;

/// Default endpoint of the local game server.
pub const DEFAULT_URL: &str = "ws://localhost:50000/ws";

/// Credential sent with the `auth` command. Not a real session token, so a
/// healthy server answers with `INVALID_TOKEN`.
pub const DEFAULT_TOKEN: &str = "test-token-123";

/// Correlation id attached to the `auth` command.
pub const DEFAULT_CID: &str = "auth-test-1";

/// Top-level probe configuration.
///
/// Loaded once at startup via [`ProbeConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Plain WebSocket endpoint (`ws://`).
    pub url: String,

    /// Token placed in `data.token` of the `auth` command.
    pub token: String,

    /// Correlation id placed in `cid` of the `auth` command.
    pub cid: String,

    /// Grace period between an inbound frame and closing the connection.
    pub close_delay: Duration,

    /// Watchdog timeout, measured from probe launch.
    pub watchdog: Duration,

    /// Upper bound on waiting for the server to acknowledge our close.
    pub close_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: DEFAULT_TOKEN.to_string(),
            cid: DEFAULT_CID.to_string(),
            close_delay: Duration::from_millis(1_000),
            watchdog: Duration::from_millis(10_000),
            close_timeout: Duration::from_millis(1_000),
        }
    }
}

impl ProbeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Numeric settings that are missing or unparsable keep their default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `PROBE_URL` is set to
    /// something other than a `ws://` URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ProbeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = lookup("PROBE_URL").unwrap_or(defaults.url);
        validate_url(&url)?;

        let token = lookup("PROBE_TOKEN").unwrap_or(defaults.token);
        let cid = lookup("PROBE_CID").unwrap_or(defaults.cid);

        let close_delay = parse_millis(&lookup, "PROBE_CLOSE_DELAY_MS", defaults.close_delay);
        let watchdog = parse_millis(&lookup, "PROBE_WATCHDOG_MS", defaults.watchdog);
        let close_timeout =
            parse_millis(&lookup, "PROBE_CLOSE_TIMEOUT_MS", defaults.close_timeout);

        Ok(Self {
            url,
            token,
            cid,
            close_delay,
            watchdog,
            close_timeout,
        })
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let valid = url
        .strip_prefix("ws://")
        .is_some_and(|rest| !rest.is_empty());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(url.to_string()))
    }
}

/// Parses a millisecond duration, returning `default` on missing or invalid
/// values.
fn parse_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ProbeConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProbeConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let Ok(config) = load(&[]) else {
            panic!("defaults must load");
        };
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.url, "ws://localhost:50000/ws");
        assert_eq!(config.cid, "auth-test-1");
        assert_eq!(config.close_delay, Duration::from_secs(1));
        assert_eq!(config.watchdog, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied() {
        let Ok(config) = load(&[
            ("PROBE_URL", "ws://10.0.0.5:50001/ws"),
            ("PROBE_TOKEN", "abc"),
            ("PROBE_CID", "c-9"),
            ("PROBE_CLOSE_DELAY_MS", "250"),
            ("PROBE_WATCHDOG_MS", "3000"),
            ("PROBE_CLOSE_TIMEOUT_MS", "50"),
        ]) else {
            panic!("overrides must load");
        };
        assert_eq!(config.url, "ws://10.0.0.5:50001/ws");
        assert_eq!(config.token, "abc");
        assert_eq!(config.cid, "c-9");
        assert_eq!(config.close_delay, Duration::from_millis(250));
        assert_eq!(config.watchdog, Duration::from_millis(3000));
        assert_eq!(config.close_timeout, Duration::from_millis(50));
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let Ok(config) = load(&[("PROBE_WATCHDOG_MS", "soon"), ("PROBE_CLOSE_DELAY_MS", "-1")])
        else {
            panic!("fallbacks must load");
        };
        assert_eq!(config.watchdog, Duration::from_secs(10));
        assert_eq!(config.close_delay, Duration::from_secs(1));
    }

    #[test]
    fn non_websocket_url_is_rejected() {
        assert!(matches!(
            load(&[("PROBE_URL", "http://localhost:50000/ws")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            load(&[("PROBE_URL", "wss://localhost:50000/ws")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            load(&[("PROBE_URL", "ws://")]),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
