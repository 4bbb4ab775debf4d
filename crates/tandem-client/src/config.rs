//! Engine configuration loaded from environment variables.
//!
//! Every setting has a default so the engine can run against a local
//! development server with zero configuration.

use std::time::Duration;

use tandem_shared::constants::{
    CONVERSATION_POLL_INTERVAL_MS, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_MS,
    MESSAGE_POLL_INTERVAL_MS, PUSH_RECONNECT_ATTEMPTS, PUSH_RECONNECT_BASE_DELAY_MS,
};

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the REST service.
    /// Env: `TANDEM_API_URL`
    /// Default: `http://localhost:8080/api/`
    pub api_url: String,

    /// WebSocket URL of the push channel.
    /// Env: `TANDEM_PUSH_URL`
    /// Default: `ws://localhost:8080/push`
    pub push_url: String,

    /// Bearer token attached to REST and push requests.
    /// Env: `TANDEM_TOKEN`
    /// Default: none (anonymous).
    pub token: Option<String>,

    /// Login of the signed-in user.
    /// Env: `TANDEM_USER_ID`
    /// Default: none.
    pub user_id: Option<String>,

    /// Conversation list poll period.
    /// Env: `TANDEM_CONVERSATION_POLL_MS`
    /// Default: 5 s
    pub conversation_poll_interval: Duration,

    /// Active conversation message poll period.
    /// Env: `TANDEM_MESSAGE_POLL_MS`
    /// Default: 2 s
    pub message_poll_interval: Duration,

    /// Upper bound on any single REST call.
    /// Env: `TANDEM_REQUEST_TIMEOUT_MS`
    /// Default: 30 s
    pub request_timeout: Duration,

    /// Push reconnect attempts before poll-only mode.
    /// Env: `TANDEM_PUSH_RECONNECT_ATTEMPTS`
    /// Default: `5`
    pub push_reconnect_attempts: u32,

    /// Delay before the first push reconnect; doubles on each attempt.
    /// Env: `TANDEM_PUSH_RECONNECT_BASE_MS`
    /// Default: 1 s
    pub push_reconnect_base_delay: Duration,

    /// Page size for conversation and message listing.
    /// Env: `TANDEM_PAGE_SIZE`
    /// Default: `50`
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api/".to_string(),
            push_url: "ws://localhost:8080/push".to_string(),
            token: None,
            user_id: None,
            conversation_poll_interval: Duration::from_millis(CONVERSATION_POLL_INTERVAL_MS),
            message_poll_interval: Duration::from_millis(MESSAGE_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            push_reconnect_attempts: PUSH_RECONNECT_ATTEMPTS,
            push_reconnect_base_delay: Duration::from_millis(PUSH_RECONNECT_BASE_DELAY_MS),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TANDEM_API_URL") {
            config.api_url = url;
        }

        if let Some(url) = lookup("TANDEM_PUSH_URL") {
            config.push_url = url;
        }

        if let Some(token) = lookup("TANDEM_TOKEN") {
            if !token.is_empty() {
                config.token = Some(token);
            }
        }

        if let Some(user) = lookup("TANDEM_USER_ID") {
            if !user.trim().is_empty() {
                config.user_id = Some(user.trim().to_string());
            }
        }

        if let Some(ms) = parse_positive(&lookup, "TANDEM_CONVERSATION_POLL_MS") {
            config.conversation_poll_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_positive(&lookup, "TANDEM_MESSAGE_POLL_MS") {
            config.message_poll_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_positive(&lookup, "TANDEM_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }

        if let Some(n) = parse_positive(&lookup, "TANDEM_PUSH_RECONNECT_ATTEMPTS") {
            config.push_reconnect_attempts = u32::try_from(n).unwrap_or(u32::MAX);
        }

        if let Some(ms) = parse_positive(&lookup, "TANDEM_PUSH_RECONNECT_BASE_MS") {
            config.push_reconnect_base_delay = Duration::from_millis(ms);
        }

        if let Some(n) = parse_positive(&lookup, "TANDEM_PAGE_SIZE") {
            config.page_size = u32::try_from(n).unwrap_or(u32::MAX);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Read a strictly positive integer, warning and ignoring anything else.
fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.conversation_poll_interval, Duration::from_secs(5));
        assert_eq!(config.message_poll_interval, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.push_reconnect_attempts, 5);
        assert_eq!(config.push_reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(config.page_size, 50);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("TANDEM_API_URL", "https://api.tandem.test/v2/"),
            ("TANDEM_TOKEN", "secret"),
            ("TANDEM_USER_ID", " me "),
            ("TANDEM_MESSAGE_POLL_MS", "750"),
            ("TANDEM_PUSH_RECONNECT_ATTEMPTS", "3"),
            ("TANDEM_PAGE_SIZE", "20"),
        ]));
        assert_eq!(config.api_url, "https://api.tandem.test/v2/");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.user_id.as_deref(), Some("me"));
        assert_eq!(config.message_poll_interval, Duration::from_millis(750));
        assert_eq!(config.push_reconnect_attempts, 3);
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("TANDEM_CONVERSATION_POLL_MS", "soon"),
            ("TANDEM_REQUEST_TIMEOUT_MS", "0"),
            ("TANDEM_TOKEN", ""),
        ]));
        assert_eq!(config, SyncConfig::default());
    }
}
