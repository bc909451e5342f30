use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for conversation management.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Inactivity period after which a new conversation may be destroyed
    #[serde(default = "ConversationConfig::default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// How long a request waits for a conversation held by another request
    #[serde(default = "ConversationConfig::default_concurrent_access_timeout_ms")]
    pub concurrent_access_timeout_ms: u64,
    /// Expire conversations with scheduled tasks instead of request-time sweeps
    #[serde(default)]
    pub asynchronous: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: Self::default_timeout_ms(),
            concurrent_access_timeout_ms: Self::default_concurrent_access_timeout_ms(),
            asynchronous: false,
        }
    }
}

impl ConversationConfig {
    const fn default_timeout_ms() -> u64 {
        10 * 60 * 1000
    }

    const fn default_concurrent_access_timeout_ms() -> u64 {
        1000
    }

    #[must_use]
    pub const fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub const fn with_concurrent_access_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.concurrent_access_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub const fn with_asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    #[must_use]
    pub const fn concurrent_access_timeout(&self) -> Duration {
        Duration::from_millis(self.concurrent_access_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConversationConfig::default();
        assert_eq!(config.default_timeout_ms, 600_000);
        assert_eq!(config.concurrent_access_timeout(), Duration::from_secs(1));
        assert!(!config.asynchronous);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ConversationConfig =
            serde_json::from_str(r#"{ "asynchronous": true }"#).unwrap_or_default();
        assert!(config.asynchronous);
        assert_eq!(config.default_timeout_ms, 600_000);
        assert_eq!(config.concurrent_access_timeout_ms, 1000);
    }
}
