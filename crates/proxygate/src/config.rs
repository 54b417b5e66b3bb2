//! Gateway configuration.
//!
//! Everything here has a default, so an empty document (or
//! `GatewayConfig::default()`) is a valid configuration.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// What the gateway does with an envelope whose action it does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActionPolicy {
    /// Log and send nothing back.
    #[default]
    Ignore,
    /// Reply with an `error` envelope.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub unknown_actions: UnknownActionPolicy,
    /// How long a remote listener callback waits for the peer's reply.
    /// `None` waits indefinitely.
    pub listener_timeout_ms: Option<u64>,
    /// Include request payloads in debug logs.
    pub log_payloads: bool,
}

impl GatewayConfig {
    pub fn listener_timeout(&self) -> Option<Duration> {
        self.listener_timeout_ms.map(Duration::from_millis)
    }

    /// Parses a JSON configuration document.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(GatewayConfig::from_json("{}").unwrap(), GatewayConfig::default());
        assert_eq!(GatewayConfig::default().listener_timeout(), None);
    }

    #[test]
    fn test_partial_document() {
        let config = GatewayConfig::from_json(
            r#"{"unknown_actions": "reject", "listener_timeout_ms": 250}"#,
        )
        .unwrap();
        assert_eq!(config.unknown_actions, UnknownActionPolicy::Reject);
        assert_eq!(config.listener_timeout(), Some(Duration::from_millis(250)));
        assert!(!config.log_payloads);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(GatewayConfig::from_json(r#"{"unknown_actions": "explode"}"#).is_err());
    }
}
