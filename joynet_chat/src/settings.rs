use crate::constants::*;
use joynet_types::user::GroupId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of a group chat session. Every field has a default, so partial documents deserialize
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct ChatSettings {
    pub signaling_base_url: String,
    pub reconnect_watchdog_ms: u64,
    pub max_ice_restarts: usize,
    pub data_channel_label_prefix: String,
    pub request_timeout_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            signaling_base_url: DEFAULT_SIGNALING_BASE_URL.to_string(),
            reconnect_watchdog_ms: RECONNECT_WATCHDOG.as_millis() as u64,
            max_ice_restarts: MAX_ICE_RESTARTS,
            data_channel_label_prefix: DATA_CHANNEL_LABEL_PREFIX.to_string(),
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ChatSettings {
    pub fn reconnect_watchdog(&self) -> Duration {
        Duration::from_millis(self.reconnect_watchdog_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn data_channel_label(&self, group: &GroupId) -> String {
        format!("{}{}", self.data_channel_label_prefix, group)
    }

    pub(crate) fn check(&self) -> anyhow::Result<()> {
        if self.reconnect_watchdog_ms == 0 {
            return Err(anyhow::Error::msg(
                "The reconnect watchdog delay must be greater than zero",
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(anyhow::Error::msg(
                "The request timeout must be greater than zero",
            ));
        }

        if self.data_channel_label_prefix.is_empty() {
            return Err(anyhow::Error::msg(
                "The data channel label prefix must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let settings: ChatSettings =
            serde_json::from_str(r#"{"reconnect_watchdog_ms": 2500}"#).unwrap();
        assert_eq!(settings.reconnect_watchdog(), Duration::from_millis(2500));
        assert_eq!(settings.max_ice_restarts, 1);
        assert_eq!(
            settings.data_channel_label(&GroupId::from("42")),
            "groupchat-42"
        );
        assert!(settings.check().is_ok());
    }

    #[test]
    fn zero_delays_are_rejected() {
        let settings = ChatSettings {
            reconnect_watchdog_ms: 0,
            ..Default::default()
        };
        assert!(settings.check().is_err());
    }
}
