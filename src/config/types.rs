use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    make_alarm_command_uuid, make_alarm_service_uuid, make_alarm_status_uuid, COMMAND_TIMEOUT,
    DEVICE_NAME, RETRY_DELAY, SCAN_TIMEOUT,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkConfig {
    pub device_name: String,
    pub service_uuid: Uuid,
    pub command_uuid: Uuid,
    pub status_uuid: Uuid,
    pub scan_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub command_timeout_ms: u64,
    // Off by default: some alarms only put their name in the advertisement.
    pub scan_with_service_filter: bool,
}

impl LinkConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            device_name: DEVICE_NAME.to_string(),
            service_uuid: make_alarm_service_uuid(),
            command_uuid: make_alarm_command_uuid(),
            status_uuid: make_alarm_status_uuid(),
            scan_timeout_ms: SCAN_TIMEOUT,
            retry_delay_ms: RETRY_DELAY,
            command_timeout_ms: COMMAND_TIMEOUT,
            scan_with_service_filter: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config: LinkConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LinkConfig::default());
        assert_eq!(config.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.command_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config: LinkConfig = serde_json::from_str(r#"{
            "deviceName": "Mochila-Test",
            "commandTimeoutMs": 5000,
            "statusUuid": "abcd0003-1234-1234-1234-1234567890ab"
        }"#).unwrap();

        assert_eq!(config.device_name, "Mochila-Test");
        assert_eq!(config.command_timeout_ms, 5000);
        assert_eq!(config.status_uuid, Uuid::parse_str("abcd0003-1234-1234-1234-1234567890ab").unwrap());
        assert_eq!(config.service_uuid, make_alarm_service_uuid());
    }

    #[test]
    fn rejects_malformed_uuid() {
        let result = serde_json::from_str::<LinkConfig>(r#"{"serviceUuid": "not-a-uuid"}"#);
        assert!(result.is_err());
    }
}
