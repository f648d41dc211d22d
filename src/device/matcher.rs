use uuid::Uuid;

use crate::device::types::Advertisement;

/// What identifies the alarm in an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    pub name: String,
    pub service: Uuid,
}

impl DeviceMatcher {
    pub fn new(name: impl Into<String>, service: Uuid) -> Self {
        DeviceMatcher { name: name.into(), service }
    }

    // Real hardware often sends incomplete advertisements, so any single signal is enough.
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        if advertisement.name.as_deref() == Some(self.name.as_str()) {
            return true;
        }

        if advertisement.local_name.as_deref() == Some(self.name.as_str()) {
            return true;
        }

        match &advertisement.services {
            Some(services) => services.contains(&self.service),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::{make_alarm_service_uuid, DEVICE_NAME};
    use crate::device::types::DeviceId;

    fn advertisement(name: Option<&str>, local_name: Option<&str>, services: Option<Vec<Uuid>>) -> Advertisement {
        Advertisement {
            device: DeviceId("AA:BB".to_string()),
            name: name.map(String::from),
            local_name: local_name.map(String::from),
            services,
            rssi: Some(-60),
        }
    }

    fn matcher() -> DeviceMatcher {
        DeviceMatcher::new(DEVICE_NAME, make_alarm_service_uuid())
    }

    #[test]
    fn matches_on_reported_name() {
        assert!(matcher().matches(&advertisement(Some("Mochila-Alarma"), None, None)));
    }

    #[test]
    fn matches_on_local_name_only() {
        assert!(matcher().matches(&advertisement(None, Some("Mochila-Alarma"), None)));
        assert!(matcher().matches(&advertisement(Some("ESP32"), Some("Mochila-Alarma"), Some(vec![]))));
    }

    #[test]
    fn matches_on_service_only() {
        let services = vec![Uuid::nil(), make_alarm_service_uuid()];
        assert!(matcher().matches(&advertisement(None, None, Some(services))));
    }

    #[test]
    fn rejects_unrelated_device() {
        assert!(!matcher().matches(&advertisement(Some("Headphones"), Some("Headphones"), Some(vec![Uuid::nil()]))));
        assert!(!matcher().matches(&advertisement(None, None, None)));
    }

    #[test]
    fn name_comparison_is_exact() {
        assert!(!matcher().matches(&advertisement(Some("mochila-alarma"), None, None)));
        assert!(!matcher().matches(&advertisement(Some("Mochila-Alarma "), None, None)));
    }
}
