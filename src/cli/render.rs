use crate::device::types::Snapshot;

/// One line summarising the link, printed whenever it changes.
pub fn status_line(snapshot: &Snapshot) -> String {
    let mut line = format!(
        "{} | Bluetooth: {}",
        snapshot.status_text,
        if snapshot.bluetooth_ready { "OK" } else { "not ready" },
    );

    if let Some(rssi) = snapshot.last_rssi {
        line.push_str(&format!(" | RSSI: {}", rssi));
    }
    if snapshot.busy {
        line.push_str(" | processing command…");
    }
    if let Some(error) = &snapshot.last_error {
        line.push_str(&format!(" | {}", error));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            status_text: "ALARM".to_string(),
            connected: true,
            bluetooth_ready: true,
            busy: false,
            last_error: None,
            last_rssi: None,
            log_lines: vec![],
        }
    }

    #[test]
    fn minimal_line() {
        assert_eq!(status_line(&snapshot()), "ALARM | Bluetooth: OK");
    }

    #[test]
    fn full_line() {
        let snapshot = Snapshot {
            bluetooth_ready: false,
            busy: true,
            last_rssi: Some(-61),
            last_error: Some("Not connected".to_string()),
            ..snapshot()
        };

        assert_eq!(
            status_line(&snapshot),
            "ALARM | Bluetooth: not ready | RSSI: -61 | processing command… | Not connected",
        );
    }
}
