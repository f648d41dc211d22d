use log::debug;

use crate::device::adapter::{Adapter, Scheduler};
use crate::device::session::Session;
use crate::device::types::{ConnectionState, PowerState, TimerKind};
use crate::error::LinkError;

impl<A: Adapter, S: Scheduler> Session<A, S> {
    /// Starts discovery unless the adapter is off or a scan or connection attempt is already
    /// running.
    pub fn start_scan(&mut self) {
        self.try_scan();
        self.publish();
    }

    pub(super) fn try_scan(&mut self) {
        if self.power != PowerState::PoweredOn {
            debug!("Not scanning, adapter is {:?}", self.power);
            return;
        }

        match self.state {
            ConnectionState::Scanning
            | ConnectionState::Connecting(_)
            | ConnectionState::Connected { .. } => {
                debug!("Not scanning, already {}", self.state);
            },
            _ => self.begin_scan(),
        }
    }

    /// Stops discovery and cancels the scan timeout.
    pub fn stop_scan(&mut self) {
        if self.halt_scan() {
            self.set_state(ConnectionState::Idle);
            self.record("Scan stopped");
            self.publish();
        }
    }

    // No guards: callers decide whether a scan is allowed.
    pub(super) fn begin_scan(&mut self) {
        let filter = match self.config.scan_with_service_filter {
            true => Some(self.config.service_uuid),
            false => None,
        };

        // a fresh scan supersedes any delayed retry
        self.disarm_timer(TimerKind::Retry);

        self.adapter.start_scan(filter);
        self.arm_timer(TimerKind::ScanTimeout, self.config.scan_timeout());
        self.set_state(ConnectionState::Scanning);
        self.record(format!("Scanning for {}", self.config.device_name));
    }

    /// Stops an active scan without changing the state. Returns whether a scan was running.
    pub(super) fn halt_scan(&mut self) -> bool {
        self.disarm_timer(TimerKind::ScanTimeout);

        if self.state == ConnectionState::Scanning {
            self.adapter.stop_scan();
            return true;
        }
        false
    }

    pub(super) fn on_scan_timeout(&mut self) {
        // a match may have been found while the timer was in flight
        if self.state != ConnectionState::Scanning {
            debug!("Scan timeout ignored, state is {}", self.state);
            return;
        }

        self.adapter.stop_scan();
        self.set_state(ConnectionState::DeviceNotFound);
        self.report(LinkError::DiscoveryTimeout {
            seconds: self.config.scan_timeout().as_secs(),
        });

        self.try_scan();
    }
}
