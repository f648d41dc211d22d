use log::debug;

use crate::device::adapter::{Adapter, Scheduler};
use crate::device::session::Session;
use crate::device::types::{
    Advertisement, ConnectionState, DeviceHandle, DeviceId, PowerState, TimerKind,
};
use crate::error::LinkError;

impl<A: Adapter, S: Scheduler> Session<A, S> {
    /// Drops whatever the link is doing and scans again. This is the only way to recover out of
    /// band, so it ignores the usual guards.
    pub fn reconnect(&mut self) {
        if let PowerState::Unavailable(reason) = self.power {
            self.report(LinkError::AdapterUnavailable(reason));
            self.publish();
            return;
        }

        self.disarm_all_timers();
        self.pending = None;

        match &self.state {
            ConnectionState::Scanning => self.adapter.stop_scan(),
            ConnectionState::Connecting(device) | ConnectionState::Connected { device, .. } => {
                let id = device.id.clone();
                self.adapter.cancel_connection(&id);
                self.cancelled = Some(id);
            },
            _ => {},
        }

        self.set_state(ConnectionState::Idle);
        self.record("Reconnect requested");
        self.begin_scan();
        self.publish();
    }

    pub(super) fn on_power_changed(&mut self, power: PowerState) {
        match power {
            PowerState::PoweredOn => {
                if self.power == PowerState::PoweredOn {
                    debug!("Adapter already powered on");
                    return;
                }

                self.power = power;
                self.last_error = None;
                self.set_state(ConnectionState::Idle);
                self.record("Bluetooth powered on");
                self.try_scan();
            },
            PowerState::Unavailable(reason) => {
                if self.state == ConnectionState::AdapterUnavailable(reason) {
                    debug!("Adapter still unavailable ({})", reason);
                    self.power = power;
                    return;
                }

                // Cold abort: the adapter is gone, so there is nobody to stop the scan or cancel
                // the connection with. Only our own bookkeeping is dropped.
                self.power = power;
                self.disarm_all_timers();
                self.pending = None;
                self.cancelled = None;
                self.set_state(ConnectionState::AdapterUnavailable(reason));
                self.report(LinkError::AdapterUnavailable(reason));
            },
        }
    }

    pub(super) fn on_discovered(&mut self, advertisement: Advertisement) {
        if let Some(rssi) = advertisement.rssi {
            self.last_rssi = Some(rssi);

            match &mut self.state {
                ConnectionState::Connecting(device) | ConnectionState::Connected { device, .. }
                    if device.id == advertisement.device => {
                    device.rssi = Some(rssi);
                },
                _ => {},
            }
        }

        if self.power != PowerState::PoweredOn {
            return;
        }

        match self.state {
            ConnectionState::Idle | ConnectionState::Scanning | ConnectionState::DeviceNotFound => {},
            _ => return,
        }

        if !self.matcher.matches(&advertisement) {
            debug!(
                "Ignoring {} {:?} {:?}",
                advertisement.device,
                advertisement.local_name.as_deref().or(advertisement.name.as_deref()),
                advertisement.rssi,
            );
            return;
        }

        let name = advertisement.local_name
            .or(advertisement.name)
            .unwrap_or_else(|| self.config.device_name.clone());
        let device = DeviceHandle {
            id: advertisement.device,
            name,
            rssi: advertisement.rssi,
        };

        self.halt_scan();
        self.disarm_timer(TimerKind::Retry);
        self.adapter.connect(&device.id);

        let message = match device.rssi {
            Some(rssi) => format!("Found {} ({} dBm), connecting", device.name, rssi),
            None => format!("Found {}, connecting", device.name),
        };
        self.set_state(ConnectionState::Connecting(device));
        self.record(message);
    }

    pub(super) fn on_connected(&mut self, id: DeviceId) {
        let device = match &self.state {
            ConnectionState::Connecting(device) if device.id == id => device.clone(),
            _ => {
                debug!("Ignoring connect of {} while {}", id, self.state);
                return;
            },
        };

        self.last_error = None;
        self.forget_cancelled(&id);
        let name = device.name.clone();
        self.set_state(ConnectionState::Connected { device, command: None, status: None });
        self.record(format!("Connected to {}", name));
        self.resolve_service();
    }

    pub(super) fn on_connect_failed(&mut self, id: DeviceId, reason: String) {
        match &self.state {
            ConnectionState::Connecting(device) if device.id == id => {},
            _ => {
                debug!("Ignoring connect failure of {} while {}", id, self.state);
                return;
            },
        }

        self.forget_cancelled(&id);
        self.set_state(ConnectionState::ConnectError(reason.clone()));
        self.report(LinkError::ConnectFailure(reason));
        self.schedule_retry();
    }

    pub(super) fn on_disconnected(&mut self, id: DeviceId, reason: Option<String>) {
        // the teardown started by `reconnect` may report back after a new attempt began
        if self.cancelled.as_ref() == Some(&id) {
            self.cancelled = None;
            if matches!(&self.state, ConnectionState::Connecting(device) if device.id == id) {
                debug!("Ignoring disconnect of {} left over from reconnect", id);
                return;
            }
        }

        let name = match self.state.device() {
            Some(device) if device.id == id => device.name.clone(),
            _ => {
                debug!("Ignoring disconnect of {} while {}", id, self.state);
                return;
            },
        };

        self.disarm_timer(TimerKind::CommandTimeout);
        self.pending = None;
        self.set_state(ConnectionState::Idle);

        match reason {
            Some(reason) => self.report(LinkError::Disconnected(reason)),
            None => self.record(format!("Disconnected from {}", name)),
        }

        self.schedule_retry();
    }

    pub(super) fn on_retry(&mut self) {
        self.try_scan();
    }

    fn forget_cancelled(&mut self, id: &DeviceId) {
        if self.cancelled.as_ref() == Some(id) {
            self.cancelled = None;
        }
    }

    fn schedule_retry(&mut self) {
        let delay = self.config.retry_delay();
        debug!("Scanning again in {}", humantime::format_duration(delay));
        self.arm_timer(TimerKind::Retry, delay);
    }
}
