use log::debug;
use uuid::Uuid;

use crate::device::adapter::{Adapter, Scheduler};
use crate::device::session::Session;
use crate::device::types::{ChannelHandle, CharacteristicInfo, ConnectionState, DeviceId};
use crate::error::LinkError;

impl<A: Adapter, S: Scheduler> Session<A, S> {
    pub(super) fn resolve_service(&mut self) {
        if let Some(device) = self.connected_device(None) {
            debug!("Discovering service {} on {}", self.config.service_uuid, device);
            self.adapter.discover_service(&device, self.config.service_uuid);
        }
    }

    pub(super) fn on_services_discovered(&mut self, id: DeviceId, result: Result<Vec<Uuid>, String>) {
        let Some(device) = self.connected_device(Some(&id)) else {
            debug!("Ignoring services of {} while {}", id, self.state);
            return;
        };

        // The link itself is fine, so the state stays Connected even when the service is missing.
        let services = match result {
            Ok(services) => services,
            Err(reason) => {
                self.report(LinkError::ServiceResolutionFailure(reason));
                return;
            },
        };

        let service = self.config.service_uuid;
        if !services.contains(&service) {
            self.report(LinkError::ServiceResolutionFailure(format!("service {} not found", service)));
            return;
        }

        let wanted = [self.config.command_uuid, self.config.status_uuid];
        debug!("Discovering characteristics {:?} of {}", wanted, service);
        self.adapter.discover_characteristics(&device, service, &wanted);
    }

    pub(super) fn on_characteristics_discovered(
        &mut self,
        id: DeviceId,
        service: Uuid,
        result: Result<Vec<CharacteristicInfo>, String>,
    ) {
        let Some(device) = self.connected_device(Some(&id)) else {
            debug!("Ignoring characteristics of {} while {}", id, self.state);
            return;
        };

        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(reason) => {
                self.report(LinkError::ServiceResolutionFailure(reason));
                return;
            },
        };

        let channel = |uuid: Uuid| ChannelHandle { device: device.clone(), service, characteristic: uuid };

        let command = characteristics.iter()
            .find(|c| c.uuid == self.config.command_uuid && c.writable)
            .map(|c| channel(c.uuid));
        let status = characteristics.iter()
            .find(|c| c.uuid == self.config.status_uuid && c.notifiable)
            .map(|c| channel(c.uuid));

        if let ConnectionState::Connected { command: command_slot, status: status_slot, .. } = &mut self.state {
            *command_slot = command.clone();
            *status_slot = status.clone();
        }

        if let Some(status) = &status {
            self.adapter.set_notify(status, true);
            // values set before we subscribed never arrive as notifications
            self.adapter.read_value(status);
        }

        let mut missing = Vec::new();
        if command.is_none() {
            missing.push("command");
        }
        if status.is_none() {
            missing.push("status");
        }

        if missing.is_empty() {
            self.record("Command and status channels ready");
        } else {
            self.report(LinkError::ServiceResolutionFailure(format!(
                "missing {} characteristic",
                missing.join(" and "),
            )));
        }
    }

    pub(super) fn on_notify_changed(&mut self, channel: ChannelHandle, result: Result<bool, String>) {
        if !self.is_status_channel(&channel) {
            debug!("Ignoring notify change of {:?}", channel);
            return;
        }

        match result {
            Ok(true) => self.record("Subscribed to status updates"),
            Ok(false) => self.record("Unsubscribed from status updates"),
            Err(reason) => self.report(LinkError::ServiceResolutionFailure(format!(
                "could not subscribe to status updates: {}",
                reason,
            ))),
        }
    }

    /// The id of the connected device, optionally only when it is `expected`.
    fn connected_device(&self, expected: Option<&DeviceId>) -> Option<DeviceId> {
        match &self.state {
            ConnectionState::Connected { device, .. } => match expected {
                Some(expected) if expected != &device.id => None,
                _ => Some(device.id.clone()),
            },
            _ => None,
        }
    }

    pub(super) fn is_status_channel(&self, channel: &ChannelHandle) -> bool {
        match &self.state {
            ConnectionState::Connected { status: Some(status), .. } => status == channel,
            _ => false,
        }
    }

    pub(super) fn is_command_channel(&self, channel: &ChannelHandle) -> bool {
        match &self.state {
            ConnectionState::Connected { command: Some(command), .. } => command == channel,
            _ => false,
        }
    }
}
