use std::time::Duration;
use uuid::Uuid;

use crate::device::types::{ChannelHandle, DeviceId, TimerId, TimerKind};

/// The radio as seen by the session. Every call returns immediately; outcomes come back later as
/// [`LinkEvent`](crate::device::types::LinkEvent)s on the session's event queue.
pub trait Adapter {
    fn start_scan(&mut self, service_filter: Option<Uuid>);
    fn stop_scan(&mut self);
    fn connect(&mut self, device: &DeviceId);
    fn cancel_connection(&mut self, device: &DeviceId);
    fn discover_service(&mut self, device: &DeviceId, service: Uuid);
    fn discover_characteristics(&mut self, device: &DeviceId, service: Uuid, characteristics: &[Uuid]);
    fn write(&mut self, channel: &ChannelHandle, bytes: Vec<u8>);
    fn read_value(&mut self, channel: &ChannelHandle);
    fn set_notify(&mut self, channel: &ChannelHandle, enabled: bool);
}

/// Delayed continuations. A scheduled timer comes back as `LinkEvent::TimerFired(id)` unless it
/// was cancelled first.
pub trait Scheduler {
    fn schedule(&mut self, id: TimerId, kind: TimerKind, after: Duration);
    fn cancel(&mut self, id: TimerId);
}
