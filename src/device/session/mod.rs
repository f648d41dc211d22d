//! The link state machine.
//!
//! A [`Session`] owns every piece of mutable link state and is only ever mutated through `&mut self`,
//! one event or user request at a time. It never waits: it issues fire-and-forget calls on its
//! [`Adapter`], arms timers on its [`Scheduler`], and learns about outcomes through
//! [`Session::handle_event`]. Observers get one snapshot per public call, taken once the step is
//! complete.
//!
//! The behaviour is split over several files, one per concern:
//! - `scan`: starting/stopping discovery and the scan timeout
//! - `link`: adapter power, connect, disconnect and retry
//! - `resolver`: service and characteristic resolution after connecting
//! - `dispatcher`: command writes, the pending command and status updates

use std::time::Duration;
use log::{debug, info, warn};

use crate::config::types::LinkConfig;
use crate::device::adapter::{Adapter, Scheduler};
use crate::device::constants::LOG_CAPACITY;
use crate::device::log_ring::LogRing;
use crate::device::matcher::DeviceMatcher;
use crate::device::types::{
    ConnectionState, DeviceId, LinkEvent, PendingCommand, PowerState, Snapshot, TimerId, TimerKind,
    UnavailableReason,
};
use crate::error::LinkError;

mod dispatcher;
mod link;
mod resolver;
mod scan;


pub use dispatcher::{decode_status, encode_command};

type Observer = Box<dyn FnMut(&Snapshot) + Send>;

pub struct Session<A: Adapter, S: Scheduler> {
    adapter: A,
    scheduler: S,
    config: LinkConfig,
    matcher: DeviceMatcher,

    state: ConnectionState,
    power: PowerState,
    // last status text pushed by the device, only meaningful while connected
    device_status: Option<String>,
    pending: Option<PendingCommand>,
    last_error: Option<String>,
    last_rssi: Option<i16>,
    logs: LogRing,
    // link torn down by `reconnect` whose disconnect report may still be on its way
    cancelled: Option<DeviceId>,

    // at most one live timer per kind
    scan_timer: Option<TimerId>,
    retry_timer: Option<TimerId>,
    command_timer: Option<TimerId>,
    next_timer_id: u64,

    observer: Option<Observer>,
    published: Option<Snapshot>,
}

impl<A: Adapter, S: Scheduler> Session<A, S> {
    pub fn new(config: LinkConfig, adapter: A, scheduler: S) -> Self {
        let matcher = DeviceMatcher::new(config.device_name.clone(), config.service_uuid);
        let unknown = UnavailableReason::Unknown;

        Session {
            adapter,
            scheduler,
            config,
            matcher,
            state: ConnectionState::AdapterUnavailable(unknown),
            power: PowerState::Unavailable(unknown),
            device_status: None,
            pending: None,
            last_error: None,
            last_rssi: None,
            logs: LogRing::new(LOG_CAPACITY),
            cancelled: None,
            scan_timer: None,
            retry_timer: None,
            command_timer: None,
            next_timer_id: 0,
            observer: None,
            published: None,
        }
    }

    /// Registers the callback that receives a snapshot every time the published state changes.
    pub fn set_observer(&mut self, observer: impl FnMut(&Snapshot) + Send + 'static) {
        self.observer = Some(Box::new(observer));
        self.published = None;
        self.publish();
    }

    pub fn start(&mut self) {
        self.record(format!("Waiting for Bluetooth to look for {}", self.config.device_name));
        self.publish();
    }

    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::PowerChanged(power) => self.on_power_changed(power),
            LinkEvent::Discovered(advertisement) => self.on_discovered(advertisement),
            LinkEvent::Connected(device) => self.on_connected(device),
            LinkEvent::ConnectFailed { device, reason } => self.on_connect_failed(device, reason),
            LinkEvent::Disconnected { device, reason } => self.on_disconnected(device, reason),
            LinkEvent::ServicesDiscovered { device, result } => self.on_services_discovered(device, result),
            LinkEvent::CharacteristicsDiscovered { device, service, result } => {
                self.on_characteristics_discovered(device, service, result)
            },
            LinkEvent::NotifyChanged { channel, result } => self.on_notify_changed(channel, result),
            LinkEvent::ValueUpdated { channel, result } => self.on_value_updated(channel, result),
            LinkEvent::WriteCompleted { channel, result } => self.on_write_completed(channel, result),
            LinkEvent::TimerFired(id) => self.on_timer_fired(id),
        }

        self.publish();
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.record("Log cleared");
        self.publish();
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn logs(&self) -> &LogRing {
        &self.logs
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn active_timer(&self, kind: TimerKind) -> Option<TimerId> {
        match kind {
            TimerKind::ScanTimeout => self.scan_timer,
            TimerKind::Retry => self.retry_timer,
            TimerKind::CommandTimeout => self.command_timer,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let status_text = match (&self.state, &self.device_status) {
            (ConnectionState::Connected { .. }, Some(text)) => text.clone(),
            (state, _) => state.to_string(),
        };

        Snapshot {
            status_text,
            connected: self.state.is_connected(),
            bluetooth_ready: self.power == PowerState::PoweredOn,
            busy: self.pending.is_some(),
            last_error: self.last_error.clone(),
            last_rssi: self.last_rssi,
            log_lines: self.logs.lines(),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        if self.published.as_ref() == Some(&snapshot) {
            return;
        }

        if let Some(observer) = self.observer.as_mut() {
            observer(&snapshot);
        }
        self.published = Some(snapshot);
    }

    fn set_state(&mut self, state: ConnectionState) {
        debug!("{:?} -> {:?}", self.state, state);

        if !state.is_connected() {
            self.device_status = None;
        }
        self.state = state;
    }

    fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.logs.push(message);
    }

    fn report(&mut self, error: LinkError) {
        let message = error.to_string();
        warn!("{}", message);
        self.logs.push(message.clone());
        self.last_error = Some(message);
    }

    fn timer_slot(&mut self, kind: TimerKind) -> &mut Option<TimerId> {
        match kind {
            TimerKind::ScanTimeout => &mut self.scan_timer,
            TimerKind::Retry => &mut self.retry_timer,
            TimerKind::CommandTimeout => &mut self.command_timer,
        }
    }

    /// Replaces the timer of this kind, cancelling the previous one first.
    fn arm_timer(&mut self, kind: TimerKind, after: Duration) -> TimerId {
        self.disarm_timer(kind);

        self.next_timer_id += 1;
        let id = TimerId(self.next_timer_id);
        self.scheduler.schedule(id, kind, after);
        *self.timer_slot(kind) = Some(id);
        id
    }

    fn disarm_timer(&mut self, kind: TimerKind) {
        if let Some(id) = self.timer_slot(kind).take() {
            self.scheduler.cancel(id);
        }
    }

    fn disarm_all_timers(&mut self) {
        self.disarm_timer(TimerKind::ScanTimeout);
        self.disarm_timer(TimerKind::Retry);
        self.disarm_timer(TimerKind::CommandTimeout);
    }

    fn on_timer_fired(&mut self, id: TimerId) {
        let kind = [TimerKind::ScanTimeout, TimerKind::Retry, TimerKind::CommandTimeout]
            .into_iter()
            .find(|kind| self.active_timer(*kind) == Some(id));

        let Some(kind) = kind else {
            debug!("Ignoring stale timer {:?}", id);
            return;
        };

        // releases the scheduler's bookkeeping for a timer that already fired
        self.disarm_timer(kind);

        match kind {
            TimerKind::ScanTimeout => self.on_scan_timeout(),
            TimerKind::Retry => self.on_retry(),
            TimerKind::CommandTimeout => self.on_command_timeout(),
        }
    }
}
