use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Opaque adapter-assigned identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    PoweredOff,
    Unauthorized,
    Unsupported,
    Resetting,
    Unknown,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            UnavailableReason::PoweredOff => "powered off",
            UnavailableReason::Unauthorized => "not allowed to access Bluetooth",
            UnavailableReason::Unsupported => "not supported",
            UnavailableReason::Resetting => "resetting",
            UnavailableReason::Unknown => "state unknown",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    PoweredOn,
    Unavailable(UnavailableReason),
}

/// One discovery callback from the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub device: DeviceId,
    /// The name the platform reports for the peripheral (may be cached from an earlier connection).
    pub name: Option<String>,
    /// The local name carried in the advertisement payload itself.
    pub local_name: Option<String>,
    pub services: Option<Vec<Uuid>>,
    pub rssi: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: DeviceId,
    pub name: String,
    pub rssi: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub device: DeviceId,
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// A characteristic as reported by characteristic discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub writable: bool,
    pub notifiable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    AdapterUnavailable(UnavailableReason),
    Idle,
    Scanning,
    Connecting(DeviceHandle),
    Connected {
        device: DeviceHandle,
        command: Option<ChannelHandle>,
        status: Option<ChannelHandle>,
    },
    DeviceNotFound,
    ConnectError(String),
}

impl ConnectionState {
    /// The device held by the current connection attempt, if any.
    pub fn device(&self) -> Option<&DeviceHandle> {
        match self {
            ConnectionState::Connecting(device) => Some(device),
            ConnectionState::Connected { device, .. } => Some(device),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::AdapterUnavailable(reason) => write!(f, "Bluetooth unavailable ({})", reason),
            ConnectionState::Idle => write!(f, "Disconnected"),
            ConnectionState::Scanning => write!(f, "Scanning…"),
            ConnectionState::Connecting(device) => write!(f, "Connecting to {}…", device.name),
            ConnectionState::Connected { .. } => write!(f, "Connected"),
            ConnectionState::DeviceNotFound => write!(f, "Device not found"),
            ConnectionState::ConnectError(reason) => write!(f, "Connection failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub token: String,
    pub issued_at: Instant,
}

/// Everything that can happen to the link. Adapter callbacks, results and timer expiry all arrive
/// through the same queue.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    PowerChanged(PowerState),
    Discovered(Advertisement),
    Connected(DeviceId),
    ConnectFailed {
        device: DeviceId,
        reason: String,
    },
    Disconnected {
        device: DeviceId,
        reason: Option<String>,
    },
    ServicesDiscovered {
        device: DeviceId,
        result: Result<Vec<Uuid>, String>,
    },
    CharacteristicsDiscovered {
        device: DeviceId,
        service: Uuid,
        result: Result<Vec<CharacteristicInfo>, String>,
    },
    NotifyChanged {
        channel: ChannelHandle,
        result: Result<bool, String>,
    },
    ValueUpdated {
        channel: ChannelHandle,
        result: Result<Vec<u8>, String>,
    },
    WriteCompleted {
        channel: ChannelHandle,
        result: Result<(), String>,
    },
    TimerFired(TimerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    ScanTimeout,
    Retry,
    CommandTimeout,
}

/// What observers get to see of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status_text: String,
    pub connected: bool,
    pub bluetooth_ready: bool,
    pub busy: bool,
    pub last_error: Option<String>,
    pub last_rssi: Option<i16>,
    pub log_lines: Vec<String>,
}
