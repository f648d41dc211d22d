use std::io;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::types::UnavailableReason;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to read config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to start application (io): {source}")]
    IOError { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Device {0} is not known to the adapter")]
    UnknownDevice(String),

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,
}

/// Everything that can go wrong on the link. Each variant ends up in `last_error` and the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth unavailable: {0}")]
    AdapterUnavailable(UnavailableReason),

    #[error("Device not found after {seconds} s of scanning")]
    DiscoveryTimeout { seconds: u64 },

    #[error("Connection failed: {0}")]
    ConnectFailure(String),

    #[error("Disconnected: {0}")]
    Disconnected(String),

    #[error("Service resolution failed: {0}")]
    ServiceResolutionFailure(String),

    #[error("Cannot encode command {token:?}: {reason}")]
    CommandEncodingFailure { token: String, reason: &'static str },

    #[error("Failed to send command {token}: {reason}")]
    CommandWriteFailure { token: String, reason: String },

    #[error("Failed to read status: {0}")]
    StatusReadFailure(String),

    #[error("No response to command {token} after {seconds} s")]
    CommandTimeout { token: String, seconds: u64 },

    #[error("Not connected")]
    NotConnected,

    #[error("Command channel not available")]
    ChannelUnavailable,

    #[error("Command {0} is still waiting for a response")]
    CommandPending(String),

    #[error("The link has been shut down")]
    Stopped,
}
