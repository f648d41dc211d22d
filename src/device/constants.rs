use uuid::Uuid;

/**
 * The name the alarm advertises itself with.
 */
pub const DEVICE_NAME: &str = "Mochila-Alarma";

/**
 * The UUID of the Bluetooth BLE service exposed by the alarm.
 */
pub const ALARM_SERVICE: &str = "12345678-1234-1234-1234-1234567890ab";

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic to write command tokens to.
 */
pub const ALARM_COMMAND_CHARACTERISTIC: &str = "abcd0001-1234-1234-1234-1234567890ab";

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that notifies the alarm status.
 */
pub const ALARM_STATUS_CHARACTERISTIC: &str = "abcd0002-1234-1234-1234-1234567890ab";

/**
 * How long (milliseconds) a scan may run without finding the alarm before it is restarted.
 */
pub const SCAN_TIMEOUT: u64 = 10_000;

/**
 * How long (milliseconds) to wait before scanning again after a disconnect or a failed connect.
 */
pub const RETRY_DELAY: u64 = 2_000;

/**
 * How long (milliseconds) the alarm may take to answer a command with a status update.
 */
pub const COMMAND_TIMEOUT: u64 = 3_000;

/**
 * Maximum number of entries kept in the diagnostic log.
 */
pub const LOG_CAPACITY: usize = 250;

/**
 * Longest command token (bytes) that fits a single write with the default ATT MTU.
 */
pub const MAX_COMMAND_LEN: usize = 20;

pub const COMMAND_ARM: &str = "ARM";
pub const COMMAND_DISARM: &str = "DISARM";
pub const COMMAND_STATUS: &str = "STATUS";
pub const COMMAND_PING: &str = "PING";

pub fn make_alarm_service_uuid() -> Uuid {
    Uuid::parse_str(ALARM_SERVICE).unwrap()
}

pub fn make_alarm_command_uuid() -> Uuid {
    Uuid::parse_str(ALARM_COMMAND_CHARACTERISTIC).unwrap()
}

pub fn make_alarm_status_uuid() -> Uuid {
    Uuid::parse_str(ALARM_STATUS_CHARACTERISTIC).unwrap()
}
