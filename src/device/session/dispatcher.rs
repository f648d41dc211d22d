use std::time::Instant;
use log::debug;

use crate::device::adapter::{Adapter, Scheduler};
use crate::device::constants::{
    COMMAND_ARM, COMMAND_DISARM, COMMAND_PING, COMMAND_STATUS, MAX_COMMAND_LEN,
};
use crate::device::session::Session;
use crate::device::types::{ChannelHandle, ConnectionState, PendingCommand, TimerKind};
use crate::error::LinkError;

/// Turns a command token into the bytes written to the command characteristic. Tokens are sent
/// as-is, without framing.
pub fn encode_command(token: &str) -> Result<Vec<u8>, LinkError> {
    let failure = |reason: &'static str| LinkError::CommandEncodingFailure {
        token: token.to_string(),
        reason,
    };

    if token.is_empty() {
        return Err(failure("empty token"));
    }
    if token.len() > MAX_COMMAND_LEN {
        return Err(failure("longer than 20 bytes"));
    }
    if token.chars().any(char::is_control) {
        return Err(failure("contains control characters"));
    }

    Ok(token.as_bytes().to_vec())
}

/// Turns a status value into display text. The firmware may pad values with NULs.
pub fn decode_status(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

impl<A: Adapter, S: Scheduler> Session<A, S> {
    /// Writes `token` to the command channel and waits for the next status update as the
    /// response. Rejected requests leave the pending command alone.
    pub fn send_command(&mut self, token: &str) -> Result<(), LinkError> {
        let result = self.dispatch(token);

        if let Err(err) = &result {
            self.report(err.clone());
        }
        self.publish();
        result
    }

    pub fn arm(&mut self) -> Result<(), LinkError> {
        self.send_command(COMMAND_ARM)
    }

    pub fn disarm(&mut self) -> Result<(), LinkError> {
        self.send_command(COMMAND_DISARM)
    }

    pub fn request_status(&mut self) -> Result<(), LinkError> {
        self.send_command(COMMAND_STATUS)
    }

    pub fn ping(&mut self) -> Result<(), LinkError> {
        self.send_command(COMMAND_PING)
    }

    fn dispatch(&mut self, token: &str) -> Result<(), LinkError> {
        let channel = match &self.state {
            ConnectionState::Connected { command: Some(command), .. } => command.clone(),
            ConnectionState::Connected { command: None, .. } => return Err(LinkError::ChannelUnavailable),
            _ => return Err(LinkError::NotConnected),
        };

        if let Some(pending) = &self.pending {
            return Err(LinkError::CommandPending(pending.token.clone()));
        }

        let bytes = encode_command(token)?;
        self.adapter.write(&channel, bytes);

        self.pending = Some(PendingCommand {
            token: token.to_string(),
            issued_at: Instant::now(),
        });
        self.arm_timer(TimerKind::CommandTimeout, self.config.command_timeout());
        self.record(format!("Sent {}", token));
        Ok(())
    }

    pub(super) fn on_write_completed(&mut self, channel: ChannelHandle, result: Result<(), String>) {
        if !self.is_command_channel(&channel) {
            debug!("Ignoring write result for {:?}", channel);
            return;
        }

        match result {
            Ok(()) => debug!("Write acknowledged"),
            Err(reason) => match self.pending.take() {
                Some(pending) => {
                    self.disarm_timer(TimerKind::CommandTimeout);
                    self.report(LinkError::CommandWriteFailure { token: pending.token, reason });
                },
                // the command already timed out or was answered
                None => self.record(format!("Late write failure: {}", reason)),
            },
        }
    }

    pub(super) fn on_value_updated(&mut self, channel: ChannelHandle, result: Result<Vec<u8>, String>) {
        if !self.is_status_channel(&channel) {
            debug!("Ignoring value of {:?}", channel);
            return;
        }

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(reason) => {
                self.report(LinkError::StatusReadFailure(reason));
                return;
            },
        };

        let text = decode_status(&bytes);

        // any status update answers the pending command
        let answered = self.pending.take();
        self.disarm_timer(TimerKind::CommandTimeout);
        self.last_error = None;
        self.device_status = Some(text.clone());

        match answered {
            Some(pending) => self.record(format!("Status {} (after {})", text, pending.token)),
            None => self.record(format!("Status {}", text)),
        }
    }

    pub(super) fn on_command_timeout(&mut self) {
        // the response may have raced the timer
        let Some(pending) = self.pending.take() else {
            debug!("Command timeout ignored, nothing pending");
            return;
        };

        self.report(LinkError::CommandTimeout {
            token: pending.token,
            seconds: self.config.command_timeout().as_secs(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_tokens_as_plain_utf8() {
        assert_eq!(encode_command("ARM").unwrap(), b"ARM".to_vec());
        assert_eq!(encode_command("DISARM").unwrap(), b"DISARM".to_vec());
    }

    #[test]
    fn rejects_unencodable_tokens() {
        assert!(matches!(encode_command(""), Err(LinkError::CommandEncodingFailure { .. })));
        assert!(matches!(encode_command("ARM\n"), Err(LinkError::CommandEncodingFailure { .. })));
        assert!(matches!(
            encode_command("A-VERY-LONG-COMMAND-TOKEN"),
            Err(LinkError::CommandEncodingFailure { .. })
        ));
    }

    #[test]
    fn decodes_status_text() {
        assert_eq!(decode_status(b"ALARM"), "ALARM");
        assert_eq!(decode_status(b"ARMED\0\0"), "ARMED");
        assert_eq!(decode_status(b" DISARMED\r\n"), "DISARMED");
        assert_eq!(decode_status(&[0x4f, 0x4b, 0xff]), "OK\u{fffd}");
    }
}
