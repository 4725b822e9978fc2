// Pololu Maestro serial protocol implementation
//
// Pololu protocol (daisy-chain safe):
// Packet format: [0xAA, DeviceNumber, Command & 0x7F, Data...]
// 14-bit values are sent as two 7-bit bytes: [value & 0x7F, (value >> 7) & 0x7F]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the Maestro
pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Factory default device number
pub const DEFAULT_DEVICE_NUMBER: u8 = 0x0C;

/// Pololu protocol start byte
const COMMAND_START: u8 = 0xAA;

/// Command set (compact protocol values; MSB is cleared on the wire)
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Command {
    SetTarget = 0x84,
    SetSpeed = 0x87,
    SetAcceleration = 0x89,
    GetPosition = 0x90,
    GetMovingState = 0x93,
    SetMultipleTargets = 0x9F,
    GetErrors = 0xA1,
}

/// Decoded Maestro error register bits
pub const ERROR_FLAGS: [(u16, &str); 9] = [
    (1 << 0, "serial signal error"),
    (1 << 1, "serial overrun error"),
    (1 << 2, "serial buffer full"),
    (1 << 3, "serial CRC error"),
    (1 << 4, "serial protocol error"),
    (1 << 5, "serial timeout"),
    (1 << 6, "script stack error"),
    (1 << 7, "script call stack error"),
    (1 << 8, "script program counter error"),
];

/// Error types for Maestro communication
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for Maestro reply to {command:?}")]
    Timeout { command: Command },

    #[error("Channels are not sequential: {channels:?}")]
    ChannelsNotSequential { channels: Vec<u8> },

    #[error("Invalid servo command: {reason}")]
    InvalidCommand { reason: String },
}

pub type Result<T> = std::result::Result<T, MaestroError>;

/// Servo controller operations needed by the hexapod adapter.
///
/// Implemented by [`MaestroBus`] for real hardware; tests substitute a recorder.
pub trait ServoBus: Send {
    /// Set one channel's target in quarter-microseconds (0 = pulses off)
    fn set_target(&mut self, channel: u8, target: u16) -> Result<()>;

    /// Set a contiguous block of channels at once: [(channel, target), ...]
    fn set_multiple_targets(&mut self, targets: &[(u8, u16)]) -> Result<()>;

    /// Speed limit in units of 0.25us/10ms, 0 = unlimited
    fn set_speed(&mut self, channel: u8, speed: u16) -> Result<()>;

    /// Acceleration limit in units of 0.25us/10ms/80ms, 0 = unlimited
    fn set_acceleration(&mut self, channel: u8, accel: u16) -> Result<()>;

    /// True while at least one servo is still moving toward its target
    fn get_moving_state(&mut self) -> Result<bool>;
}

/// Maestro servo controller on a serial port
pub struct MaestroBus {
    port: Box<dyn SerialPort>,
    device_number: u8,
}

impl MaestroBus {
    /// Open a connection to the controller
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            device_number: DEFAULT_DEVICE_NUMBER,
        })
    }

    /// Address a Maestro with a non-default device number on a shared line
    pub fn with_device_number(mut self, device_number: u8) -> Self {
        self.device_number = device_number & 0x7F;
        self
    }

    /// Split a 14-bit value into the two 7-bit data bytes
    fn encode_14bit(value: u16) -> [u8; 2] {
        [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
    }

    /// Build a Pololu-protocol packet
    fn build_packet(device_number: u8, command: Command, data: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(3 + data.len());
        packet.push(COMMAND_START);
        packet.push(device_number);
        packet.push(command as u8 & 0x7F);
        packet.extend_from_slice(data);
        packet
    }

    /// Build a set-multiple-targets packet, rejecting gaps in the channel block
    fn build_multiple_targets(device_number: u8, targets: &[(u8, u16)]) -> Result<Vec<u8>> {
        let Some(&(first_channel, _)) = targets.first() else {
            return Err(MaestroError::InvalidCommand {
                reason: "no targets given".to_string(),
            });
        };

        let sequential = targets
            .iter()
            .enumerate()
            .all(|(i, &(channel, _))| channel as usize == first_channel as usize + i);
        if !sequential {
            return Err(MaestroError::ChannelsNotSequential {
                channels: targets.iter().map(|&(c, _)| c).collect(),
            });
        }

        let mut data = Vec::with_capacity(2 + targets.len() * 2);
        data.push(targets.len() as u8);
        data.push(first_channel);
        for &(_, target) in targets {
            data.extend_from_slice(&Self::encode_14bit(target));
        }
        Ok(Self::build_packet(
            device_number,
            Command::SetMultipleTargets,
            &data,
        ))
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a fixed-size reply
    fn read_reply<const N: usize>(&mut self, command: Command) -> Result<[u8; N]> {
        let mut reply = [0u8; N];
        self.port.read_exact(&mut reply).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                MaestroError::Timeout { command }
            } else {
                MaestroError::Io(e)
            }
        })?;
        Ok(reply)
    }

    /// Read a channel's current position in quarter-microseconds
    pub fn get_position(&mut self, channel: u8) -> Result<u16> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        let packet = Self::build_packet(self.device_number, Command::GetPosition, &[channel]);
        self.send_packet(&packet)?;
        let reply = self.read_reply::<2>(Command::GetPosition)?;
        Ok(u16::from_le_bytes(reply))
    }

    /// Read and clear the error register
    pub fn get_errors(&mut self) -> Result<u16> {
        let packet = Self::build_packet(self.device_number, Command::GetErrors, &[]);
        self.send_packet(&packet)?;
        let reply = self.read_reply::<2>(Command::GetErrors)?;
        Ok(u16::from_le_bytes(reply))
    }
}

impl ServoBus for MaestroBus {
    fn set_target(&mut self, channel: u8, target: u16) -> Result<()> {
        let [lo, hi] = Self::encode_14bit(target);
        let packet = Self::build_packet(self.device_number, Command::SetTarget, &[channel, lo, hi]);
        debug!("Set target: channel={}, target={}", channel, target);
        self.send_packet(&packet)
    }

    fn set_multiple_targets(&mut self, targets: &[(u8, u16)]) -> Result<()> {
        let packet = Self::build_multiple_targets(self.device_number, targets)?;
        debug!("Set multiple targets: {} channels", targets.len());
        self.send_packet(&packet)
    }

    fn set_speed(&mut self, channel: u8, speed: u16) -> Result<()> {
        let [lo, hi] = Self::encode_14bit(speed);
        let packet = Self::build_packet(self.device_number, Command::SetSpeed, &[channel, lo, hi]);
        self.send_packet(&packet)
    }

    fn set_acceleration(&mut self, channel: u8, accel: u16) -> Result<()> {
        let [lo, hi] = Self::encode_14bit(accel);
        let packet = Self::build_packet(
            self.device_number,
            Command::SetAcceleration,
            &[channel, lo, hi],
        );
        self.send_packet(&packet)
    }

    fn get_moving_state(&mut self) -> Result<bool> {
        let packet = Self::build_packet(self.device_number, Command::GetMovingState, &[]);
        self.send_packet(&packet)?;
        let reply = self.read_reply::<1>(Command::GetMovingState)?;
        Ok(reply[0] == 0x01)
    }
}

/// Names of the error bits set in a Maestro error register value
pub fn describe_errors(code: u16) -> Vec<&'static str> {
    ERROR_FLAGS
        .iter()
        .filter(|(bit, _)| code & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_target_packet() {
        // Channel 0 to 1500us (6000 quarter-us) on device 12
        let [lo, hi] = MaestroBus::encode_14bit(6000);
        let packet = MaestroBus::build_packet(DEFAULT_DEVICE_NUMBER, Command::SetTarget, &[0, lo, hi]);
        assert_eq!(packet, vec![0xAA, 0x0C, 0x04, 0x00, 0x70, 0x2E]);
    }

    #[test]
    fn test_multiple_targets_packet() {
        // Channel 3 off, channel 4 neutral
        let packet =
            MaestroBus::build_multiple_targets(DEFAULT_DEVICE_NUMBER, &[(3, 0), (4, 6000)]).unwrap();
        assert_eq!(
            packet,
            vec![0xAA, 0x0C, 0x1F, 0x02, 0x03, 0x00, 0x00, 0x70, 0x2E]
        );
    }

    #[test]
    fn test_multiple_targets_rejects_gaps() {
        let err = MaestroBus::build_multiple_targets(DEFAULT_DEVICE_NUMBER, &[(0, 0), (2, 0)])
            .unwrap_err();
        assert!(matches!(err, MaestroError::ChannelsNotSequential { .. }));

        let err = MaestroBus::build_multiple_targets(DEFAULT_DEVICE_NUMBER, &[]).unwrap_err();
        assert!(matches!(err, MaestroError::InvalidCommand { .. }));
    }

    #[test]
    fn test_query_packets_have_no_data() {
        let packet = MaestroBus::build_packet(DEFAULT_DEVICE_NUMBER, Command::GetMovingState, &[]);
        assert_eq!(packet, vec![0xAA, 0x0C, 0x13]);
        let packet = MaestroBus::build_packet(DEFAULT_DEVICE_NUMBER, Command::GetErrors, &[]);
        assert_eq!(packet, vec![0xAA, 0x0C, 0x21]);
    }

    #[test]
    fn test_describe_errors() {
        assert!(describe_errors(0).is_empty());
        assert_eq!(
            describe_errors(0b1_0001_0000),
            vec!["serial protocol error", "script program counter error"]
        );
    }
}
