//! Fixed wire constants for the serial-port link

use bluer::Uuid;
use std::time::Duration;

/// Well-known Serial Port Profile service class.
///
/// Requesting a channel by this identifier lets the stack perform the
/// service-to-RFCOMM-channel mapping (usually channel 1, but not always).
pub const SERIAL_PORT_SERVICE: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// Heartbeat marker written by `ping`. Receivers discard this line.
pub const HEARTBEAT: &[u8] = b"ignore\n";

/// Delay after each byte written by `send`.
///
/// The link has no CTS/RTS, so the only flow control is pacing.
pub const SEND_PACING: Duration = Duration::from_millis(50);
