use std::time::Duration;

/// Payload bytes carried by one data frame.
pub const PAYLOAD_LEN: usize = 20;
/// Width of the checksum field, in ASCII digits.
pub const CHECKSUM_LEN: usize = 5;
/// Total length of every frame on the wire, data or ack.
pub const FRAME_LEN: usize = 30;
/// Bytes covered by the checksum (everything before the checksum field).
pub const BODY_LEN: usize = FRAME_LEN - CHECKSUM_LEN;

pub const FILLER: u8 = b' ';
pub const RESERVED_FLAG: u8 = b'0';

pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 200;
pub const DEFAULT_TRANSMISSION_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LINGER: Duration = Duration::from_secs(5);

pub const MAX_DELAY_SECS: u32 = 5;
pub const DEFAULT_RELAY_PORT: u16 = 20008;

/// Upper bound of a single handshake response read.
pub const HANDSHAKE_READ_LEN: usize = 1024;
