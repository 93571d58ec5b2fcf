use crc::{CRC_16_IBM_SDLC, Crc};
use serde::{Deserialize, Serialize};

use crate::constants::CHECKSUM_LEN;

/// Fixed-width checksum over a frame body or a whole payload.
///
/// The output is always `CHECKSUM_LEN` ASCII decimal digits. Both peers of a
/// session must use the same implementation.
pub trait Digest: Send + Sync {
    fn digest(&self, content: &[u8]) -> [u8; CHECKSUM_LEN];

    /// Checks a complete message whose last `CHECKSUM_LEN` bytes carry the
    /// digest of everything before them.
    fn verify(&self, message: &[u8]) -> bool {
        if message.len() < CHECKSUM_LEN {
            return false;
        }
        let (body, checksum) = message.split_at(message.len() - CHECKSUM_LEN);
        self.digest(body).as_slice() == checksum
    }
}

fn decimal_field(value: u64) -> [u8; CHECKSUM_LEN] {
    let mut field = [b'0'; CHECKSUM_LEN];
    let mut value = value % 10u64.pow(CHECKSUM_LEN as u32);
    for digit in field.iter_mut().rev() {
        *digit = b'0' + (value % 10) as u8;
        value /= 10;
    }
    field
}

/// Sum of all bytes, zero-padded to five decimal digits.
///
/// This is the digest the public relay's reference peers use, so it is the
/// default everywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteSum;

impl Digest for ByteSum {
    fn digest(&self, content: &[u8]) -> [u8; CHECKSUM_LEN] {
        decimal_field(content.iter().map(|&byte| byte as u64).sum())
    }
}

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// CRC-16/IBM-SDLC rendered as five decimal digits.
///
/// Catches transpositions and multi-byte damage that a plain sum misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc16;

impl Digest for Crc16 {
    fn digest(&self, content: &[u8]) -> [u8; CHECKSUM_LEN] {
        decimal_field(CRC16.checksum(content) as u64)
    }
}

/// Digest choice as it appears in configuration files and on the command line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DigestKind {
    #[default]
    ByteSum,
    Crc16,
}

impl Digest for DigestKind {
    fn digest(&self, content: &[u8]) -> [u8; CHECKSUM_LEN] {
        match self {
            DigestKind::ByteSum => ByteSum.digest(content),
            DigestKind::Crc16 => Crc16.digest(content),
        }
    }
}

pub fn checksum_string<D: Digest + ?Sized>(digest: &D, content: &[u8]) -> String {
    digest.digest(content).iter().map(|&byte| byte as char).collect()
}
