use std::fmt;

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::digest::Digest;
use crate::constants::{BODY_LEN, CHECKSUM_LEN, FILLER, FRAME_LEN, PAYLOAD_LEN, RESERVED_FLAG};
use crate::error::FrameError;

/// The one-bit sequence number, carried on the wire as ASCII `'0'`/`'1'`.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, derive_more::Display,
)]
pub enum SeqBit {
    #[display("0")]
    Zero = b'0',
    #[display("1")]
    One = b'1',
}

impl SeqBit {
    pub fn toggled(self) -> Self {
        match self {
            SeqBit::Zero => SeqBit::One,
            SeqBit::One => SeqBit::Zero,
        }
    }

    pub fn toggle(&mut self) {
        *self = self.toggled();
    }
}

/// Positional view of one frame.
///
/// | bytes | data frame        | ack frame     |
/// |-------|-------------------|---------------|
/// | 0     | sequence bit      | filler        |
/// | 1     | filler            | filler        |
/// | 2     | reserved `'0'`    | acked bit     |
/// | 3     | filler            | filler        |
/// | 4..24 | padded payload    | filler        |
/// | 24    | filler            | filler        |
/// | 25..  | checksum          | checksum      |
#[repr(C)]
#[derive(IntoBytes, FromBytes, Unaligned, Immutable, KnownLayout, Clone)]
pub struct RawFrame {
    lead: u8,
    gap_0: u8,
    mark: u8,
    gap_1: u8,
    payload: [u8; PAYLOAD_LEN],
    gap_2: u8,
    checksum: [u8; CHECKSUM_LEN],
}

const _: () = assert!(std::mem::size_of::<RawFrame>() == FRAME_LEN);

impl RawFrame {
    fn blank() -> Self {
        Self {
            lead: FILLER,
            gap_0: FILLER,
            mark: FILLER,
            gap_1: FILLER,
            payload: [FILLER; PAYLOAD_LEN],
            gap_2: FILLER,
            checksum: [FILLER; CHECKSUM_LEN],
        }
    }

    fn seal<D: Digest + ?Sized>(mut self, digest: &D) -> Bytes {
        self.checksum = digest.digest(self.body());
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Everything the checksum covers.
    pub fn body(&self) -> &[u8] {
        &self.as_bytes()[..BODY_LEN]
    }

    /// Sequence bit of a data frame; `None` when byte 0 is not a bit.
    pub fn seq_bit(&self) -> Option<SeqBit> {
        SeqBit::try_from(self.lead).ok()
    }

    /// Acknowledged bit of an ack frame; `None` when byte 2 is not a bit.
    pub fn ack_bit(&self) -> Option<SeqBit> {
        SeqBit::try_from(self.mark).ok()
    }

    /// The payload field, padding included.
    pub fn payload(&self) -> &[u8; PAYLOAD_LEN] {
        &self.payload
    }

    /// `true` means "not detectably corrupted". The digest is not
    /// cryptographic, so damage can slip through.
    pub fn checksum_matches<D: Digest + ?Sized>(&self, digest: &D) -> bool {
        digest.digest(self.body()) == self.checksum
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

pub fn encode_data<D: Digest + ?Sized>(
    seq_bit: SeqBit,
    payload: &[u8],
    digest: &D,
) -> Result<Bytes, FrameError> {
    if payload.len() > PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLong { len: payload.len() });
    }
    let mut frame = RawFrame::blank();
    frame.lead = seq_bit.into();
    frame.mark = RESERVED_FLAG;
    frame.payload[..payload.len()].copy_from_slice(payload);
    Ok(frame.seal(digest))
}

pub fn encode_ack<D: Digest + ?Sized>(ack_bit: SeqBit, digest: &D) -> Bytes {
    let mut frame = RawFrame::blank();
    frame.mark = ack_bit.into();
    frame.seal(digest)
}

pub fn decode(raw: &[u8]) -> Result<&RawFrame, FrameError> {
    RawFrame::ref_from_bytes(raw).map_err(|_| FrameError::Malformed { len: raw.len() })
}
