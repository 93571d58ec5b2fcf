use bytes::Bytes;
use log::{debug, trace};

use super::TransferStats;
use crate::constants::PAYLOAD_LEN;
use crate::error::FrameError;
use crate::protocol::{Digest, SeqBit, decode, encode_data};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    /// Ready to put the next segment on the wire.
    Idle,
    AwaitingAck,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The outstanding segment is delivered.
    Accepted,
    /// Wrong length, failed checksum or a non-bit in the ack field.
    Corrupt,
    /// Intact ack for the other bit, typically a re-ack of the previous segment.
    Stale,
}

struct InFlight {
    frame: Bytes,
    len: usize,
}

/// Sender half of the alternating-bit protocol, without any I/O.
///
/// At most one segment is outstanding. The frame that goes on the wire is
/// kept so that a retransmission is byte-identical to the original.
pub struct SenderMachine<'a, D: Digest + ?Sized> {
    digest: &'a D,
    payload: Bytes,
    next_offset: usize,
    current: SeqBit,
    in_flight: Option<InFlight>,
    stats: TransferStats,
}

impl<'a, D: Digest + ?Sized> SenderMachine<'a, D> {
    pub fn new(payload: Bytes, digest: &'a D) -> Self {
        Self {
            digest,
            payload,
            next_offset: 0,
            current: SeqBit::Zero,
            in_flight: None,
            stats: TransferStats::default(),
        }
    }

    pub fn phase(&self) -> SenderPhase {
        if self.in_flight.is_some() {
            SenderPhase::AwaitingAck
        } else if self.next_offset >= self.payload.len() {
            SenderPhase::Done
        } else {
            SenderPhase::Idle
        }
    }

    pub fn current_bit(&self) -> SeqBit {
        self.current
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Bytes acknowledged so far.
    pub fn delivered(&self) -> usize {
        self.next_offset
    }

    pub fn total_segments(&self) -> usize {
        self.payload.len().div_ceil(PAYLOAD_LEN)
    }

    /// Encodes the next segment with the current bit. Returns `None` once the
    /// whole payload is acknowledged. While a segment is outstanding the
    /// in-flight frame is returned again without counting a new send.
    pub fn send_next_segment(&mut self) -> Result<Option<Bytes>, FrameError> {
        if let Some(in_flight) = &self.in_flight {
            return Ok(Some(in_flight.frame.clone()));
        }
        if self.next_offset >= self.payload.len() {
            return Ok(None);
        }

        let end = (self.next_offset + PAYLOAD_LEN).min(self.payload.len());
        let segment = &self.payload[self.next_offset..end];
        let frame = encode_data(self.current, segment, self.digest)?;
        debug!(
            "Sending segment at offset {} with bit {}",
            self.next_offset, self.current
        );

        self.in_flight = Some(InFlight {
            frame: frame.clone(),
            len: segment.len(),
        });
        self.stats.sent += 1;
        Ok(Some(frame))
    }

    /// The retransmission deadline passed. Returns the identical frame to send
    /// again, or `None` if nothing is outstanding.
    pub fn on_timeout(&mut self) -> Option<Bytes> {
        let in_flight = self.in_flight.as_ref()?;
        self.stats.timeouts += 1;
        self.stats.sent += 1;
        debug!(
            "Timeout waiting for ack {}, retransmitting (timeouts: {})",
            self.current, self.stats.timeouts
        );
        Some(in_flight.frame.clone())
    }

    pub fn on_frame(&mut self, raw: &[u8]) -> AckOutcome {
        self.stats.received += 1;

        let ack_bit = match decode(raw) {
            Ok(frame) if frame.checksum_matches(self.digest) => frame.ack_bit(),
            Ok(frame) => {
                trace!("Ack failed its checksum: {frame:?}");
                None
            }
            Err(err) => {
                trace!("Unusable ack: {err}");
                None
            }
        };

        let Some(ack_bit) = ack_bit else {
            self.stats.corrupted += 1;
            return AckOutcome::Corrupt;
        };

        let outstanding = self.in_flight.as_ref().map(|in_flight| in_flight.len);
        match outstanding {
            Some(len) if ack_bit == self.current => {
                self.next_offset += len;
                self.in_flight = None;
                self.current.toggle();
                debug!("Ack {ack_bit} accepted, {} bytes delivered", self.next_offset);
                AckOutcome::Accepted
            }
            _ => {
                self.stats.stale_acks += 1;
                trace!("Ignoring ack {ack_bit}, waiting for {}", self.current);
                AckOutcome::Stale
            }
        }
    }

    pub fn into_stats(self) -> TransferStats {
        self.stats
    }
}
