use bytes::{Bytes, BytesMut};
use log::{debug, trace};

use crate::protocol::{Digest, SeqBit, decode, encode_ack};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub incomplete: u64,
}

/// What to do with one incoming read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Not a whole frame. Nothing is acknowledged.
    Incomplete,
    /// New segment appended; send the ack.
    Accepted(Bytes),
    /// Corrupt or duplicate; re-send the ack of the last accepted bit.
    Rejected(Bytes),
}

impl FrameVerdict {
    pub fn ack(&self) -> Option<&Bytes> {
        match self {
            FrameVerdict::Incomplete => None,
            FrameVerdict::Accepted(ack) | FrameVerdict::Rejected(ack) => Some(ack),
        }
    }
}

pub struct ReceiverMachine<'a, D: Digest + ?Sized> {
    digest: &'a D,
    expected: SeqBit,
    last_accepted: SeqBit,
    buffer: BytesMut,
    expected_len: Option<usize>,
    stats: ReceiverStats,
}

impl<'a, D: Digest + ?Sized> ReceiverMachine<'a, D> {
    /// With `expected_len` set, padding past the end of the payload is cut
    /// off instead of appended.
    pub fn new(digest: &'a D, expected_len: Option<usize>) -> Self {
        Self {
            digest,
            expected: SeqBit::Zero,
            last_accepted: SeqBit::One,
            buffer: BytesMut::new(),
            expected_len,
            stats: ReceiverStats::default(),
        }
    }

    pub fn expected_bit(&self) -> SeqBit {
        self.expected
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn is_complete(&self) -> bool {
        self.expected_len
            .is_some_and(|expected_len| self.buffer.len() >= expected_len)
    }

    pub fn on_frame(&mut self, raw: &[u8]) -> FrameVerdict {
        self.stats.received += 1;

        let frame = match decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                trace!("Discarding read: {err}");
                self.stats.incomplete += 1;
                return FrameVerdict::Incomplete;
            }
        };

        let intact = frame.checksum_matches(self.digest);
        if intact && frame.seq_bit() == Some(self.expected) && !self.is_complete() {
            let payload = frame.payload();
            let take = match self.expected_len {
                Some(expected_len) => payload.len().min(expected_len - self.buffer.len()),
                None => payload.len(),
            };
            self.buffer.extend_from_slice(&payload[..take]);
            self.last_accepted = self.expected;
            self.expected.toggle();
            self.stats.accepted += 1;
            debug!(
                "Accepted segment {}, {} bytes buffered",
                self.last_accepted,
                self.buffer.len()
            );
            return FrameVerdict::Accepted(encode_ack(self.last_accepted, self.digest));
        }

        if intact {
            trace!("Duplicate segment {frame:?}, re-acking {}", self.last_accepted);
        } else {
            trace!("Corrupt segment {frame:?}, re-acking {}", self.last_accepted);
        }
        self.stats.rejected += 1;
        FrameVerdict::Rejected(encode_ack(self.last_accepted, self.digest))
    }

    pub fn finish(self) -> (Bytes, ReceiverStats) {
        (self.buffer.freeze(), self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ByteSum, encode_data};

    fn data(bit: SeqBit, payload: &[u8]) -> Bytes {
        encode_data(bit, payload, &ByteSum).unwrap()
    }

    #[test]
    fn accepts_expected_segment() {
        let mut machine = ReceiverMachine::new(&ByteSum, None);
        let verdict = machine.on_frame(&data(SeqBit::Zero, &[b'A'; 20]));

        assert_eq!(
            verdict,
            FrameVerdict::Accepted(encode_ack(SeqBit::Zero, &ByteSum))
        );
        assert_eq!(machine.buffer(), &[b'A'; 20]);
        assert_eq!(machine.expected_bit(), SeqBit::One);
    }

    #[test]
    fn duplicate_is_not_appended_twice() {
        let mut machine = ReceiverMachine::new(&ByteSum, None);
        let frame = data(SeqBit::Zero, b"once");

        machine.on_frame(&frame);
        let verdict = machine.on_frame(&frame);

        assert_eq!(
            verdict,
            FrameVerdict::Rejected(encode_ack(SeqBit::Zero, &ByteSum))
        );
        assert_eq!(machine.buffer().len(), 20);
        assert!(machine.buffer().starts_with(b"once"));
        assert_eq!(machine.expected_bit(), SeqBit::One);
    }

    #[test]
    fn corrupt_frame_reacks_last_accepted() {
        let mut machine = ReceiverMachine::new(&ByteSum, None);
        let mut frame = data(SeqBit::Zero, b"damaged").to_vec();
        frame[6] = b'X';

        // Nothing accepted yet: the re-ack carries the complement of Zero.
        assert_eq!(
            machine.on_frame(&frame),
            FrameVerdict::Rejected(encode_ack(SeqBit::One, &ByteSum))
        );
        assert!(machine.buffer().is_empty());
        assert_eq!(machine.expected_bit(), SeqBit::Zero);
    }

    #[test]
    fn wrong_length_is_never_acked() {
        let mut machine = ReceiverMachine::new(&ByteSum, None);
        let frame = data(SeqBit::Zero, b"x");
        let long = [&frame[..], &b" "[..]].concat();

        for raw in [&frame[..29], &long[..], &b""[..]] {
            assert_eq!(machine.on_frame(raw), FrameVerdict::Incomplete);
            assert_eq!(machine.on_frame(raw).ack(), None);
        }
        assert!(machine.buffer().is_empty());
        assert_eq!(machine.stats().incomplete, 6);
    }

    #[test]
    fn expected_len_trims_padding() {
        let mut machine = ReceiverMachine::new(&ByteSum, Some(25));
        machine.on_frame(&data(SeqBit::Zero, b"twenty bytes exactly"));
        assert!(!machine.is_complete());
        machine.on_frame(&data(SeqBit::One, b"tail!"));
        assert!(machine.is_complete());

        // Past the bound everything is a duplicate.
        let verdict = machine.on_frame(&data(SeqBit::Zero, b"extra"));
        assert_eq!(
            verdict,
            FrameVerdict::Rejected(encode_ack(SeqBit::One, &ByteSum))
        );

        let (buffer, stats) = machine.finish();
        assert_eq!(&buffer[..], b"twenty bytes exactlytail!");
        assert_eq!((stats.accepted, stats.rejected), (2, 1));
    }
}
