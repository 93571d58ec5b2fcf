pub mod lossy;
pub mod mock;
pub mod stream;

use bytes::Bytes;

/// An ordered, unreliable-content byte channel between two peers.
///
/// `recv` yields one read at a time. Stream-backed channels reassemble reads
/// into whole frames; a short read only surfaces when the peer closes
/// mid-frame. `recv` must be cancel safe: the sender races it against its
/// retransmission deadline.
#[async_trait::async_trait]
pub trait Channel: Send {
    async fn send(&mut self, frame: &[u8]) -> std::io::Result<()>;

    /// `Ok(None)` once the peer has closed its side.
    async fn recv(&mut self) -> std::io::Result<Option<Bytes>>;

    async fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub use lossy::{Fate, Impairment, ImpairmentProfile, LossyChannel};
pub use mock::MockChannel;
pub use stream::{FrameReader, StreamChannel, TcpChannel};
