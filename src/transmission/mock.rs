use super::Channel;
use async_trait::async_trait;
use bytes::Bytes;
use flume::{Receiver, Sender};

/// In-memory channel; every `send` arrives as exactly one `recv`.
pub struct MockChannel {
    sender: Option<Sender<Bytes>>,
    receiver: Receiver<Bytes>,
}

impl MockChannel {
    pub fn pair() -> (Self, Self) {
        // Duplex：A -> B, B -> A
        let (tx1, rx1) = flume::unbounded::<Bytes>();
        let (tx2, rx2) = flume::unbounded::<Bytes>();

        let channel1 = MockChannel {
            sender: Some(tx1),
            receiver: rx2,
        };
        let channel2 = MockChannel {
            sender: Some(tx2),
            receiver: rx1,
        };

        (channel1, channel2)
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "channel closed locally")
        })?;
        sender
            .send_async(Bytes::copy_from_slice(frame))
            .await
            .map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    format!("channel closed: {e}"),
                )
            })
    }

    async fn recv(&mut self) -> std::io::Result<Option<Bytes>> {
        // Queued frames drain before the disconnect shows up.
        Ok(self.receiver.recv_async().await.ok())
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.sender.take();
        Ok(())
    }
}
