use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use super::Channel;
use crate::constants::FRAME_LEN;

/// Cuts a byte stream back into `FRAME_LEN` units.
///
/// Partial reads accumulate until a whole frame is available. Whatever is
/// left when the stream ends is handed out once as a short frame.
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_buffered(reader, &[])
    }

    /// Starts with bytes that were already pulled off the stream, e.g. frames
    /// that trailed the handshake response.
    pub fn with_buffered(reader: R, buffered: &[u8]) -> Self {
        let mut buffer = BytesMut::with_capacity(FRAME_LEN * 4);
        buffer.extend_from_slice(buffered);
        Self {
            reader,
            buffer,
            eof: false,
        }
    }

    /// Cancel safe: bytes read before cancellation stay buffered.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Bytes>> {
        loop {
            if self.buffer.len() >= FRAME_LEN {
                return Ok(Some(self.buffer.split_to(FRAME_LEN).freeze()));
            }
            if self.eof {
                return Ok((!self.buffer.is_empty()).then(|| self.buffer.split().freeze()));
            }
            self.buffer.reserve(FRAME_LEN);
            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                self.eof = true;
            }
        }
    }
}

/// A [`Channel`] over any async byte stream.
pub struct StreamChannel<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

pub type TcpChannel = StreamChannel<TcpStream>;

impl<S: AsyncRead + AsyncWrite + Send> StreamChannel<S> {
    pub fn new(stream: S) -> Self {
        Self::with_buffered(stream, &[])
    }

    pub fn with_buffered(stream: S, buffered: &[u8]) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: FrameReader::with_buffered(reader, buffered),
            writer,
        }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send> Channel for StreamChannel<S> {
    async fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    async fn recv(&mut self) -> std::io::Result<Option<Bytes>> {
        self.reader.next_frame().await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn reassembles_split_and_coalesced_writes() -> std::io::Result<()> {
        let (mut near, far) = duplex(256);
        let mut channel = StreamChannel::new(far);

        let first = [b'a'; FRAME_LEN];
        let second = [b'b'; FRAME_LEN];
        near.write_all(&first[..7]).await?;
        near.write_all(&first[7..]).await?;
        let mut coalesced = second.to_vec();
        coalesced.extend_from_slice(b"tail");
        near.write_all(&coalesced).await?;
        near.shutdown().await?;

        assert_eq!(channel.recv().await?.as_deref(), Some(&first[..]));
        assert_eq!(channel.recv().await?.as_deref(), Some(&second[..]));
        assert_eq!(channel.recv().await?.as_deref(), Some(&b"tail"[..]));
        assert_eq!(channel.recv().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn buffered_bytes_come_first() -> std::io::Result<()> {
        let (mut near, far) = duplex(256);
        let early = [b'x'; FRAME_LEN];
        let mut channel = StreamChannel::with_buffered(far, &early[..10]);

        near.write_all(&early[10..]).await?;
        assert_eq!(channel.recv().await?.as_deref(), Some(&early[..]));

        channel.send(b"reply").await?;
        channel.close().await?;
        let mut echoed = Vec::new();
        near.read_to_end(&mut echoed).await?;
        assert_eq!(echoed, b"reply");
        Ok(())
    }
}
