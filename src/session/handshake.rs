use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::SessionParams;
use crate::constants::HANDSHAKE_READ_LEN;
use crate::error::ConnectionError;
use crate::transmission::TcpChannel;

/// One relay response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Waiting(String),
    Error(String),
    Unrecognized(String),
}

impl Response {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.starts_with("OK") {
            Response::Ok(line.to_string())
        } else if line.starts_with("WAITING") {
            Response::Waiting(line.to_string())
        } else if line.starts_with("ERROR") {
            Response::Error(line.to_string())
        } else {
            Response::Unrecognized(line.to_string())
        }
    }
}

#[derive(Debug)]
pub enum HandshakeState {
    Connecting,
    Waiting,
    Ready,
    Failed(ConnectionError),
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Ready | HandshakeState::Failed(_))
    }

    /// Terminal states absorb further responses.
    pub fn advance(self, response: Response) -> Self {
        if self.is_terminal() {
            return self;
        }
        match response {
            Response::Ok(_) => HandshakeState::Ready,
            Response::Waiting(_) => HandshakeState::Waiting,
            Response::Error(message) => HandshakeState::Failed(ConnectionError::Refused(message)),
            Response::Unrecognized(message) => {
                HandshakeState::Failed(ConnectionError::Unexpected(message))
            }
        }
    }
}

/// Splits one read into response lines. A trailing fragment without a line
/// terminator counts as a response of its own.
fn next_line(data: &[u8]) -> (&[u8], &[u8]) {
    match data.iter().position(|&byte| byte == b'\n') {
        Some(position) => (&data[..position], &data[position + 1..]),
        None => (data, &data[data.len()..]),
    }
}

/// Performs the `HELLO` exchange and returns the frame channel.
///
/// Retries nothing beyond the relay's own `WAITING` polling. The whole
/// exchange, including waiting for the peer, is bounded by `connect_timeout`.
pub async fn open_channel<A: ToSocketAddrs>(
    relay: A,
    params: &SessionParams,
    connect_timeout: Duration,
) -> Result<TcpChannel, ConnectionError> {
    params.validate_session_id()?;

    match tokio::time::timeout(connect_timeout, negotiate(relay, params)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "No peer for session {} within {:?}",
                params.session_id, connect_timeout
            );
            Err(ConnectionError::Timeout)
        }
    }
}

async fn negotiate<A: ToSocketAddrs>(
    relay: A,
    params: &SessionParams,
) -> Result<TcpChannel, ConnectionError> {
    let mut stream = TcpStream::connect(relay).await?;
    stream.set_nodelay(true)?;
    info!(
        "Connected to relay {}, announcing {}",
        stream.peer_addr()?,
        params.hello_line()
    );
    stream.write_all(params.hello_line().as_bytes()).await?;

    let mut state = HandshakeState::Connecting;
    let mut buffer = vec![0u8; HANDSHAKE_READ_LEN];
    loop {
        let length = stream.read(&mut buffer).await?;
        if length == 0 {
            return Err(ConnectionError::Closed);
        }

        let mut remaining = &buffer[..length];
        while !remaining.is_empty() {
            let (line, rest) = next_line(remaining);
            remaining = rest;
            let line = String::from_utf8_lossy(line);
            if line.trim().is_empty() {
                continue;
            }
            debug!("Relay said {:?}", line.trim());

            state = match state.advance(Response::parse(&line)) {
                HandshakeState::Ready => {
                    info!("Session {} established", params.session_id);
                    return Ok(TcpChannel::with_buffered(stream, remaining));
                }
                HandshakeState::Failed(err) => {
                    warn!("Session {} failed: {err}", params.session_id);
                    return Err(err);
                }
                waiting => {
                    info!("Waiting for the other peer of session {}", params.session_id);
                    waiting
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PeerRole;
    use crate::transmission::Channel;
    use tokio::net::TcpListener;

    #[test]
    fn response_classification() {
        assert_eq!(Response::parse("OK\n"), Response::Ok("OK".into()));
        assert_eq!(
            Response::parse("WAITING for peer"),
            Response::Waiting("WAITING for peer".into())
        );
        assert_eq!(
            Response::parse("ERROR bad id"),
            Response::Error("ERROR bad id".into())
        );
        assert_eq!(Response::parse("HUH"), Response::Unrecognized("HUH".into()));
    }

    #[test]
    fn waiting_repeats_until_ok() {
        let mut state = HandshakeState::Connecting;
        for _ in 0..3 {
            state = state.advance(Response::parse("WAITING"));
            assert!(matches!(state, HandshakeState::Waiting));
        }
        state = state.advance(Response::parse("OK"));
        assert!(matches!(state, HandshakeState::Ready));

        // Terminal states ignore anything that follows.
        state = state.advance(Response::parse("ERROR late"));
        assert!(matches!(state, HandshakeState::Ready));
    }

    #[test]
    fn error_and_garbage_fail() {
        let state = HandshakeState::Waiting.advance(Response::parse("ERROR full"));
        assert!(matches!(
            state,
            HandshakeState::Failed(ConnectionError::Refused(ref m)) if m == "ERROR full"
        ));

        let state = HandshakeState::Connecting.advance(Response::parse("???"));
        assert!(matches!(
            state,
            HandshakeState::Failed(ConnectionError::Unexpected(_))
        ));
    }

    async fn scripted_relay(replies: &'static [&'static [u8]]) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut hello = [0u8; 128];
            let length = stream.read(&mut hello).await.unwrap();
            assert!(hello[..length].starts_with(b"HELLO R 0 0 0 scripted"));
            for reply in replies {
                stream.write_all(reply).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            // Hold the connection open until the client is done.
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });
        addr
    }

    #[tokio::test]
    async fn open_channel_keeps_bytes_after_ok() {
        let addr = scripted_relay(&[b"WAITING\n", b"OK\n0 0 early"]).await;
        let params = SessionParams::new(PeerRole::Receiver, "scripted");

        let mut channel = open_channel(addr, &params, Duration::from_secs(5))
            .await
            .unwrap();
        channel.close().await.unwrap();
        assert_eq!(
            channel.recv().await.unwrap().as_deref(),
            Some(&b"0 0 early"[..])
        );
        assert_eq!(channel.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn open_channel_surfaces_refusal() {
        let addr = scripted_relay(&[b"WAITING\n", b"ERROR no such session"]).await;
        let params = SessionParams::new(PeerRole::Receiver, "scripted");

        let Err(err) = open_channel(addr, &params, Duration::from_secs(5)).await else {
            panic!("handshake should be refused");
        };
        assert!(matches!(err, ConnectionError::Refused(_)));
    }

    #[tokio::test]
    async fn open_channel_times_out_without_peer() {
        let addr = scripted_relay(&[b"WAITING\n"]).await;
        let params = SessionParams::new(PeerRole::Receiver, "scripted");

        let Err(err) = open_channel(addr, &params, Duration::from_millis(100)).await else {
            panic!("handshake should time out");
        };
        assert!(matches!(err, ConnectionError::Timeout));
    }
}
