use std::io;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is {len} bytes long, expected exactly {expected}", expected = crate::constants::FRAME_LEN)]
    Malformed { len: usize },
    #[error("payload of {len} bytes does not fit in one frame")]
    PayloadTooLong { len: usize },
}

/// Failures while bootstrapping a session with the relay.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("relay refused the session: {0}")]
    Refused(String),
    #[error("unrecognized relay response: {0:?}")]
    Unexpected(String),
    #[error("relay closed the connection during the handshake")]
    Closed,
    #[error("invalid session parameters: {0}")]
    InvalidSession(#[from] crate::session::HelloError),
    #[error("no peer joined the session in time")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
}

/// Failures that abort a transfer. A closed channel is not one of them; it is
/// reported through [`crate::engine::Completion`].
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors that mean the peer went away rather than that something broke.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
