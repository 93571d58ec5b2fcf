//! Session bootstrap with the relay.
//!
//! A peer opens a TCP connection, sends one `HELLO` line and then reads
//! responses until the relay says `OK` (paired, channel ready) or fails the
//! session. The same connection then carries frames.

pub mod handshake;

use std::str::FromStr;
use std::time::Duration;

use log::warn;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::constants::MAX_DELAY_SECS;
use crate::transmission::ImpairmentProfile;

pub use handshake::{HandshakeState, Response, open_channel};

#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, derive_more::Display,
)]
pub enum PeerRole {
    #[display("S")]
    Sender = b'S',
    #[display("R")]
    Receiver = b'R',
}

impl FromStr for PeerRole {
    type Err = HelloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [byte] => PeerRole::try_from(*byte).map_err(|_| HelloError::InvalidRole(s.to_string())),
            _ => Err(HelloError::InvalidRole(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HelloError {
    #[error("message does not start with HELLO")]
    NotHello,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unexpected trailing field {0:?}")]
    TrailingField(String),
    #[error("invalid role {0:?}, expected S or R")]
    InvalidRole(String),
    #[error("invalid value {value:?} for `{field}`")]
    InvalidNumber { field: &'static str, value: String },
    #[error("session id must be non-empty and free of whitespace")]
    InvalidSessionId,
}

/// Everything a peer announces in its `HELLO`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub role: PeerRole,
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub max_delay: u32,
    pub session_id: String,
}

fn valid_rate(rate: f64) -> bool {
    (0.0..=1.0).contains(&rate)
}

impl SessionParams {
    pub fn new(role: PeerRole, session_id: impl Into<String>) -> Self {
        Self {
            role,
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            max_delay: 0,
            session_id: session_id.into(),
        }
    }

    /// Out-of-range rates and delays fall back to 0.
    pub fn sanitized(mut self) -> Self {
        if !valid_rate(self.loss_rate) {
            warn!("Loss rate {} is outside [0, 1], using 0", self.loss_rate);
            self.loss_rate = 0.0;
        }
        if !valid_rate(self.corrupt_rate) {
            warn!("Corrupt rate {} is outside [0, 1], using 0", self.corrupt_rate);
            self.corrupt_rate = 0.0;
        }
        if self.max_delay > MAX_DELAY_SECS {
            warn!(
                "Max delay {}s is outside [0, {MAX_DELAY_SECS}], using 0",
                self.max_delay
            );
            self.max_delay = 0;
        }
        self
    }

    pub fn validate_session_id(&self) -> Result<(), HelloError> {
        if self.session_id.is_empty() || self.session_id.chars().any(char::is_whitespace) {
            return Err(HelloError::InvalidSessionId);
        }
        Ok(())
    }

    /// The impairment the relay applies to frames delivered to this peer.
    pub fn impairment_profile(&self) -> ImpairmentProfile {
        ImpairmentProfile {
            loss_rate: self.loss_rate,
            corrupt_rate: self.corrupt_rate,
            max_delay: Duration::from_secs(self.max_delay as u64),
        }
    }

    /// `HELLO <role> <loss> <corrupt> <delay> <id>`, without a line terminator.
    pub fn hello_line(&self) -> String {
        format!(
            "HELLO {} {} {} {} {}",
            self.role, self.loss_rate, self.corrupt_rate, self.max_delay, self.session_id
        )
    }

    pub fn from_hello(line: &str) -> Result<Self, HelloError> {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("HELLO") {
            return Err(HelloError::NotHello);
        }
        let mut field = |name: &'static str| fields.next().ok_or(HelloError::MissingField(name));

        let role = field("role")?.parse()?;
        let loss_rate = parse_number(field("loss_rate")?, "loss_rate")?;
        let corrupt_rate = parse_number(field("corrupt_rate")?, "corrupt_rate")?;
        let max_delay = parse_number(field("max_delay")?, "max_delay")?;
        let session_id = field("session_id")?.to_string();
        if let Some(extra) = fields.next() {
            return Err(HelloError::TrailingField(extra.to_string()));
        }

        let params = Self {
            role,
            loss_rate,
            corrupt_rate,
            max_delay,
            session_id,
        };
        params.validate_session_id()?;
        Ok(params)
    }
}

fn parse_number<T: FromStr>(value: &str, field: &'static str) -> Result<T, HelloError> {
    value.parse().map_err(|_| HelloError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
