//! Peer configuration: an optional TOML file, then command-line overrides.
//!
//! ```toml
//! [session]
//! relay = "127.0.0.1:20008"
//! session_id = "4242"
//! loss_rate = 0.1
//! corrupt_rate = 0.1
//! max_delay = 2
//!
//! [engine]
//! transmission_timeout = 3.0
//! digest = "byte-sum"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_LINGER, DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_RELAY_PORT,
    DEFAULT_TRANSMISSION_TIMEOUT,
};
use crate::engine::EngineConfig;
use crate::protocol::DigestKind;
use crate::session::{PeerRole, SessionParams};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no session id given, set `session.session_id` or pass --session-id")]
    MissingSessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub relay: String,
    pub session_id: Option<String>,
    /// Impairment the relay applies to frames delivered to this peer.
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub max_delay: u32,
    /// Seconds.
    pub connect_timeout: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay: format!("127.0.0.1:{DEFAULT_RELAY_PORT}"),
            session_id: None,
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            max_delay: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT.as_secs_f64(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Seconds.
    pub transmission_timeout: f64,
    pub expected_len: Option<usize>,
    /// Seconds.
    pub idle_timeout: Option<f64>,
    /// Seconds.
    pub linger: f64,
    pub max_payload_len: usize,
    pub digest: DigestKind,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transmission_timeout: DEFAULT_TRANSMISSION_TIMEOUT.as_secs_f64(),
            expected_len: None,
            idle_timeout: None,
            linger: DEFAULT_LINGER.as_secs_f64(),
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            digest: DigestKind::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub session: SessionConfig,
    pub engine: EngineSettings,
}

/// Command-line flags that take precedence over the file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Relay address, host:port.
    #[arg(long, value_name = "ADDR")]
    pub relay: Option<String>,

    #[arg(short, long, value_name = "ID")]
    pub session_id: Option<String>,

    /// Probability that the relay drops a frame sent to this peer.
    #[arg(long, value_name = "RATE")]
    pub loss_rate: Option<f64>,

    /// Probability that the relay damages a frame sent to this peer.
    #[arg(long, value_name = "RATE")]
    pub corrupt_rate: Option<f64>,

    /// Upper bound of the relay's random delay, whole seconds.
    #[arg(long, value_name = "SECS")]
    pub max_delay: Option<u32>,

    /// Retransmission timeout in seconds.
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Payload length, if known in advance.
    #[arg(long, value_name = "BYTES")]
    pub expected_len: Option<usize>,

    /// Give up after this many seconds without traffic.
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<f64>,

    #[arg(long, value_enum)]
    pub digest: Option<DigestKind>,
}

/// `None` for anything that is not a positive, representable duration.
fn positive_duration(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|duration| !duration.is_zero())
}

fn seconds(value: f64, fallback: Duration, name: &str) -> Duration {
    positive_duration(value).unwrap_or_else(|| {
        warn!("{name} of {value}s is not a usable duration, using {fallback:?}");
        fallback
    })
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&toml_str)?)
    }

    /// File (or defaults when no path is given), then overrides.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        let Overrides {
            relay,
            session_id,
            loss_rate,
            corrupt_rate,
            max_delay,
            timeout,
            expected_len,
            idle_timeout,
            digest,
        } = overrides.clone();

        let session = &mut self.session;
        session.relay = relay.unwrap_or(std::mem::take(&mut session.relay));
        session.session_id = session_id.or(session.session_id.take());
        session.loss_rate = loss_rate.unwrap_or(session.loss_rate);
        session.corrupt_rate = corrupt_rate.unwrap_or(session.corrupt_rate);
        session.max_delay = max_delay.unwrap_or(session.max_delay);

        let engine = &mut self.engine;
        engine.transmission_timeout = timeout.unwrap_or(engine.transmission_timeout);
        engine.expected_len = expected_len.or(engine.expected_len);
        engine.idle_timeout = idle_timeout.or(engine.idle_timeout);
        engine.digest = digest.unwrap_or(engine.digest);
    }

    pub fn session_params(&self, role: PeerRole) -> Result<SessionParams, ConfigError> {
        let session_id = self
            .session
            .session_id
            .clone()
            .ok_or(ConfigError::MissingSessionId)?;
        Ok(SessionParams {
            role,
            loss_rate: self.session.loss_rate,
            corrupt_rate: self.session.corrupt_rate,
            max_delay: self.session.max_delay,
            session_id,
        }
        .sanitized())
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds(
            self.session.connect_timeout,
            DEFAULT_CONNECT_TIMEOUT,
            "Connect timeout",
        )
    }

    pub fn engine_config(&self) -> EngineConfig {
        let engine = &self.engine;
        EngineConfig {
            transmission_timeout: seconds(
                engine.transmission_timeout,
                DEFAULT_TRANSMISSION_TIMEOUT,
                "Transmission timeout",
            ),
            expected_len: engine.expected_len,
            idle_timeout: engine.idle_timeout.and_then(|idle| {
                let duration = positive_duration(idle);
                if duration.is_none() {
                    warn!("Idle timeout of {idle}s is not a usable duration, waiting for close");
                }
                duration
            }),
            linger: seconds(engine.linger, DEFAULT_LINGER, "Linger"),
        }
    }
}
