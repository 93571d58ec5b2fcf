//! Stop-and-wait ARQ over a [`Channel`].
//!
//! [`sending`] and [`receiving`] hold the protocol state machines; they never
//! touch I/O. [`ArqEngine`] drives one of them against a channel, owns the
//! timers and returns a report once the transfer ends.

pub mod receiving;
pub mod sending;

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::time::{Duration, Instant, timeout, timeout_at};

use crate::constants::{DEFAULT_LINGER, DEFAULT_TRANSMISSION_TIMEOUT};
use crate::error::{TransferError, is_disconnect};
use crate::protocol::{ByteSum, Digest, checksum_string};
use crate::transmission::Channel;

pub use receiving::{FrameVerdict, ReceiverMachine, ReceiverStats};
pub use sending::{AckOutcome, SenderMachine, SenderPhase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long the sender waits for the matching ack before resending.
    pub transmission_timeout: Duration,
    /// Payload length announced out of band. Lets the receiver cut the
    /// padding of the last segment and stop on its own.
    pub expected_len: Option<usize>,
    /// Receiver gives up after this much silence. `None` waits for close.
    pub idle_timeout: Option<Duration>,
    /// Once `expected_len` bytes are in, the receiver keeps re-acking
    /// retransmissions until this much silence passes.
    pub linger: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transmission_timeout: DEFAULT_TRANSMISSION_TIMEOUT,
            expected_len: None,
            idle_timeout: None,
            linger: DEFAULT_LINGER,
        }
    }
}

impl EngineConfig {
    pub fn sanitized(mut self) -> Self {
        if self.transmission_timeout.is_zero() {
            warn!(
                "Transmission timeout must be positive, using {:?}",
                DEFAULT_TRANSMISSION_TIMEOUT
            );
            self.transmission_timeout = DEFAULT_TRANSMISSION_TIMEOUT;
        }
        if self.idle_timeout.is_some_and(|idle| idle.is_zero()) {
            warn!("Idle timeout must be positive, waiting for close instead");
            self.idle_timeout = None;
        }
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Frames written, retransmissions included.
    pub sent: u64,
    /// Reads from the channel, damaged ones included.
    pub received: u64,
    /// Acks that were cut short, failed the checksum or carried no bit.
    pub corrupted: u64,
    pub timeouts: u64,
    /// Intact acks for the bit that is not outstanding.
    pub stale_acks: u64,
}

/// How a transfer ended. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Completion {
    #[display("finished")]
    Finished,
    #[display("channel closed")]
    ChannelClosed,
    #[display("timed out")]
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    /// Digest of the whole payload, comparable with the receiver's.
    pub checksum: String,
    pub stats: TransferStats,
    pub completion: Completion,
    /// Payload bytes acknowledged by the receiver.
    pub delivered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub checksum: String,
    pub data: Bytes,
    pub completion: Completion,
    pub stats: ReceiverStats,
}

#[derive(Debug, Clone)]
pub enum Role {
    Sender(Bytes),
    Receiver,
}

#[derive(derive_more::From, derive_more::TryInto, Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Sender(SenderReport),
    Receiver(ReceiverReport),
}

/// Writes one frame. `Ok(false)` means the peer is gone.
async fn transmit<C: Channel + ?Sized>(
    channel: &mut C,
    frame: &[u8],
) -> Result<bool, TransferError> {
    match channel.send(frame).await {
        Ok(()) => Ok(true),
        Err(err) if is_disconnect(&err) => {
            debug!("Peer went away while sending: {err}");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

async fn close<C: Channel + ?Sized>(channel: &mut C) {
    if let Err(err) = channel.close().await {
        debug!("Closing the channel failed: {err}");
    }
}

/// One peer of a transfer, either side.
pub struct ArqEngine<C: Channel, D: Digest = ByteSum> {
    channel: C,
    config: EngineConfig,
    digest: D,
}

impl<C: Channel> ArqEngine<C> {
    pub fn new(channel: C, config: EngineConfig) -> Self {
        Self::with_digest(channel, config, ByteSum)
    }
}

impl<C: Channel, D: Digest> ArqEngine<C, D> {
    pub fn with_digest(channel: C, config: EngineConfig, digest: D) -> Self {
        Self {
            channel,
            config: config.sanitized(),
            digest,
        }
    }

    pub async fn run(&mut self, role: Role) -> Result<Report, TransferError> {
        match role {
            Role::Sender(payload) => self.send(payload).await.map(Report::from),
            Role::Receiver => self.receive().await.map(Report::from),
        }
    }

    /// Delivers `payload` segment by segment and closes the channel.
    pub async fn send(&mut self, payload: Bytes) -> Result<SenderReport, TransferError> {
        let Self {
            channel,
            config,
            digest,
        } = self;
        let digest = &*digest;
        let checksum = checksum_string(digest, &payload);
        let len = payload.len();
        let mut machine = SenderMachine::new(payload, digest);
        info!(
            "Sending {len} bytes in {} segments, checksum {checksum}",
            machine.total_segments()
        );

        let completion = 'transfer: loop {
            let Some(frame) = machine.send_next_segment()? else {
                break Completion::Finished;
            };
            if !transmit(channel, &frame).await? {
                break Completion::ChannelClosed;
            }

            // Damaged and stale acks do not move the deadline.
            let mut deadline = Instant::now() + config.transmission_timeout;
            loop {
                match timeout_at(deadline, channel.recv()).await {
                    Err(_) => {
                        let Some(frame) = machine.on_timeout() else {
                            break;
                        };
                        if !transmit(channel, &frame).await? {
                            break 'transfer Completion::ChannelClosed;
                        }
                        deadline = Instant::now() + config.transmission_timeout;
                    }
                    Ok(Ok(Some(raw))) => {
                        if machine.on_frame(&raw) == AckOutcome::Accepted {
                            break;
                        }
                    }
                    Ok(Ok(None)) => break 'transfer Completion::ChannelClosed,
                    Ok(Err(err)) if is_disconnect(&err) => {
                        debug!("Peer went away while waiting for an ack: {err}");
                        break 'transfer Completion::ChannelClosed;
                    }
                    Ok(Err(err)) => return Err(err.into()),
                }
            }
        };

        let delivered = machine.delivered();
        let stats = machine.into_stats();
        info!("Sender {completion} after {delivered} bytes: {stats:?}");
        close(channel).await;

        Ok(SenderReport {
            checksum,
            stats,
            completion,
            delivered,
        })
    }

    /// Collects segments until the channel closes or a configured bound hits.
    pub async fn receive(&mut self) -> Result<ReceiverReport, TransferError> {
        let Self {
            channel,
            config,
            digest,
        } = self;
        let digest = &*digest;
        let mut machine = ReceiverMachine::new(digest, config.expected_len);

        let completion = loop {
            let bound = if machine.is_complete() {
                Some(config.linger)
            } else {
                config.idle_timeout
            };
            let read = match bound {
                Some(bound) => match timeout(bound, channel.recv()).await {
                    Ok(read) => read,
                    Err(_) if machine.is_complete() => break Completion::Finished,
                    Err(_) => {
                        warn!("No traffic for {bound:?}, giving up");
                        break Completion::TimedOut;
                    }
                },
                None => channel.recv().await,
            };

            let raw = match read {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    break if machine.is_complete() {
                        Completion::Finished
                    } else {
                        Completion::ChannelClosed
                    };
                }
                Err(err) if is_disconnect(&err) => {
                    debug!("Peer went away while receiving: {err}");
                    break Completion::ChannelClosed;
                }
                Err(err) => return Err(err.into()),
            };

            let verdict = machine.on_frame(&raw);
            if let Some(ack) = verdict.ack()
                && !transmit(channel, ack).await?
            {
                break Completion::ChannelClosed;
            }
        };

        let (data, stats) = machine.finish();
        let checksum = checksum_string(digest, &data);
        info!(
            "Receiver {completion} with {} bytes, checksum {checksum}: {stats:?}",
            data.len()
        );
        close(channel).await;

        Ok(ReceiverReport {
            checksum,
            data,
            completion,
            stats,
        })
    }
}
