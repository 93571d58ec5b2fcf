//! Local relay: pairs one sender with one receiver per session id and
//! forwards frames between them through an [`Impairment`].
//!
//! Each direction uses the profile announced by the peer that receives the
//! frames, so a peer asks for the damage it wants to suffer.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;

use crate::constants::HANDSHAKE_READ_LEN;
use crate::session::{PeerRole, SessionParams};
use crate::transmission::{Fate, FrameReader, Impairment};

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

struct Joined {
    params: SessionParams,
    stream: TcpStream,
}

/// First peer of a session, parked until the other role shows up.
struct PendingPeer {
    role: PeerRole,
    token: u64,
    handoff: oneshot::Sender<Joined>,
}

type PendingTable = DashMap<String, PendingPeer>;

enum Admission {
    Wait(oneshot::Receiver<Joined>, u64),
    Pair(oneshot::Sender<Joined>),
    Duplicate,
}

pub struct Relay {
    listener: TcpListener,
    pending: Arc<PendingTable>,
    seed: Option<u64>,
}

impl Relay {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            pending: Arc::new(DashMap::new()),
            seed: None,
        })
    }

    /// Makes every session's fault sequence reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        info!("Relay listening on {}", self.local_addr()?);
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("Accept failed: {err}");
                    continue;
                }
            };
            debug!("Connection from {addr}");

            let pending = self.pending.clone();
            let seed = self.seed;
            tokio::spawn(async move {
                if let Err(err) = admit(stream, pending, seed).await {
                    debug!("Peer {addr} dropped: {err}");
                }
            });
        }
    }
}

async fn admit(
    mut stream: TcpStream,
    pending: Arc<PendingTable>,
    seed: Option<u64>,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let mut buffer = vec![0u8; HANDSHAKE_READ_LEN];
    let length = stream.read(&mut buffer).await?;
    let hello = String::from_utf8_lossy(&buffer[..length]);

    let params = match SessionParams::from_hello(&hello) {
        Ok(params) => params.sanitized(),
        Err(err) => {
            warn!("Bad HELLO {:?}: {err}", hello.trim());
            stream.write_all(format!("ERROR {err}\n").as_bytes()).await?;
            return Ok(());
        }
    };
    info!("Peer {} joins session {}", params.role, params.session_id);

    enter(Joined { params, stream }, &pending, seed).await
}

fn claim(pending: &PendingTable, params: &SessionParams) -> Admission {
    match pending.entry(params.session_id.clone()) {
        Entry::Occupied(entry) if entry.get().role == params.role => Admission::Duplicate,
        Entry::Occupied(entry) => Admission::Pair(entry.remove().handoff),
        Entry::Vacant(entry) => {
            let (handoff, waiting) = oneshot::channel();
            let token = TOKEN_COUNTER.fetch_add(1, Relaxed);
            entry.insert(PendingPeer {
                role: params.role,
                token,
                handoff,
            });
            Admission::Wait(waiting, token)
        }
    }
}

async fn enter(mut joiner: Joined, pending: &PendingTable, seed: Option<u64>) -> io::Result<()> {
    loop {
        match claim(pending, &joiner.params) {
            Admission::Duplicate => {
                warn!(
                    "Session {} already has a peer with role {}",
                    joiner.params.session_id, joiner.params.role
                );
                joiner
                    .stream
                    .write_all(b"ERROR duplicate role for session\n")
                    .await?;
                return Ok(());
            }
            Admission::Pair(handoff) => match handoff.send(joiner) {
                Ok(()) => return Ok(()),
                // The waiter left between claim and handoff; take its place.
                Err(back) => joiner = back,
            },
            Admission::Wait(mut waiting, token) => {
                let session_id = joiner.params.session_id.clone();
                let mut probe = [0u8; 64];
                let written = joiner.stream.write_all(b"WAITING\n").await;
                let other = match written {
                    Ok(()) => tokio::select! {
                        other = &mut waiting => other.ok(),
                        _ = joiner.stream.read(&mut probe) => None,
                    },
                    Err(_) => None,
                };

                if let Some(other) = other {
                    return pair(joiner, other, seed).await;
                }

                debug!("Waiting peer of session {session_id} left");
                pending.remove_if(&session_id, |_, peer| peer.token == token);
                waiting.close();
                match waiting.try_recv() {
                    Ok(other) => joiner = other,
                    Err(_) => return written,
                }
            }
        }
    }
}

fn impairment_for(receiver: &SessionParams, seed: Option<u64>, direction: u64) -> Impairment {
    let profile = receiver.impairment_profile();
    match seed {
        Some(seed) => Impairment::seeded(profile, seed.wrapping_mul(2).wrapping_add(direction)),
        None => Impairment::new(profile),
    }
}

async fn pair(mut first: Joined, mut second: Joined, seed: Option<u64>) -> io::Result<()> {
    first.stream.write_all(b"OK\n").await?;
    second.stream.write_all(b"OK\n").await?;
    info!(
        "Session {} paired ({} and {})",
        first.params.session_id, first.params.role, second.params.role
    );

    let towards_second = impairment_for(&second.params, seed, 0);
    let towards_first = impairment_for(&first.params, seed, 1);
    let (first_read, first_write) = first.stream.into_split();
    let (second_read, second_write) = second.stream.into_split();

    let (there, back) = tokio::join!(
        forward(first_read, second_write, towards_second),
        forward(second_read, first_write, towards_first),
    );
    info!(
        "Session {} closed, forwarded {} / {} frames",
        first.params.session_id,
        there.unwrap_or_default(),
        back.unwrap_or_default()
    );
    Ok(())
}

/// Moves frames one way until the source closes, then closes the target.
async fn forward(
    reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut impairment: Impairment,
) -> io::Result<u64> {
    let mut frames = FrameReader::new(reader);
    let mut forwarded = 0;
    while let Some(frame) = frames.next_frame().await? {
        match impairment.apply(frame) {
            Fate::Drop => trace!("Dropped a frame"),
            Fate::Deliver { frame, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                writer.write_all(&frame).await?;
                forwarded += 1;
            }
        }
    }
    writer.shutdown().await?;
    Ok(forwarded)
}
