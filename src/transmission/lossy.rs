use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::Channel;

/// What the relay does to the messages it carries in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImpairmentProfile {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub max_delay: Duration,
}

#[derive(Debug, PartialEq)]
pub enum Fate {
    Drop,
    Deliver { frame: Bytes, delay: Duration },
}

pub struct Impairment {
    profile: ImpairmentProfile,
    rng: StdRng,
}

impl Impairment {
    pub fn new(profile: ImpairmentProfile) -> Self {
        Self {
            profile,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible fault sequence.
    pub fn seeded(profile: ImpairmentProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn apply(&mut self, frame: Bytes) -> Fate {
        if self.rng.random_bool(self.profile.loss_rate.clamp(0.0, 1.0)) {
            return Fate::Drop;
        }
        let frame = if self.rng.random_bool(self.profile.corrupt_rate.clamp(0.0, 1.0)) {
            self.corrupt(frame)
        } else {
            frame
        };
        let delay = if self.profile.max_delay.is_zero() {
            Duration::ZERO
        } else {
            self.profile.max_delay.mul_f64(self.rng.random::<f64>())
        };
        Fate::Deliver { frame, delay }
    }

    /// Replaces one byte with a different printable character.
    fn corrupt(&mut self, frame: Bytes) -> Bytes {
        if frame.is_empty() {
            return frame;
        }
        let mut damaged = BytesMut::from(&frame[..]);
        let position = self.rng.random_range(0..damaged.len());
        let original = damaged[position];
        damaged[position] = loop {
            let candidate = self.rng.random_range(b' '..=b'~');
            if candidate != original {
                break candidate;
            }
        };
        damaged.freeze()
    }
}

/// Applies an [`Impairment`] to everything sent through the inner channel.
///
/// Delays are served inline, so ordering is preserved and the caller's
/// `send` takes as long as the simulated delay.
pub struct LossyChannel<C> {
    inner: C,
    impairment: Impairment,
}

impl<C: Channel> LossyChannel<C> {
    pub fn new(inner: C, impairment: Impairment) -> Self {
        Self { inner, impairment }
    }
}

#[async_trait]
impl<C: Channel> Channel for LossyChannel<C> {
    async fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        match self.impairment.apply(Bytes::copy_from_slice(frame)) {
            Fate::Drop => {
                trace!("Lossy channel dropped {} bytes", frame.len());
                Ok(())
            }
            Fate::Deliver { frame, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.inner.send(&frame).await
            }
        }
    }

    async fn recv(&mut self) -> std::io::Result<Option<Bytes>> {
        self.inner.recv().await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmission::MockChannel;

    fn profile(loss_rate: f64, corrupt_rate: f64) -> ImpairmentProfile {
        ImpairmentProfile {
            loss_rate,
            corrupt_rate,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn transparent_profile_passes_everything() {
        let mut impairment = Impairment::seeded(ImpairmentProfile::default(), 7);
        for _ in 0..100 {
            let frame = Bytes::from_static(b"unchanged");
            assert_eq!(
                impairment.apply(frame.clone()),
                Fate::Deliver {
                    frame,
                    delay: Duration::ZERO
                }
            );
        }
    }

    #[test]
    fn full_loss_drops_everything() {
        let mut impairment = Impairment::seeded(profile(1.0, 0.0), 7);
        assert!((0..100).all(|_| impairment.apply(Bytes::from_static(b"gone")) == Fate::Drop));
    }

    #[test]
    fn corruption_changes_exactly_one_byte() {
        let mut impairment = Impairment::seeded(profile(0.0, 1.0), 11);
        let original = Bytes::from_static(b"0 0 payload payload payload 01234");
        for _ in 0..50 {
            let Fate::Deliver { frame, .. } = impairment.apply(original.clone()) else {
                panic!("nothing should be dropped");
            };
            let changed = frame.iter().zip(original.iter()).filter(|(a, b)| a != b).count();
            assert_eq!(frame.len(), original.len());
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn delay_stays_within_bound() {
        let mut impairment = Impairment::seeded(
            ImpairmentProfile {
                max_delay: Duration::from_millis(40),
                ..Default::default()
            },
            3,
        );
        for _ in 0..50 {
            let Fate::Deliver { delay, .. } = impairment.apply(Bytes::from_static(b"x")) else {
                panic!("nothing should be dropped");
            };
            assert!(delay <= Duration::from_millis(40));
        }
    }

    #[tokio::test]
    async fn delayed_frames_keep_their_order() -> std::io::Result<()> {
        let (left, mut right) = MockChannel::pair();
        let profile = ImpairmentProfile {
            max_delay: Duration::from_millis(20),
            ..Default::default()
        };
        let mut lossy = LossyChannel::new(left, Impairment::seeded(profile, 9));

        let frames: Vec<Bytes> = (0..5u8).map(|i| Bytes::from(vec![b'a' + i; 30])).collect();
        for frame in &frames {
            lossy.send(frame).await?;
        }
        lossy.close().await?;

        for frame in frames {
            assert_eq!(right.recv().await?, Some(frame));
        }
        assert_eq!(right.recv().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn lossy_channel_only_impairs_outgoing() -> std::io::Result<()> {
        let (left, mut right) = MockChannel::pair();
        let mut lossy = LossyChannel::new(left, Impairment::seeded(profile(1.0, 0.0), 5));

        lossy.send(b"dropped").await?;
        right.send(b"intact").await?;
        assert_eq!(lossy.recv().await?.as_deref(), Some(&b"intact"[..]));

        lossy.close().await?;
        assert_eq!(right.recv().await?, None);
        Ok(())
    }
}
