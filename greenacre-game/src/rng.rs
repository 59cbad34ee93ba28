//! Injectable randomness for harvest rolls and event picks.
use hmac::{Hmac, Mac};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

/// Independent random streams so that, for example, an extra event pick
/// never shifts the sequence of harvest rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    Harvest,
    Events,
}

/// Source of uniform draws in `[0, 1)`.
pub trait RandomSource {
    fn next_unit(&mut self, stream: RngStream) -> f64;

    /// Restart every stream from `seed`. Scripted sources keep their script.
    fn reseed(&mut self, _seed: u64) {}
}

/// Deterministic per-stream generators derived from one user seed.
#[derive(Debug, Clone)]
pub struct RngBundle {
    harvest: CountingRng<ChaCha20Rng>,
    events: CountingRng<ChaCha20Rng>,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            harvest: CountingRng::new(derive_stream_seed(seed, b"harvest")),
            events: CountingRng::new(derive_stream_seed(seed, b"events")),
        }
    }

    /// Draws consumed per stream, `(harvest, events)`.
    #[must_use]
    pub const fn draws(&self) -> (u64, u64) {
        (self.harvest.draws(), self.events.draws())
    }
}

impl RandomSource for RngBundle {
    fn next_unit(&mut self, stream: RngStream) -> f64 {
        match stream {
            RngStream::Harvest => self.harvest.r#gen::<f64>(),
            RngStream::Events => self.events.r#gen::<f64>(),
        }
    }

    fn reseed(&mut self, seed: u64) {
        *self = Self::from_user_seed(seed);
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<ChaCha20Rng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: rand::RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

/// Seed that follows `seed` after a save stamped at `stamp_ms`.
///
/// Saves carry the chained seed, so a reloaded game draws from streams it
/// has never used instead of replaying the rolls since the last boot.
#[must_use]
pub fn next_seed(seed: u64, stamp_ms: u64) -> u64 {
    let mut tag = b"rotate".to_vec();
    tag.extend_from_slice(&stamp_ms.to_le_bytes());
    derive_stream_seed(seed, &tag)
}

fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()).expect("64-bit seed is valid key");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Scripted sources for deterministic tests and replays.
pub mod scripted {
    use std::collections::VecDeque;

    use super::{RandomSource, RngStream};

    /// Returns the same draw forever.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedSource(pub f64);

    impl FixedSource {
        /// Every chance check passes.
        #[must_use]
        pub const fn always_succeed() -> Self {
            Self(0.0)
        }

        /// Every chance check below certainty fails.
        #[must_use]
        pub const fn always_fail() -> Self {
            Self(1.0 - f64::EPSILON)
        }
    }

    impl RandomSource for FixedSource {
        fn next_unit(&mut self, _stream: RngStream) -> f64 {
            self.0
        }
    }

    /// Replays queued draws, then falls back to a fixed value.
    #[derive(Debug, Clone, Default)]
    pub struct SequenceSource {
        queue: VecDeque<f64>,
        fallback: f64,
        consumed: usize,
    }

    impl SequenceSource {
        #[must_use]
        pub fn new(draws: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
            Self {
                queue: draws.into_iter().collect(),
                fallback,
                consumed: 0,
            }
        }

        #[must_use]
        pub const fn consumed(&self) -> usize {
            self.consumed
        }
    }

    impl RandomSource for SequenceSource {
        fn next_unit(&mut self, _stream: RngStream) -> f64 {
            self.consumed += 1;
            self.queue.pop_front().unwrap_or(self.fallback)
        }
    }
}
