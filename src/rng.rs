//! Process-wide randomness service.
//!
//! Everything visible on the wire (UUIDs, passwords, SNI/path selection,
//! fragment timing jitter) draws from one cryptographically seeded PRNG so
//! tests can inject a fixed seed and replay a run deterministically.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Shared randomness source.
///
/// One instance per process, passed by `Arc` into every component that
/// draws randomness. The mutex is uncontended in practice: draws are short
/// and probe workers spend their time in network I/O.
pub struct RngService {
    inner: Mutex<StdRng>,
}

impl RngService {
    /// Seed from OS entropy. The normal construction path.
    pub fn from_entropy() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Seed from a fixed value. Test construction path: two services built
    /// with the same seed produce identical draw sequences.
    pub fn with_seed(seed: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Uniform integer in `[low, high)`.
    pub fn gen_range(&self, low: u64, high: u64) -> u64 {
        self.inner.lock().gen_range(low..high)
    }

    /// Uniform signed integer in `[low, high)`.
    pub fn gen_range_i64(&self, low: i64, high: i64) -> i64 {
        self.inner.lock().gen_range(low..high)
    }

    /// Uniform float in `[0, 1)`.
    pub fn gen_f64(&self) -> f64 {
        self.inner.lock().gen()
    }

    /// Pick one element of a non-empty slice.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> &'a T {
        let idx = self.inner.lock().gen_range(0..items.len());
        &items[idx]
    }

    /// Random bytes.
    pub fn fill_bytes(&self, buf: &mut [u8]) {
        self.inner.lock().fill(buf);
    }

    /// UUID v4 from this service's stream.
    pub fn uuid_v4(&self) -> String {
        let mut bytes = [0u8; 16];
        self.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string()
    }

    /// Random password: standard Base64 of random bytes, truncated to `len`.
    pub fn password(&self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        self.fill_bytes(&mut bytes);
        let mut encoded = BASE64.encode(&bytes);
        encoded.truncate(len);
        encoded
    }

    /// Reality short-id: 8 random bytes, lowercase hex.
    pub fn short_id(&self) -> String {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Reality public key stand-in: 43 Base64 characters, the length of an
    /// encoded X25519 key.
    pub fn public_key(&self) -> String {
        self.password(43)
    }
}
