//! Random byte sources for salts and nonces.
//!
//! Production code reads from [`SystemRandom`], which is backed by the
//! operating system CSPRNG. Tests that need reproducible envelopes swap in
//! [`SeededRandom`].

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A capability that fills buffers with random bytes.
pub trait SecureRandomSource {
    /// Fill `buf` completely with fresh random bytes.
    fn fill(&mut self, buf: &mut [u8]);

    /// Convenience wrapper returning a freshly filled array.
    fn array<const N: usize>(&mut self) -> [u8; N]
    where
        Self: Sized,
    {
        let mut out = [0u8; N];
        self.fill(&mut out);
        out
    }
}

impl<S: SecureRandomSource + ?Sized> SecureRandomSource for &mut S {
    fn fill(&mut self, buf: &mut [u8]) {
        (**self).fill(buf);
    }
}

/// The platform CSPRNG (`rand`'s thread-local generator, seeded from the OS).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl SecureRandomSource for SystemRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

/// Deterministic source for tests.
///
/// Never use this outside of tests: two sources built from the same seed
/// return the same salts and nonces.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SecureRandomSource for SeededRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }
}
