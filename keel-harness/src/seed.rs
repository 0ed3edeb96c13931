//! Rolling seed: every random decision of the harness is one step of a
//! blake3 hash chain that starts at the root seed.
//!
//! The input encoding is pinned: a seed is hashed as its 32 big-endian bytes,
//! and the digest is read back big-endian.

use keel_types::U256;

pub fn next_seed(seed: U256) -> U256 {
    let digest = blake3::hash(&seed.to_be_bytes::<32>());
    U256::from_be_bytes(*digest.as_bytes())
}

/// Explicit owner of the rolling seed. There is no global counter; whoever
/// holds the stream threads it forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedStream {
    seed: U256,
    draws: u64,
}

impl SeedStream {
    pub fn new(root: U256) -> Self {
        Self {
            seed: root,
            draws: 0,
        }
    }

    pub fn current(&self) -> U256 {
        self.seed
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Advance once and return the fresh value.
    pub fn draw(&mut self) -> U256 {
        self.seed = next_seed(self.seed);
        self.draws += 1;
        self.seed
    }

    /// Fold an externally supplied word (fuzzer input) into the chain.
    pub fn absorb(&mut self, entropy: U256) {
        self.seed = next_seed(self.seed ^ entropy);
    }
}
