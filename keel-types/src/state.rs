use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque principal handle (owner, liquidator, recipient).
pub type Principal = [u8; 32];

/// Derive a stable principal from a small tag. Handy for fixed actor sets.
pub fn principal(tag: u64) -> Principal {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"keel-principal");
    hasher.update(&tag.to_be_bytes());
    *hasher.finalize().as_bytes()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "note#{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VaultId(pub u32);

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vault#{}", self.0)
    }
}

/// Static description of a collateral vault: its underlying asset precision and
/// the oracle that prices it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VaultSpec {
    pub asset_decimals: u8,
    pub oracle_decimals: u8,
    /// Initial oracle answer, scaled by `oracle_decimals`.
    pub initial_price: U256,
}

impl VaultSpec {
    /// A vault priced at `whole_usd` dollars. The price saturates when
    /// `oracle_decimals` is too large to scale by.
    pub fn priced(asset_decimals: u8, oracle_decimals: u8, whole_usd: u64) -> Self {
        let initial_price = crate::pow10(oracle_decimals as u32)
            .and_then(|scale| scale.checked_mul(U256::from(whole_usd)))
            .unwrap_or(U256::MAX);
        Self {
            asset_decimals,
            oracle_decimals,
            initial_price,
        }
    }

    /// Exponent of the divisor that turns `amount × price` into dollars.
    pub fn scale_decimals(&self) -> u32 {
        self.oracle_decimals as u32 + self.asset_decimals as u32
    }
}
