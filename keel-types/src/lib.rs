pub mod action;
pub mod protocol;
pub mod record;
pub mod state;

pub use action::ActionKind;
pub use alloy_primitives::U256;
pub use protocol::{CollateralProtocol, ProtocolError};
pub use record::ActionRecord;
pub use state::{PositionId, Principal, VaultId, VaultSpec};

/// 18-decimal fixed-point scale shared by USD values and ratios.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Largest power of ten a U256 holds. Oracle plus asset decimals of a vault
/// must not exceed it.
pub const MAX_SCALE_DECIMALS: u32 = 77;

/// `10^exp` as a U256, or `None` past [`MAX_SCALE_DECIMALS`].
pub fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}
