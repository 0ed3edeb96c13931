//! The surface the harness drives. Everything behind this trait (vault
//! accounting, the debt ledger, ownership, the oracle) belongs to the system
//! under test.

use crate::state::{PositionId, Principal, VaultId};
use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown position {0}")]
    UnknownPosition(PositionId),
    #[error("unknown vault {0}")]
    UnknownVault(VaultId),
    #[error("caller is not the owner of {position}")]
    NotOwner { position: PositionId },
    #[error("{vault} is not attached to {position}")]
    NotAttached { position: PositionId, vault: VaultId },
    /// Removing a vault that still holds collateral for the position. This is
    /// the one failure the harness treats as an expected domain outcome.
    #[error("{vault} still holds {amount} for {position}")]
    VaultNotEmpty {
        position: PositionId,
        vault: VaultId,
        amount: U256,
    },
    #[error("{position} already has the maximum of {max} vaults")]
    TooManyVaults { position: PositionId, max: usize },
    #[error("vault index {index} out of bounds for {position} ({len} attached)")]
    IndexOutOfBounds {
        position: PositionId,
        index: usize,
        len: usize,
    },
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },
    #[error("{position} would be undercollateralized: ratio {ratio} < minimum {minimum}")]
    Undercollateralized {
        position: PositionId,
        ratio: U256,
        minimum: U256,
    },
    #[error("burn of {amount} exceeds debt {debt} of {position}")]
    BurnExceedsDebt {
        position: PositionId,
        amount: U256,
        debt: U256,
    },
    #[error("{position} is healthy (ratio {ratio}), nothing to liquidate")]
    Healthy { position: PositionId, ratio: U256 },
    #[error("oracle price must be non-zero")]
    ZeroPrice,
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Operations and queries of a multi-collateral debt-issuance protocol.
///
/// Mutating calls are atomic: on `Err` no state has changed.
pub trait CollateralProtocol {
    // Position registry
    fn total_positions(&self) -> u64;
    fn owner_of(&self, position: PositionId) -> Result<Principal, ProtocolError>;

    // Vault registry (fixed at setup, in registration order)
    fn vaults(&self) -> Vec<VaultId>;

    // Vault operations
    fn deposit(
        &mut self,
        caller: &Principal,
        position: PositionId,
        vault: VaultId,
        amount: U256,
    ) -> Result<(), ProtocolError>;
    fn withdraw(
        &mut self,
        caller: &Principal,
        position: PositionId,
        vault: VaultId,
        amount: U256,
        recipient: &Principal,
    ) -> Result<(), ProtocolError>;
    fn add(&mut self, caller: &Principal, position: PositionId, vault: VaultId) -> Result<(), ProtocolError>;
    fn remove(&mut self, caller: &Principal, position: PositionId, vault: VaultId) -> Result<(), ProtocolError>;
    fn balance_held(&self, vault: VaultId, position: PositionId) -> Result<U256, ProtocolError>;
    /// Total asset balance physically held by the vault.
    fn vault_assets(&self, vault: VaultId) -> Result<U256, ProtocolError>;
    /// `index`-th attached vault of `position`; fails once `index >= count`.
    fn list_vaults(&self, position: PositionId, index: usize) -> Result<VaultId, ProtocolError>;

    // Debt operations
    fn mint(
        &mut self,
        caller: &Principal,
        position: PositionId,
        amount: U256,
        recipient: &Principal,
    ) -> Result<(), ProtocolError>;
    fn burn(&mut self, caller: &Principal, position: PositionId, amount: U256) -> Result<(), ProtocolError>;
    fn minted_debt(&self, position: PositionId) -> Result<U256, ProtocolError>;
    fn total_debt_supply(&self) -> U256;
    fn debt_balance_of(&self, who: &Principal) -> U256;

    // Risk queries
    fn collateralization_ratio(&self, position: PositionId) -> Result<U256, ProtocolError>;
    fn minimum_collateralization_ratio(&self) -> U256;
    fn max_vaults_per_position(&self) -> usize;

    // Liquidation
    fn liquidate(
        &mut self,
        caller: &Principal,
        position: PositionId,
        beneficiary: PositionId,
    ) -> Result<(), ProtocolError>;

    // Oracle
    fn price(&self, vault: VaultId) -> Result<U256, ProtocolError>;
    fn price_decimals(&self, vault: VaultId) -> Result<u8, ProtocolError>;
    fn asset_decimals(&self, vault: VaultId) -> Result<u8, ProtocolError>;

    // Test-only controls
    fn set_price(&mut self, vault: VaultId, price: U256) -> Result<(), ProtocolError>;
    /// Faucet for the vault's underlying asset.
    fn mint_asset(&mut self, vault: VaultId, to: &Principal, amount: U256) -> Result<(), ProtocolError>;
    /// Credit debt-token balance without touching total supply.
    fn fund_debt_token(&mut self, to: &Principal, amount: U256);
}
