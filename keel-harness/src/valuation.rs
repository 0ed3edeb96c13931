//! Independent re-implementation of the protocol's USD accounting.
//!
//! Values are WAD-scaled (18 decimals) and every division truncates, exactly
//! like the protocol. The only place that rounds up is the retained-amount
//! side of the withdraw bound, where truncating would let a generated
//! withdrawal dip one unit under the minimum ratio.

use crate::error::{HarnessError, ProtocolResultExt};
use keel_types::{pow10, CollateralProtocol, PositionId, VaultId, U256, WAD};
use std::fmt;

/// Sentinel for "no debt": the healthiest possible ratio.
pub const INFINITE_RATIO: U256 = U256::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Oracle snapshot of one vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultQuote {
    pub price: U256,
    pub price_decimals: u8,
    pub asset_decimals: u8,
}

impl VaultQuote {
    pub fn fetch<P: CollateralProtocol>(sut: &P, vault: VaultId) -> Result<Self, HarnessError> {
        Ok(Self {
            price: sut.price(vault).during("quote")?,
            price_decimals: sut.price_decimals(vault).during("quote")?,
            asset_decimals: sut.asset_decimals(vault).during("quote")?,
        })
    }

    fn scale(&self) -> Result<U256, HarnessError> {
        pow10(self.price_decimals as u32 + self.asset_decimals as u32)
            .ok_or(HarnessError::Overflow("price scale"))
    }

    /// `amount × price × 1e18 ÷ 10^(oracle decimals + asset decimals)`, truncated.
    pub fn usd_value_of(&self, amount: U256) -> Result<U256, HarnessError> {
        let scale = self.scale()?;
        amount
            .checked_mul(self.price)
            .and_then(|v| v.checked_mul(WAD))
            .map(|v| v / scale)
            .ok_or(HarnessError::Overflow("usd_value_of"))
    }

    /// Inverse of [`usd_value_of`](Self::usd_value_of).
    pub fn amount_for_value(&self, value: U256, rounding: Rounding) -> Result<U256, HarnessError> {
        let numerator = value
            .checked_mul(self.scale()?)
            .ok_or(HarnessError::Overflow("amount_for_value"))?;
        let denominator = self
            .price
            .checked_mul(WAD)
            .ok_or(HarnessError::Overflow("amount_for_value"))?;
        Ok(div(numerator, denominator, rounding))
    }
}

fn div(numerator: U256, denominator: U256, rounding: Rounding) -> U256 {
    let quotient = numerator / denominator;
    match rounding {
        Rounding::Down => quotient,
        Rounding::Up if !(numerator % denominator).is_zero() => quotient + U256::from(1u64),
        Rounding::Up => quotient,
    }
}

/// Collateral value and debt of one position. Worth is `collateral - debt`
/// and may be negative, so both halves are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Worth {
    pub collateral: U256,
    pub debt: U256,
}

impl Worth {
    pub fn is_non_negative(&self) -> bool {
        self.collateral >= self.debt
    }

    /// `self - earlier >= amount`, evaluated without signed arithmetic.
    pub fn gained_at_least(&self, earlier: &Worth, amount: U256) -> bool {
        let lhs = self.collateral.saturating_add(earlier.debt);
        let rhs = earlier
            .collateral
            .saturating_add(self.debt)
            .saturating_add(amount);
        lhs >= rhs
    }
}

impl fmt::Display for Worth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_non_negative() {
            write!(f, "{}", self.collateral - self.debt)
        } else {
            write!(f, "-{}", self.debt - self.collateral)
        }
    }
}

/// Read-only view over the protocol that answers valuation questions.
pub struct Valuation<'a, P> {
    sut: &'a P,
}

impl<'a, P: CollateralProtocol> Valuation<'a, P> {
    pub fn new(sut: &'a P) -> Self {
        Self { sut }
    }

    pub fn usd_value_of(&self, vault: VaultId, amount: U256) -> Result<U256, HarnessError> {
        VaultQuote::fetch(self.sut, vault)?.usd_value_of(amount)
    }

    pub fn amount_for_value(&self, vault: VaultId, value: U256, rounding: Rounding) -> Result<U256, HarnessError> {
        VaultQuote::fetch(self.sut, vault)?.amount_for_value(value, rounding)
    }

    /// Sum of per-vault values, each truncated on its own as the protocol does.
    pub fn collateral_value(&self, position: PositionId) -> Result<U256, HarnessError> {
        let mut total = U256::ZERO;
        for vault in self.sut.vaults() {
            let held = self.sut.balance_held(vault, position).during("collateral_value")?;
            if held.is_zero() {
                continue;
            }
            total = total
                .checked_add(self.usd_value_of(vault, held)?)
                .ok_or(HarnessError::Overflow("collateral_value"))?;
        }
        Ok(total)
    }

    pub fn worth(&self, position: PositionId) -> Result<Worth, HarnessError> {
        Ok(Worth {
            collateral: self.collateral_value(position)?,
            debt: self.sut.minted_debt(position).during("worth")?,
        })
    }

    /// Largest debt the position's collateral supports at the minimum ratio.
    ///
    /// Fails with [`HarnessError::ModelDivergence`] when that is already below
    /// the debt the protocol has on record: clamping would hide the drift.
    pub fn position_debt_capacity(&self, position: PositionId) -> Result<U256, HarnessError> {
        let value = self.collateral_value(position)?;
        let minimum = self.sut.minimum_collateralization_ratio();
        let capacity = value
            .checked_mul(WAD)
            .ok_or(HarnessError::Overflow("position_debt_capacity"))?
            / minimum;
        let debt = self.sut.minted_debt(position).during("position_debt_capacity")?;
        if capacity < debt {
            return Err(HarnessError::ModelDivergence {
                position,
                capacity,
                debt,
            });
        }
        Ok(capacity)
    }

    /// Largest amount of `vault` the position can withdraw without its ratio
    /// falling under the minimum. Collapses to zero when nothing is spare.
    pub fn max_withdrawable(&self, position: PositionId, vault: VaultId) -> Result<U256, HarnessError> {
        let held = self.sut.balance_held(vault, position).during("max_withdrawable")?;
        let debt = self.sut.minted_debt(position).during("max_withdrawable")?;
        if debt.is_zero() || held.is_zero() {
            return Ok(held);
        }

        let minimum = self.sut.minimum_collateralization_ratio();
        let required = div(
            debt.checked_mul(minimum)
                .ok_or(HarnessError::Overflow("max_withdrawable"))?,
            WAD,
            Rounding::Up,
        );
        let value = self.collateral_value(position)?;
        if required >= value {
            return Ok(U256::ZERO);
        }
        let spare = value - required;

        let quote = VaultQuote::fetch(self.sut, vault)?;
        let vault_value = quote.usd_value_of(held)?;
        if spare >= vault_value {
            return Ok(held);
        }
        // Smallest amount that still carries the value that has to stay.
        let keep = quote.amount_for_value(vault_value - spare, Rounding::Up)?;
        Ok(held.saturating_sub(keep))
    }

    /// Total USD value of every vault's assets.
    pub fn total_collateral_value(&self) -> Result<U256, HarnessError> {
        let mut total = U256::ZERO;
        for vault in self.sut.vaults() {
            let assets = self.sut.vault_assets(vault).during("total_collateral_value")?;
            total = total
                .checked_add(self.usd_value_of(vault, assets)?)
                .ok_or(HarnessError::Overflow("total_collateral_value"))?;
        }
        Ok(total)
    }

    /// `total collateral value ÷ total debt`, or [`INFINITE_RATIO`] with no debt.
    pub fn system_cr(&self) -> Result<U256, HarnessError> {
        let debt = self.sut.total_debt_supply();
        if debt.is_zero() {
            return Ok(INFINITE_RATIO);
        }
        let value = self.total_collateral_value()?;
        Ok(value
            .checked_mul(WAD)
            .ok_or(HarnessError::Overflow("system_cr"))?
            / debt)
    }
}
