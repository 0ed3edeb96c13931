//! Global predicates over protocol state. Each check only reads, so they can
//! run in any order and at any point between actions.

use crate::error::{HarnessError, ProtocolResultExt};
use crate::membership::VaultMembership;
use crate::valuation::{Valuation, Worth};
use keel_types::{CollateralProtocol, PositionId, ProtocolError, VaultId, U256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{vault} holds {held} but its positions record {recorded}")]
    VaultSolvency {
        vault: VaultId,
        held: U256,
        recorded: U256,
    },
    #[error("positions owe {recorded} but debt token supply is {supply}")]
    DebtSupply { recorded: U256, supply: U256 },
    #[error("{position}: locally attached {vault} missing from protocol list {reported:?}")]
    MembershipNotSubset {
        position: PositionId,
        vault: VaultId,
        reported: Vec<VaultId>,
    },
    #[error("{position}: list lookup past the end (index {index}) returned a vault")]
    ListPastEnd { position: PositionId, index: usize },
    #[error("{position}: {count} attached vaults, maximum is {max}")]
    TooManyVaults {
        position: PositionId,
        count: usize,
        max: usize,
    },
    #[error("system collateralization {ratio} below floor {floor}")]
    SystemCrBelowFloor { ratio: U256, floor: U256 },
    #[error("{position}: negative worth {worth}")]
    NegativeWorth { position: PositionId, worth: Worth },
}

/// Read-only checker over a protocol and the harness' membership mirror.
#[derive(Debug, Clone)]
pub struct InvariantChecker {
    floor: U256,
}

impl InvariantChecker {
    pub fn new(system_cr_floor: U256) -> Self {
        Self {
            floor: system_cr_floor,
        }
    }

    pub fn floor(&self) -> U256 {
        self.floor
    }

    /// Every vault's asset balance equals the sum of what positions record in it.
    pub fn vault_solvency<P: CollateralProtocol>(&self, sut: &P) -> Result<(), HarnessError> {
        for vault in sut.vaults() {
            let held = sut.vault_assets(vault).during("vault_solvency")?;
            let mut recorded = U256::ZERO;
            for position in positions(sut) {
                let amount = sut.balance_held(vault, position).during("vault_solvency")?;
                recorded = recorded
                    .checked_add(amount)
                    .ok_or(HarnessError::Overflow("vault_solvency"))?;
            }
            if held != recorded {
                return Err(InvariantViolation::VaultSolvency {
                    vault,
                    held,
                    recorded,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Sum of position debt equals the debt token's total supply.
    pub fn debt_supply<P: CollateralProtocol>(&self, sut: &P) -> Result<(), HarnessError> {
        let mut recorded = U256::ZERO;
        for position in positions(sut) {
            let debt = sut.minted_debt(position).during("debt_supply")?;
            recorded = recorded
                .checked_add(debt)
                .ok_or(HarnessError::Overflow("debt_supply"))?;
        }
        let supply = sut.total_debt_supply();
        if recorded != supply {
            return Err(InvariantViolation::DebtSupply { recorded, supply }.into());
        }
        Ok(())
    }

    /// The local mirror is a subset of the protocol's list, and the lookup one
    /// past the end fails.
    pub fn membership_subset<P: CollateralProtocol>(
        &self,
        sut: &P,
        membership: &VaultMembership,
    ) -> Result<(), HarnessError> {
        for position in positions(sut) {
            let reported = reported_vaults(sut, position)?;
            for vault in membership.attached(position) {
                if !reported.contains(vault) {
                    return Err(InvariantViolation::MembershipNotSubset {
                        position,
                        vault: *vault,
                        reported,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// No position has more vaults attached than the protocol allows.
    pub fn vault_count<P: CollateralProtocol>(&self, sut: &P) -> Result<(), HarnessError> {
        let max = sut.max_vaults_per_position();
        for position in positions(sut) {
            let count = reported_vaults(sut, position)?.len();
            if count > max {
                return Err(InvariantViolation::TooManyVaults {
                    position,
                    count,
                    max,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Once any debt exists, the system ratio stays at or above the floor.
    /// A ratio exactly on the floor passes.
    pub fn system_cr<P: CollateralProtocol>(&self, sut: &P) -> Result<(), HarnessError> {
        if sut.total_debt_supply().is_zero() {
            return Ok(());
        }
        let ratio = Valuation::new(sut).system_cr()?;
        if ratio < self.floor {
            return Err(InvariantViolation::SystemCrBelowFloor {
                ratio,
                floor: self.floor,
            }
            .into());
        }
        Ok(())
    }

    /// No position owes more than its collateral is worth.
    pub fn non_negative_worth<P: CollateralProtocol>(&self, sut: &P) -> Result<(), HarnessError> {
        let valuation = Valuation::new(sut);
        for position in positions(sut) {
            let worth = valuation.worth(position)?;
            if !worth.is_non_negative() {
                return Err(InvariantViolation::NegativeWorth { position, worth }.into());
            }
        }
        Ok(())
    }

    /// Runs every check, stopping at the first failure.
    pub fn check_all<P: CollateralProtocol>(
        &self,
        sut: &P,
        membership: &VaultMembership,
    ) -> Result<(), HarnessError> {
        self.vault_solvency(sut)?;
        self.debt_supply(sut)?;
        self.membership_subset(sut, membership)?;
        self.vault_count(sut)?;
        self.system_cr(sut)?;
        self.non_negative_worth(sut)
    }

    /// Runs every check and collects all violations. Non-invariant errors
    /// (a failing query, an overflow) still abort.
    pub fn violations<P: CollateralProtocol>(
        &self,
        sut: &P,
        membership: &VaultMembership,
    ) -> Result<Vec<InvariantViolation>, HarnessError> {
        let results = [
            self.vault_solvency(sut),
            self.debt_supply(sut),
            self.membership_subset(sut, membership),
            self.vault_count(sut),
            self.system_cr(sut),
            self.non_negative_worth(sut),
        ];
        let mut found = Vec::new();
        for result in results {
            match result {
                Ok(()) => {}
                Err(HarnessError::Invariant(violation)) => found.push(violation),
                Err(other) => return Err(other),
            }
        }
        Ok(found)
    }
}

fn positions<P: CollateralProtocol>(sut: &P) -> impl Iterator<Item = PositionId> {
    (0..sut.total_positions()).map(PositionId)
}

/// Walks `list_vaults` until it reports an out-of-bounds index. Any other
/// failure is a protocol error. The walk stops one past the protocol's maximum
/// so a list that never ends is reported instead of looped over.
fn reported_vaults<P: CollateralProtocol>(
    sut: &P,
    position: PositionId,
) -> Result<Vec<VaultId>, HarnessError> {
    let limit = sut.max_vaults_per_position() + 1;
    let mut found = Vec::new();
    for index in 0..=limit {
        match sut.list_vaults(position, index) {
            Ok(vault) => found.push(vault),
            Err(ProtocolError::IndexOutOfBounds { .. }) => return Ok(found),
            Err(source) => {
                return Err(HarnessError::Protocol {
                    action: "list_vaults",
                    source,
                })
            }
        }
    }
    Err(InvariantViolation::ListPastEnd {
        position,
        index: limit,
    }
    .into())
}
