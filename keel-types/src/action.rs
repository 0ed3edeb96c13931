use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven state-mutating actions the harness can drive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    // ══════════════════════════════════════════════════════════════
    // Collateral
    // ══════════════════════════════════════════════════════════════
    Deposit,
    Withdraw,
    AddVault,
    RemoveVault,

    // ══════════════════════════════════════════════════════════════
    // Debt
    // ══════════════════════════════════════════════════════════════
    MintDebt,
    BurnDebt,

    // ══════════════════════════════════════════════════════════════
    // Market
    // ══════════════════════════════════════════════════════════════
    PriceDriftAndLiquidate,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Deposit,
        ActionKind::Withdraw,
        ActionKind::AddVault,
        ActionKind::RemoveVault,
        ActionKind::MintDebt,
        ActionKind::BurnDebt,
        ActionKind::PriceDriftAndLiquidate,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Total mapping from a selector byte, used by byte-oriented fuzz engines.
    pub fn from_selector(selector: u8) -> Self {
        Self::ALL[selector as usize % Self::ALL.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Deposit => "deposit",
            ActionKind::Withdraw => "withdraw",
            ActionKind::AddVault => "add_vault",
            ActionKind::RemoveVault => "remove_vault",
            ActionKind::MintDebt => "mint_debt",
            ActionKind::BurnDebt => "burn_debt",
            ActionKind::PriceDriftAndLiquidate => "price_drift_and_liquidate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
