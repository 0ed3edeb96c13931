//! The seven action generators.
//!
//! Each generator draws its target and parameters from the seed stream,
//! bounds them so the protocol must accept them, issues the call and updates
//! the membership mirror only after the call succeeded. The `*_into` /
//! `*_from` variants take explicit targets and are what the generators call
//! once their draws are made.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, ProtocolResultExt};
use crate::invariants::InvariantChecker;
use crate::membership::VaultMembership;
use crate::sampler::{bound, bound_u64};
use crate::seed::SeedStream;
use crate::valuation::Valuation;
use keel_types::{
    pow10, ActionKind, CollateralProtocol, PositionId, Principal, ProtocolError, VaultId, U256, WAD,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

const BPS: u64 = 10_000;

/// What a single action ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Executed,
    /// No legal target existed; nothing was sent to the protocol.
    Skipped,
    /// The protocol refused with the expected domain failure.
    Tolerated,
    /// Prices moved and this many positions were liquidated.
    Liquidated(u64),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub calls: u64,
    pub skips: u64,
    pub tolerated: u64,
    pub liquidations: u64,
}

/// Per-action counters for one run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    per_kind: [KindStats; 7],
}

impl CallStats {
    pub fn record(&mut self, kind: ActionKind, outcome: Outcome) {
        let entry = &mut self.per_kind[kind.index()];
        entry.calls += 1;
        match outcome {
            Outcome::Executed => {}
            Outcome::Skipped => entry.skips += 1,
            Outcome::Tolerated => entry.tolerated += 1,
            Outcome::Liquidated(n) => entry.liquidations += n,
        }
    }

    /// Adds another run's counters to these.
    pub fn merge(&mut self, other: &CallStats) {
        for (mine, theirs) in self.per_kind.iter_mut().zip(other.per_kind.iter()) {
            mine.calls += theirs.calls;
            mine.skips += theirs.skips;
            mine.tolerated += theirs.tolerated;
            mine.liquidations += theirs.liquidations;
        }
    }

    pub fn get(&self, kind: ActionKind) -> KindStats {
        self.per_kind[kind.index()]
    }

    pub fn total_calls(&self) -> u64 {
        self.per_kind.iter().map(|k| k.calls).sum()
    }

    pub fn total_liquidations(&self) -> u64 {
        self.per_kind.iter().map(|k| k.liquidations).sum()
    }
}

impl fmt::Display for CallStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<28} {:>8} {:>8} {:>10} {:>12}",
            "action", "calls", "skips", "tolerated", "liquidations"
        )?;
        for kind in ActionKind::ALL {
            let s = self.get(kind);
            writeln!(
                f,
                "{:<28} {:>8} {:>8} {:>10} {:>12}",
                kind.name(),
                s.calls,
                s.skips,
                s.tolerated,
                s.liquidations
            )?;
        }
        Ok(())
    }
}

/// Drives a protocol with generated actions and owns every mirror of its state.
pub struct Harness<P> {
    sut: P,
    config: HarnessConfig,
    seeds: SeedStream,
    membership: VaultMembership,
    checker: InvariantChecker,
    liquidator: Principal,
    stats: CallStats,
}

impl<P: CollateralProtocol> Harness<P> {
    pub fn new(sut: P, config: HarnessConfig, root_seed: U256, liquidator: Principal) -> Self {
        let membership = VaultMembership::new(sut.vaults(), sut.max_vaults_per_position());
        let checker = InvariantChecker::new(config.system_cr_floor);
        Self {
            sut,
            config,
            seeds: SeedStream::new(root_seed),
            membership,
            checker,
            liquidator,
            stats: CallStats::default(),
        }
    }

    pub fn sut(&self) -> &P {
        &self.sut
    }

    /// Direct protocol access for test setups (oracle moves, faucets).
    pub fn sut_mut(&mut self) -> &mut P {
        &mut self.sut
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn membership(&self) -> &VaultMembership {
        &self.membership
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    pub fn seeds(&self) -> &SeedStream {
        &self.seeds
    }

    pub fn liquidator(&self) -> &Principal {
        &self.liquidator
    }

    pub fn valuation(&self) -> Valuation<'_, P> {
        Valuation::new(&self.sut)
    }

    pub fn check_invariants(&self) -> Result<(), HarnessError> {
        self.checker.check_all(&self.sut, &self.membership)
    }

    /// Folds `entropy` into the seed stream and runs `kind`.
    pub fn execute(&mut self, kind: ActionKind, entropy: U256) -> Result<Outcome, HarnessError> {
        self.seeds.absorb(entropy);
        let outcome = match kind {
            ActionKind::Deposit => self.deposit(),
            ActionKind::Withdraw => self.withdraw(),
            ActionKind::AddVault => self.add_vault(),
            ActionKind::RemoveVault => self.remove_vault(),
            ActionKind::MintDebt => self.mint_debt(),
            ActionKind::BurnDebt => self.burn_debt(),
            ActionKind::PriceDriftAndLiquidate => self.price_drift_and_liquidate(),
        }?;
        self.stats.record(kind, outcome);
        Ok(outcome)
    }

    fn pick_position(&mut self) -> Result<PositionId, HarnessError> {
        let total = self.sut.total_positions();
        if total == 0 {
            return Err(HarnessError::NoSuchPosition);
        }
        Ok(PositionId(bound_u64(self.seeds.draw(), 0, total - 1)))
    }

    fn owner(&self, position: PositionId, action: &'static str) -> Result<Principal, HarnessError> {
        self.sut.owner_of(position).during(action)
    }

    fn skip(&self, action: &'static str, position: PositionId, reason: &str) -> Outcome {
        info!("{action}: skipped for {position}: {reason}");
        Outcome::Skipped
    }

    // ══════════════════════════════════════════════════════════════
    // Collateral
    // ══════════════════════════════════════════════════════════════

    pub fn deposit(&mut self) -> Result<Outcome, HarnessError> {
        let position = self.pick_position()?;
        let Some(vault) = self.membership.pick_attached(position, self.seeds.draw()) else {
            return Ok(self.skip("deposit", position, "no attached vault"));
        };
        let decimals = self.sut.asset_decimals(vault).during("deposit")?;
        let cap = pow10(decimals as u32)
            .and_then(|unit| unit.checked_mul(U256::from(self.config.deposit_cap_units)))
            .ok_or(HarnessError::Overflow("deposit cap"))?;
        let amount = bound(self.seeds.draw(), U256::ZERO, cap);
        self.deposit_into(position, vault, amount)
    }

    /// Faucets `amount` of the vault asset to the owner, then deposits it.
    pub fn deposit_into(
        &mut self,
        position: PositionId,
        vault: VaultId,
        amount: U256,
    ) -> Result<Outcome, HarnessError> {
        let owner = self.owner(position, "deposit")?;
        self.sut.mint_asset(vault, &owner, amount).during("deposit")?;
        self.sut.deposit(&owner, position, vault, amount).during("deposit")?;
        debug!("deposit: {amount} into {vault} for {position}");
        Ok(Outcome::Executed)
    }

    pub fn withdraw(&mut self) -> Result<Outcome, HarnessError> {
        let position = self.pick_position()?;
        let Some(vault) = self.membership.pick_attached(position, self.seeds.draw()) else {
            return Ok(self.skip("withdraw", position, "no attached vault"));
        };
        let max = self.valuation().max_withdrawable(position, vault)?;
        let amount = bound(self.seeds.draw(), U256::ZERO, max);
        self.withdraw_from(position, vault, amount)
    }

    pub fn withdraw_from(
        &mut self,
        position: PositionId,
        vault: VaultId,
        amount: U256,
    ) -> Result<Outcome, HarnessError> {
        let owner = self.owner(position, "withdraw")?;
        self.sut
            .withdraw(&owner, position, vault, amount, &owner)
            .during("withdraw")?;
        debug!("withdraw: {amount} from {vault} for {position}");
        Ok(Outcome::Executed)
    }

    pub fn add_vault(&mut self) -> Result<Outcome, HarnessError> {
        let position = self.pick_position()?;
        if self.membership.is_full(position) {
            return Ok(self.skip("add_vault", position, "vault set is full"));
        }
        let Some(vault) = self.membership.pick_unattached(position, self.seeds.draw()) else {
            return Ok(self.skip("add_vault", position, "every vault attached"));
        };
        self.add_vault_to(position, vault)
    }

    pub fn add_vault_to(&mut self, position: PositionId, vault: VaultId) -> Result<Outcome, HarnessError> {
        let owner = self.owner(position, "add_vault")?;
        self.sut.add(&owner, position, vault).during("add_vault")?;
        self.membership.attach(position, vault);
        debug!("add_vault: {vault} to {position}");
        Ok(Outcome::Executed)
    }

    pub fn remove_vault(&mut self) -> Result<Outcome, HarnessError> {
        let position = self.pick_position()?;
        let Some(vault) = self.membership.pick_attached(position, self.seeds.draw()) else {
            return Ok(self.skip("remove_vault", position, "no attached vault"));
        };
        self.remove_vault_from(position, vault)
    }

    pub fn remove_vault_from(&mut self, position: PositionId, vault: VaultId) -> Result<Outcome, HarnessError> {
        let owner = self.owner(position, "remove_vault")?;
        match self.sut.remove(&owner, position, vault) {
            Ok(()) => {
                self.membership.detach(position, vault);
                debug!("remove_vault: {vault} from {position}");
                Ok(Outcome::Executed)
            }
            // Coupled to how the protocol signals a non-empty vault. If that
            // signal changes, this arm has to change with it; every other
            // failure stays fatal.
            Err(ProtocolError::VaultNotEmpty { amount, .. }) => {
                info!("remove_vault: {vault} still holds {amount} for {position}, kept attached");
                Ok(Outcome::Tolerated)
            }
            Err(source) => Err(HarnessError::Protocol {
                action: "remove_vault",
                source,
            }),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Debt
    // ══════════════════════════════════════════════════════════════

    pub fn mint_debt(&mut self) -> Result<Outcome, HarnessError> {
        let position = self.pick_position()?;
        let capacity = self.valuation().position_debt_capacity(position)?;
        let debt = self.sut.minted_debt(position).during("mint_debt")?;
        let amount = bound(self.seeds.draw(), U256::ZERO, capacity - debt);
        self.mint_into(position, amount)
    }

    /// Mints `amount` to the owner and checks the ratio did not go up.
    pub fn mint_into(&mut self, position: PositionId, amount: U256) -> Result<Outcome, HarnessError> {
        let owner = self.owner(position, "mint_debt")?;
        let before = self.sut.collateralization_ratio(position).during("mint_debt")?;
        self.sut.mint(&owner, position, amount, &owner).during("mint_debt")?;
        let after = self.sut.collateralization_ratio(position).during("mint_debt")?;
        if after > before {
            return Err(HarnessError::CrIncreasedOnMint {
                position,
                before,
                after,
            });
        }
        debug!("mint_debt: {amount} for {position}, ratio {before} -> {after}");
        Ok(Outcome::Executed)
    }

    pub fn burn_debt(&mut self) -> Result<Outcome, HarnessError> {
        let position = self.pick_position()?;
        let debt = self.sut.minted_debt(position).during("burn_debt")?;
        let amount = bound(self.seeds.draw(), U256::ZERO, debt);
        self.burn_from(position, amount)
    }

    pub fn burn_from(&mut self, position: PositionId, amount: U256) -> Result<Outcome, HarnessError> {
        let owner = self.owner(position, "burn_debt")?;
        self.sut.burn(&owner, position, amount).during("burn_debt")?;
        debug!("burn_debt: {amount} for {position}");
        Ok(Outcome::Executed)
    }

    // ══════════════════════════════════════════════════════════════
    // Market
    // ══════════════════════════════════════════════════════════════

    /// Moves every oracle by a factor in the configured band, then
    /// liquidates every position left under the minimum ratio.
    pub fn price_drift_and_liquidate(&mut self) -> Result<Outcome, HarnessError> {
        let (lo, hi) = (self.config.price_drift_min_bps, self.config.price_drift_max_bps);
        for vault in self.sut.vaults() {
            let bps = bound_u64(self.seeds.draw(), lo, hi);
            self.drift_price(vault, bps)?;
        }
        self.liquidate_unhealthy()
    }

    /// `price × bps ÷ 10_000`, floored at one so the oracle never reads zero.
    pub fn drift_price(&mut self, vault: VaultId, bps: u64) -> Result<(), HarnessError> {
        let price = self.sut.price(vault).during("price_drift")?;
        let moved = price
            .checked_mul(U256::from(bps))
            .ok_or(HarnessError::Overflow("price_drift"))?
            / U256::from(BPS);
        let moved = moved.max(U256::from(1u64));
        self.sut.set_price(vault, moved).during("price_drift")?;
        debug!("price_drift: {vault} {price} -> {moved} ({bps} bps)");
        Ok(())
    }

    /// Liquidates every position under the minimum ratio into a drawn
    /// beneficiary. Positions are visited in id order.
    pub fn liquidate_unhealthy(&mut self) -> Result<Outcome, HarnessError> {
        let minimum = self.sut.minimum_collateralization_ratio();
        let mut liquidated = 0;
        for id in 0..self.sut.total_positions() {
            let position = PositionId(id);
            let ratio = self.sut.collateralization_ratio(position).during("liquidate")?;
            if ratio >= minimum {
                continue;
            }
            let beneficiary = self.pick_position()?;
            self.liquidate_into(position, beneficiary)?;
            liquidated += 1;
        }
        Ok(Outcome::Liquidated(liquidated))
    }

    /// Liquidates `position` into `beneficiary` as the fixed liquidator.
    ///
    /// When the position was at least fully collateralized, the
    /// beneficiary's worth must rise by no less than the debt covered.
    pub fn liquidate_into(&mut self, position: PositionId, beneficiary: PositionId) -> Result<(), HarnessError> {
        let ratio = self.sut.collateralization_ratio(position).during("liquidate")?;
        let covered = self.sut.minted_debt(position).during("liquidate")?;
        let before = self.valuation().worth(beneficiary)?;

        let liquidator = self.liquidator;
        self.sut
            .liquidate(&liquidator, position, beneficiary)
            .during("liquidate")?;

        let after = self.valuation().worth(beneficiary)?;
        warn!(
            "liquidated {position} (ratio {ratio}, debt {covered}) into {beneficiary}: worth {before} -> {after}"
        );
        if ratio >= WAD && !after.gained_at_least(&before, covered) {
            return Err(HarnessError::LiquidationLoss {
                position,
                beneficiary,
                ratio,
                covered,
                before,
                after,
            });
        }
        Ok(())
    }
}
