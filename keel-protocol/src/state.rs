use keel_types::{pow10, PositionId, Principal, ProtocolError, VaultId, VaultSpec, U256, WAD};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct ProtocolParams {
    /// WAD-scaled; 1.5e18 means collateral must be worth 150% of debt.
    pub min_collateralization_ratio: U256,
    pub max_vaults_per_position: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_collateralization_ratio: WAD * U256::from(3u64) / U256::from(2u64),
            max_vaults_per_position: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultState {
    pub asset_decimals: u8,
    pub oracle_decimals: u8,
    pub price: U256,
    /// Underlying asset held by the vault contract.
    pub total_assets: U256,
    /// Underlying asset sitting in wallets (the asset token ledger).
    pub wallets: HashMap<Principal, U256>,
}

impl VaultState {
    pub fn from_spec(spec: &VaultSpec) -> Self {
        Self {
            asset_decimals: spec.asset_decimals,
            oracle_decimals: spec.oracle_decimals,
            price: spec.initial_price,
            total_assets: U256::ZERO,
            wallets: HashMap::new(),
        }
    }

    pub fn wallet(&self, who: &Principal) -> U256 {
        self.wallets.get(who).copied().unwrap_or(U256::ZERO)
    }

    /// USD value (WAD) of `amount` at the current price, truncating.
    pub fn usd_value(&self, amount: U256) -> Result<U256, ProtocolError> {
        let scale = pow10(self.oracle_decimals as u32 + self.asset_decimals as u32)
            .ok_or(ProtocolError::Overflow("usd_value"))?;
        amount
            .checked_mul(self.price)
            .and_then(|v| v.checked_mul(WAD))
            .map(|v| v / scale)
            .ok_or(ProtocolError::Overflow("usd_value"))
    }
}

#[derive(Debug, Clone)]
pub struct PositionState {
    pub owner: Principal,
    pub debt: U256,
    /// Attached vaults in insertion order.
    pub vaults: Vec<VaultId>,
    pub held: BTreeMap<VaultId, U256>,
}

impl PositionState {
    pub fn new(owner: Principal) -> Self {
        Self {
            owner,
            debt: U256::ZERO,
            vaults: Vec::new(),
            held: BTreeMap::new(),
        }
    }

    pub fn is_attached(&self, vault: VaultId) -> bool {
        self.vaults.contains(&vault)
    }

    pub fn held(&self, vault: VaultId) -> U256 {
        self.held.get(&vault).copied().unwrap_or(U256::ZERO)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolState {
    pub params: ProtocolParams,
    pub vaults: Vec<VaultState>,
    pub positions: Vec<PositionState>,
    pub debt_balances: HashMap<Principal, U256>,
    pub debt_supply: U256,
}

impl ProtocolState {
    pub fn vault(&self, id: VaultId) -> Result<&VaultState, ProtocolError> {
        self.vaults
            .get(id.0 as usize)
            .ok_or(ProtocolError::UnknownVault(id))
    }

    pub fn vault_mut(&mut self, id: VaultId) -> Result<&mut VaultState, ProtocolError> {
        self.vaults
            .get_mut(id.0 as usize)
            .ok_or(ProtocolError::UnknownVault(id))
    }

    pub fn position(&self, id: PositionId) -> Result<&PositionState, ProtocolError> {
        self.positions
            .get(id.0 as usize)
            .ok_or(ProtocolError::UnknownPosition(id))
    }

    pub fn position_mut(&mut self, id: PositionId) -> Result<&mut PositionState, ProtocolError> {
        self.positions
            .get_mut(id.0 as usize)
            .ok_or(ProtocolError::UnknownPosition(id))
    }

    /// Owned position lookup; every user-facing mutation goes through this.
    pub fn owned(&self, caller: &Principal, id: PositionId) -> Result<&PositionState, ProtocolError> {
        let position = self.position(id)?;
        if &position.owner != caller {
            return Err(ProtocolError::NotOwner { position: id });
        }
        Ok(position)
    }

    pub fn debt_balance(&self, who: &Principal) -> U256 {
        self.debt_balances.get(who).copied().unwrap_or(U256::ZERO)
    }

    /// Total collateral value of a position, optionally pretending one vault
    /// holds a different amount.
    pub fn position_value_with(
        &self,
        id: PositionId,
        replace: Option<(VaultId, U256)>,
    ) -> Result<U256, ProtocolError> {
        let position = self.position(id)?;
        let mut total = U256::ZERO;
        for (&vault, &held) in &position.held {
            let amount = match replace {
                Some((v, amount)) if v == vault => amount,
                _ => held,
            };
            let value = self.vault(vault)?.usd_value(amount)?;
            total = total
                .checked_add(value)
                .ok_or(ProtocolError::Overflow("position_value"))?;
        }
        if let Some((vault, amount)) = replace {
            if !position.held.contains_key(&vault) {
                let value = self.vault(vault)?.usd_value(amount)?;
                total = total
                    .checked_add(value)
                    .ok_or(ProtocolError::Overflow("position_value"))?;
            }
        }
        Ok(total)
    }

    pub fn position_value(&self, id: PositionId) -> Result<U256, ProtocolError> {
        self.position_value_with(id, None)
    }

    pub fn ratio_of(value: U256, debt: U256) -> Result<U256, ProtocolError> {
        if debt.is_zero() {
            return Ok(U256::MAX);
        }
        value
            .checked_mul(WAD)
            .map(|v| v / debt)
            .ok_or(ProtocolError::Overflow("collateralization_ratio"))
    }

    /// Rejects a prospective (value, debt) pair that would leave `id` below
    /// the minimum ratio.
    pub fn ensure_healthy(&self, id: PositionId, value: U256, debt: U256) -> Result<(), ProtocolError> {
        let ratio = Self::ratio_of(value, debt)?;
        if ratio < self.params.min_collateralization_ratio {
            return Err(ProtocolError::Undercollateralized {
                position: id,
                ratio,
                minimum: self.params.min_collateralization_ratio,
            });
        }
        Ok(())
    }
}
