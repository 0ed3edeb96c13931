//! In-process reference implementation of a multi-collateral debt protocol.
//!
//! Positions ("notes") attach collateral vaults, mint a USD debt token against
//! their collateral value and are liquidated below the minimum ratio.

pub mod instructions;
pub mod state;


use keel_types::{
    CollateralProtocol, PositionId, Principal, ProtocolError, VaultId, VaultSpec, MAX_SCALE_DECIMALS, U256,
};
pub use state::{PositionState, ProtocolParams, ProtocolState, VaultState};

#[derive(Debug, Clone, Default)]
pub struct Protocol {
    pub state: ProtocolState,
}

impl Protocol {
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            state: ProtocolState {
                params,
                ..Default::default()
            },
        }
    }

    pub fn register_vault(&mut self, spec: &VaultSpec) -> Result<VaultId, ProtocolError> {
        if spec.initial_price.is_zero() {
            return Err(ProtocolError::ZeroPrice);
        }
        if spec.scale_decimals() > MAX_SCALE_DECIMALS {
            return Err(ProtocolError::Overflow("vault decimals"));
        }
        let id = VaultId(self.state.vaults.len() as u32);
        self.state.vaults.push(VaultState::from_spec(spec));
        Ok(id)
    }

    pub fn open_position(&mut self, owner: Principal) -> PositionId {
        let id = PositionId(self.state.positions.len() as u64);
        self.state.positions.push(PositionState::new(owner));
        id
    }

    pub fn position_value(&self, position: PositionId) -> Result<U256, ProtocolError> {
        self.state.position_value(position)
    }

    pub fn asset_balance_of(&self, vault: VaultId, who: &Principal) -> Result<U256, ProtocolError> {
        Ok(self.state.vault(vault)?.wallet(who))
    }
}

impl CollateralProtocol for Protocol {
    fn total_positions(&self) -> u64 {
        self.state.positions.len() as u64
    }

    fn owner_of(&self, position: PositionId) -> Result<Principal, ProtocolError> {
        Ok(self.state.position(position)?.owner)
    }

    fn vaults(&self) -> Vec<VaultId> {
        (0..self.state.vaults.len() as u32).map(VaultId).collect()
    }

    fn deposit(
        &mut self,
        caller: &Principal,
        position: PositionId,
        vault: VaultId,
        amount: U256,
    ) -> Result<(), ProtocolError> {
        instructions::vaults::deposit(&mut self.state, caller, position, vault, amount)
    }

    fn withdraw(
        &mut self,
        caller: &Principal,
        position: PositionId,
        vault: VaultId,
        amount: U256,
        recipient: &Principal,
    ) -> Result<(), ProtocolError> {
        instructions::vaults::withdraw(&mut self.state, caller, position, vault, amount, recipient)
    }

    fn add(&mut self, caller: &Principal, position: PositionId, vault: VaultId) -> Result<(), ProtocolError> {
        instructions::vaults::add(&mut self.state, caller, position, vault)
    }

    fn remove(&mut self, caller: &Principal, position: PositionId, vault: VaultId) -> Result<(), ProtocolError> {
        instructions::vaults::remove(&mut self.state, caller, position, vault)
    }

    fn balance_held(&self, vault: VaultId, position: PositionId) -> Result<U256, ProtocolError> {
        self.state.vault(vault)?;
        Ok(self.state.position(position)?.held(vault))
    }

    fn vault_assets(&self, vault: VaultId) -> Result<U256, ProtocolError> {
        Ok(self.state.vault(vault)?.total_assets)
    }

    fn list_vaults(&self, position: PositionId, index: usize) -> Result<VaultId, ProtocolError> {
        let current = self.state.position(position)?;
        current
            .vaults
            .get(index)
            .copied()
            .ok_or(ProtocolError::IndexOutOfBounds {
                position,
                index,
                len: current.vaults.len(),
            })
    }

    fn mint(
        &mut self,
        caller: &Principal,
        position: PositionId,
        amount: U256,
        recipient: &Principal,
    ) -> Result<(), ProtocolError> {
        instructions::debt::mint(&mut self.state, caller, position, amount, recipient)
    }

    fn burn(&mut self, caller: &Principal, position: PositionId, amount: U256) -> Result<(), ProtocolError> {
        instructions::debt::burn(&mut self.state, caller, position, amount)
    }

    fn minted_debt(&self, position: PositionId) -> Result<U256, ProtocolError> {
        Ok(self.state.position(position)?.debt)
    }

    fn total_debt_supply(&self) -> U256 {
        self.state.debt_supply
    }

    fn debt_balance_of(&self, who: &Principal) -> U256 {
        self.state.debt_balance(who)
    }

    fn collateralization_ratio(&self, position: PositionId) -> Result<U256, ProtocolError> {
        let debt = self.state.position(position)?.debt;
        let value = self.state.position_value(position)?;
        ProtocolState::ratio_of(value, debt)
    }

    fn minimum_collateralization_ratio(&self) -> U256 {
        self.state.params.min_collateralization_ratio
    }

    fn max_vaults_per_position(&self) -> usize {
        self.state.params.max_vaults_per_position
    }

    fn liquidate(
        &mut self,
        caller: &Principal,
        position: PositionId,
        beneficiary: PositionId,
    ) -> Result<(), ProtocolError> {
        instructions::liquidate::liquidate(&mut self.state, caller, position, beneficiary)
    }

    fn price(&self, vault: VaultId) -> Result<U256, ProtocolError> {
        Ok(self.state.vault(vault)?.price)
    }

    fn price_decimals(&self, vault: VaultId) -> Result<u8, ProtocolError> {
        Ok(self.state.vault(vault)?.oracle_decimals)
    }

    fn asset_decimals(&self, vault: VaultId) -> Result<u8, ProtocolError> {
        Ok(self.state.vault(vault)?.asset_decimals)
    }

    fn set_price(&mut self, vault: VaultId, price: U256) -> Result<(), ProtocolError> {
        if price.is_zero() {
            return Err(ProtocolError::ZeroPrice);
        }
        self.state.vault_mut(vault)?.price = price;
        Ok(())
    }

    fn mint_asset(&mut self, vault: VaultId, to: &Principal, amount: U256) -> Result<(), ProtocolError> {
        let vault_state = self.state.vault_mut(vault)?;
        let balance = vault_state
            .wallet(to)
            .checked_add(amount)
            .ok_or(ProtocolError::Overflow("mint_asset"))?;
        vault_state.wallets.insert(*to, balance);
        Ok(())
    }

    fn fund_debt_token(&mut self, to: &Principal, amount: U256) {
        let balance = self.state.debt_balance(to).saturating_add(amount);
        self.state.debt_balances.insert(*to, balance);
    }
}
