use crate::state::ProtocolState;
use keel_types::{PositionId, Principal, ProtocolError, VaultId, U256};

pub fn add(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    vault: VaultId,
) -> Result<(), ProtocolError> {
    state.vault(vault)?;
    let max = state.params.max_vaults_per_position;
    let current = state.owned(caller, position)?;
    if current.is_attached(vault) {
        // Set semantics: re-adding is a no-op.
        return Ok(());
    }
    if current.vaults.len() >= max {
        return Err(ProtocolError::TooManyVaults { position, max });
    }
    state.position_mut(position)?.vaults.push(vault);
    Ok(())
}

pub fn remove(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    vault: VaultId,
) -> Result<(), ProtocolError> {
    state.vault(vault)?;
    let current = state.owned(caller, position)?;
    let Some(idx) = current.vaults.iter().position(|v| *v == vault) else {
        return Err(ProtocolError::NotAttached { position, vault });
    };
    let amount = current.held(vault);
    if !amount.is_zero() {
        return Err(ProtocolError::VaultNotEmpty {
            position,
            vault,
            amount,
        });
    }
    let current = state.position_mut(position)?;
    current.vaults.remove(idx);
    current.held.remove(&vault);
    Ok(())
}

pub fn deposit(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    vault: VaultId,
    amount: U256,
) -> Result<(), ProtocolError> {
    let current = state.owned(caller, position)?;
    if !current.is_attached(vault) {
        return Err(ProtocolError::NotAttached { position, vault });
    }
    let held = current
        .held(vault)
        .checked_add(amount)
        .ok_or(ProtocolError::Overflow("deposit"))?;

    let vault_state = state.vault(vault)?;
    let available = vault_state.wallet(caller);
    if available < amount {
        return Err(ProtocolError::InsufficientBalance {
            needed: amount,
            available,
        });
    }
    let total_assets = vault_state
        .total_assets
        .checked_add(amount)
        .ok_or(ProtocolError::Overflow("deposit"))?;
    // Price the new holdings now so an overflow surfaces before any mutation.
    state.position_value_with(position, Some((vault, held)))?;

    let vault_state = state.vault_mut(vault)?;
    vault_state.wallets.insert(*caller, available - amount);
    vault_state.total_assets = total_assets;
    state.position_mut(position)?.held.insert(vault, held);
    Ok(())
}

pub fn withdraw(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    vault: VaultId,
    amount: U256,
    recipient: &Principal,
) -> Result<(), ProtocolError> {
    let current = state.owned(caller, position)?;
    if !current.is_attached(vault) {
        return Err(ProtocolError::NotAttached { position, vault });
    }
    let held = current.held(vault);
    if held < amount {
        return Err(ProtocolError::InsufficientBalance {
            needed: amount,
            available: held,
        });
    }
    let debt = current.debt;
    let remaining = held - amount;
    if !debt.is_zero() {
        let value = state.position_value_with(position, Some((vault, remaining)))?;
        state.ensure_healthy(position, value, debt)?;
    }
    let vault_state = state.vault(vault)?;
    let credited = vault_state
        .wallet(recipient)
        .checked_add(amount)
        .ok_or(ProtocolError::Overflow("withdraw"))?;

    let vault_state = state.vault_mut(vault)?;
    vault_state.total_assets -= amount;
    vault_state.wallets.insert(*recipient, credited);
    state.position_mut(position)?.held.insert(vault, remaining);
    Ok(())
}
