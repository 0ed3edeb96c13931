use crate::state::ProtocolState;
use keel_types::{PositionId, Principal, ProtocolError, U256};

pub fn mint(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    amount: U256,
    recipient: &Principal,
) -> Result<(), ProtocolError> {
    let current = state.owned(caller, position)?;
    let debt = current
        .debt
        .checked_add(amount)
        .ok_or(ProtocolError::Overflow("mint"))?;
    let value = state.position_value(position)?;
    state.ensure_healthy(position, value, debt)?;

    let supply = state
        .debt_supply
        .checked_add(amount)
        .ok_or(ProtocolError::Overflow("mint"))?;
    let balance = state
        .debt_balance(recipient)
        .checked_add(amount)
        .ok_or(ProtocolError::Overflow("mint"))?;

    state.position_mut(position)?.debt = debt;
    state.debt_supply = supply;
    state.debt_balances.insert(*recipient, balance);
    Ok(())
}

pub fn burn(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    amount: U256,
) -> Result<(), ProtocolError> {
    let debt = state.owned(caller, position)?.debt;
    if amount > debt {
        return Err(ProtocolError::BurnExceedsDebt {
            position,
            amount,
            debt,
        });
    }
    let available = state.debt_balance(caller);
    if available < amount {
        return Err(ProtocolError::InsufficientBalance {
            needed: amount,
            available,
        });
    }

    state.debt_balances.insert(*caller, available - amount);
    state.debt_supply -= amount;
    state.position_mut(position)?.debt = debt - amount;
    Ok(())
}
