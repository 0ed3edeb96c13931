use crate::state::ProtocolState;
use keel_types::{PositionId, Principal, ProtocolError, VaultId, U256};
use tracing::debug;

/// Cancels the whole debt of an undercollateralized position, paid for by the
/// caller's debt-token balance, and moves every attached amount of collateral
/// into `beneficiary` (same vault, attached on demand).
pub fn liquidate(
    state: &mut ProtocolState,
    caller: &Principal,
    position: PositionId,
    beneficiary: PositionId,
) -> Result<(), ProtocolError> {
    let target = state.position(position)?;
    let debt = target.debt;
    let value = state.position_value(position)?;
    let ratio = ProtocolState::ratio_of(value, debt)?;
    if ratio >= state.params.min_collateralization_ratio {
        return Err(ProtocolError::Healthy { position, ratio });
    }

    let available = state.debt_balance(caller);
    if available < debt {
        return Err(ProtocolError::InsufficientBalance {
            needed: debt,
            available,
        });
    }

    let seized: Vec<(VaultId, U256)> = target
        .held
        .iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(vault, amount)| (*vault, *amount))
        .collect();

    if position != beneficiary {
        let receiver = state.position(beneficiary)?;
        let missing = seized
            .iter()
            .filter(|(vault, _)| !receiver.is_attached(*vault))
            .count();
        let max = state.params.max_vaults_per_position;
        if receiver.vaults.len() + missing > max {
            return Err(ProtocolError::TooManyVaults {
                position: beneficiary,
                max,
            });
        }
        for (vault, amount) in &seized {
            receiver
                .held(*vault)
                .checked_add(*amount)
                .ok_or(ProtocolError::Overflow("liquidate"))?;
        }
    }

    state.debt_balances.insert(*caller, available - debt);
    state.debt_supply -= debt;
    state.position_mut(position)?.debt = U256::ZERO;

    if position != beneficiary {
        for (vault, amount) in &seized {
            state.position_mut(position)?.held.insert(*vault, U256::ZERO);
            let receiver = state.position_mut(beneficiary)?;
            if !receiver.is_attached(*vault) {
                receiver.vaults.push(*vault);
            }
            let held = receiver.held(*vault);
            receiver.held.insert(*vault, held + *amount);
        }
    }

    debug!(
        "liquidated {} (debt {}, value {}) into {}",
        position, debt, value, beneficiary
    );
    Ok(())
}
