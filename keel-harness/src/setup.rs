//! Builds the reference protocol with the fixed initial population.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, ProtocolResultExt};
use keel_protocol::{Protocol, ProtocolParams};
use keel_types::state::principal;
use keel_types::{CollateralProtocol, Principal};
use tracing::info;

pub const LIQUIDATOR_TAG: u64 = 1;
const OWNER_TAG_BASE: u64 = 1_000;

pub fn owner(index: u64) -> Principal {
    principal(OWNER_TAG_BASE + index)
}

pub fn liquidator() -> Principal {
    principal(LIQUIDATOR_TAG)
}

/// Registers the configured vaults, opens one position per owner and funds
/// the liquidator. Returns the protocol and the liquidator principal.
pub fn deploy(config: &HarnessConfig) -> Result<(Protocol, Principal), HarnessError> {
    config.validate()?;
    let mut sut = Protocol::new(ProtocolParams {
        min_collateralization_ratio: config.min_collateralization_ratio,
        max_vaults_per_position: config.max_vaults_per_position,
    });
    for spec in &config.vaults {
        sut.register_vault(spec).during("setup")?;
    }
    for i in 0..config.positions {
        sut.open_position(owner(i));
    }
    let liquidator = liquidator();
    sut.fund_debt_token(&liquidator, config.liquidator_funding);

    info!(
        "deployed {} vaults and {} positions, liquidator funded with {}",
        config.vaults.len(),
        sut.total_positions(),
        config.liquidator_funding
    );
    Ok((sut, liquidator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::{PositionId, U256};

    #[test]
    fn deploys_default_population() {
        let config = HarnessConfig::default();
        let (sut, liquidator) = deploy(&config).unwrap();
        assert_eq!(sut.total_positions(), 10);
        assert_eq!(sut.vaults().len(), 3);
        assert_eq!(sut.owner_of(PositionId(3)).unwrap(), owner(3));
        assert_eq!(sut.debt_balance_of(&liquidator), config.liquidator_funding);
        // Funding the liquidator does not mint supply.
        assert_eq!(sut.total_debt_supply(), U256::ZERO);
    }

    #[test]
    fn owners_are_distinct_from_liquidator() {
        let owners: Vec<_> = (0..10).map(owner).collect();
        assert!(!owners.contains(&liquidator()));
        let unique: std::collections::HashSet<_> = owners.iter().collect();
        assert_eq!(unique.len(), owners.len());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = HarnessConfig {
            vaults: vec![],
            ..HarnessConfig::default()
        };
        assert!(matches!(deploy(&config), Err(HarnessError::Config(_))));
    }
}
