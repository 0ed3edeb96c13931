use keel_harness::setup::deploy;
use keel_harness::{Harness, HarnessConfig, HarnessError, Outcome, INFINITE_RATIO};
use keel_protocol::Protocol;
use keel_types::{CollateralProtocol, PositionId, ProtocolError, VaultId, VaultSpec, U256, WAD};

fn wad(units: u64) -> U256 {
    U256::from(units) * WAD
}

/// One $1 18-decimal vault priced by an 8-decimal oracle, no random drift.
fn single_vault_config(positions: u64) -> HarnessConfig {
    HarnessConfig {
        positions,
        vaults: vec![VaultSpec::priced(18, 8, 1)],
        price_drift_min_bps: 10_000,
        price_drift_max_bps: 10_000,
        ..HarnessConfig::default()
    }
}

fn harness(config: HarnessConfig) -> Harness<Protocol> {
    let (sut, liquidator) = deploy(&config).unwrap();
    Harness::new(sut, config, U256::from(0xC0FFEEu64), liquidator)
}

/// Attaches vault#0 to `position`, deposits 100 tokens and mints the maximum
/// safe debt. Returns the debt minted.
fn leverage_fully(h: &mut Harness<Protocol>, position: PositionId) -> U256 {
    h.add_vault_to(position, VaultId(0)).unwrap();
    h.deposit_into(position, VaultId(0), wad(100)).unwrap();
    let capacity = h.valuation().position_debt_capacity(position).unwrap();
    assert_eq!(h.mint_into(position, capacity).unwrap(), Outcome::Executed);
    capacity
}

#[test]
fn scenario_a_fresh_system_reports_infinite_ratio() {
    let h = harness(HarnessConfig::default());
    let valuation = h.valuation();
    assert_eq!(valuation.system_cr().unwrap(), INFINITE_RATIO);
    assert_eq!(valuation.system_cr().unwrap(), valuation.system_cr().unwrap());
    assert_eq!(
        h.sut().collateralization_ratio(PositionId(0)).unwrap(),
        INFINITE_RATIO
    );
    h.check_invariants().unwrap();
}

#[test]
fn scenario_b_max_mint_lands_on_minimum_ratio() {
    let mut h = harness(single_vault_config(1));
    let position = PositionId(0);
    let debt = leverage_fully(&mut h, position);

    // 100 / 1.5 = 66.666.. truncated.
    assert_eq!(debt, U256::from(66_666_666_666_666_666_666u128));
    let ratio = h.sut().collateralization_ratio(position).unwrap();
    let minimum = h.sut().minimum_collateralization_ratio();
    assert!(ratio >= minimum);
    assert!(ratio - minimum <= U256::from(1u64));

    // Nothing left to mint. Truncating the debt leaves required value at
    // 99.999..999, so at most one wei of collateral is still free.
    let capacity = h.valuation().position_debt_capacity(position).unwrap();
    assert_eq!(capacity, debt);
    let spare = h.valuation().max_withdrawable(position, VaultId(0)).unwrap();
    assert!(spare <= U256::from(1u64));

    assert_eq!(h.withdraw_from(position, VaultId(0), spare).unwrap(), Outcome::Executed);
    assert!(h.sut().collateralization_ratio(position).unwrap() >= minimum);
    assert_eq!(
        h.valuation().max_withdrawable(position, VaultId(0)).unwrap(),
        U256::ZERO
    );
    h.check_invariants().unwrap();
}

#[test]
fn scenario_c_price_drop_leads_to_liquidation() {
    let mut h = harness(single_vault_config(2));
    let position = PositionId(0);
    let debt = leverage_fully(&mut h, position);

    h.sut_mut()
        .set_price(VaultId(0), U256::from(80_000_000u64))
        .unwrap();
    let ratio = h.sut().collateralization_ratio(position).unwrap();
    assert!(ratio < h.sut().minimum_collateralization_ratio());
    assert!(ratio >= WAD);

    let supply_before = h.sut().total_debt_supply();
    assert_eq!(supply_before, debt);
    assert_eq!(h.price_drift_and_liquidate().unwrap(), Outcome::Liquidated(1));
    assert_eq!(h.sut().minted_debt(position).unwrap(), U256::ZERO);
    assert_eq!(h.sut().total_debt_supply(), U256::ZERO);
    assert_eq!(
        h.sut().debt_balance_of(h.liquidator()),
        HarnessConfig::default().liquidator_funding - debt
    );
    h.check_invariants().unwrap();
}

#[test]
fn scenario_c_beneficiary_gains_at_least_the_covered_debt() {
    let mut h = harness(single_vault_config(2));
    let (position, beneficiary) = (PositionId(0), PositionId(1));
    let debt = leverage_fully(&mut h, position);
    h.sut_mut()
        .set_price(VaultId(0), U256::from(80_000_000u64))
        .unwrap();

    let before = h.valuation().worth(beneficiary).unwrap();
    h.liquidate_into(position, beneficiary).unwrap();
    let after = h.valuation().worth(beneficiary).unwrap();

    assert!(after.gained_at_least(&before, debt));
    assert_eq!(after.collateral, wad(80));
    assert_eq!(h.sut().minted_debt(position).unwrap(), U256::ZERO);

    // The protocol attached the vault to the beneficiary; the mirror has not
    // seen it yet and stays a subset.
    assert_eq!(h.sut().list_vaults(beneficiary, 0).unwrap(), VaultId(0));
    assert!(!h.membership().is_attached(beneficiary, VaultId(0)));
    h.check_invariants().unwrap();

    // Adding it later is accepted and brings the mirror in line.
    assert_eq!(h.add_vault_to(beneficiary, VaultId(0)).unwrap(), Outcome::Executed);
    assert!(h.membership().is_attached(beneficiary, VaultId(0)));
    h.check_invariants().unwrap();
}

#[test]
fn scenario_d_remove_with_balance_is_tolerated() {
    let mut h = harness(single_vault_config(1));
    let position = PositionId(0);
    h.add_vault_to(position, VaultId(0)).unwrap();
    h.deposit_into(position, VaultId(0), U256::from(5u64)).unwrap();

    assert_eq!(
        h.remove_vault_from(position, VaultId(0)).unwrap(),
        Outcome::Tolerated
    );
    assert_eq!(h.membership().attached(position), &[VaultId(0)]);
    assert_eq!(h.sut().list_vaults(position, 0).unwrap(), VaultId(0));
    h.check_invariants().unwrap();

    // Once empty, the same removal goes through.
    h.withdraw_from(position, VaultId(0), U256::from(5u64)).unwrap();
    assert_eq!(
        h.remove_vault_from(position, VaultId(0)).unwrap(),
        Outcome::Executed
    );
    assert!(h.membership().attached(position).is_empty());
    assert!(h.sut().list_vaults(position, 0).is_err());
    h.check_invariants().unwrap();
}

#[test]
fn other_remove_failures_propagate() {
    let mut h = harness(single_vault_config(1));
    let err = h.remove_vault_from(PositionId(0), VaultId(0)).unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Protocol {
            action: "remove_vault",
            source: ProtocolError::NotAttached { .. },
        }
    ));
}

#[test]
fn capacity_below_debt_is_model_divergence() {
    let mut h = harness(single_vault_config(1));
    let position = PositionId(0);
    leverage_fully(&mut h, position);
    h.sut_mut()
        .set_price(VaultId(0), U256::from(50_000_000u64))
        .unwrap();

    let err = h.mint_debt().unwrap_err();
    assert!(matches!(err, HarnessError::ModelDivergence { .. }));
}

#[test]
fn withdraw_bound_keeps_position_healthy() {
    let mut h = harness(single_vault_config(1));
    let position = PositionId(0);
    h.add_vault_to(position, VaultId(0)).unwrap();
    h.deposit_into(position, VaultId(0), wad(150)).unwrap();
    h.mint_into(position, wad(50)).unwrap();

    let max = h.valuation().max_withdrawable(position, VaultId(0)).unwrap();
    assert_eq!(max, wad(75));
    h.withdraw_from(position, VaultId(0), max).unwrap();
    assert_eq!(
        h.sut().collateralization_ratio(position).unwrap(),
        h.sut().minimum_collateralization_ratio()
    );
    h.check_invariants().unwrap();
}

#[test]
fn withdraw_bound_rounds_for_odd_decimals() {
    // $30 000 per 8-decimal unit priced by an 18-decimal oracle.
    let config = HarnessConfig {
        positions: 1,
        vaults: vec![VaultSpec::priced(8, 18, 30_000), VaultSpec::priced(6, 8, 1)],
        ..HarnessConfig::default()
    };
    let mut h = harness(config);
    let position = PositionId(0);
    h.add_vault_to(position, VaultId(0)).unwrap();
    h.add_vault_to(position, VaultId(1)).unwrap();
    h.deposit_into(position, VaultId(0), U256::from(333_333u64)).unwrap();
    h.deposit_into(position, VaultId(1), U256::from(7_777_777u64)).unwrap();
    let capacity = h.valuation().position_debt_capacity(position).unwrap();
    h.mint_into(position, capacity / U256::from(3u64)).unwrap();

    for vault in [VaultId(0), VaultId(1)] {
        let max = h.valuation().max_withdrawable(position, vault).unwrap();
        h.withdraw_from(position, vault, max).unwrap();
        h.check_invariants().unwrap();
    }
    let ratio = h.sut().collateralization_ratio(position).unwrap();
    assert!(ratio >= h.sut().minimum_collateralization_ratio());
}
