use keel_harness::{replay, Campaign, HarnessConfig, HarnessError, RunFailure, Trace};
use keel_types::{ActionKind, ProtocolError, VaultSpec, U256};
use proptest::prelude::*;

fn report_failure(failure: &RunFailure) -> ! {
    eprintln!("\n=== CAMPAIGN FAILURE ===");
    eprintln!("{failure}");
    eprintln!("\nLast 10 actions:");
    for record in failure.trace.tail(10) {
        eprintln!("  {record}");
    }
    panic!("campaign failed, see above for the reproducing sequence");
}

fn run_seeds(config: &HarnessConfig, seeds: std::ops::Range<u64>, steps: u64) {
    for seed in seeds {
        let campaign = Campaign::new(config.clone(), U256::from(seed)).unwrap();
        if let Err(failure) = campaign.run(steps) {
            report_failure(&failure);
        }
    }
}

#[test]
fn default_population_holds_invariants() {
    run_seeds(&HarnessConfig::default(), 1..41, 300);
}

#[test]
fn tight_ratio_and_sparse_checks_hold_invariants() {
    let config = HarnessConfig {
        positions: 4,
        min_collateralization_ratio: U256::from(1_100_000_000_000_000_000u64),
        check_every: 7,
        price_drift_min_bps: 8_500,
        price_drift_max_bps: 10_500,
        ..HarnessConfig::default()
    };
    run_seeds(&config, 100..120, 400);
}

#[test]
#[ignore] // cargo test -p keel-harness -- --ignored
fn extended_campaigns() {
    run_seeds(&HarnessConfig::default(), 1..501, 2_000);
}

#[test]
fn campaigns_are_deterministic_and_replayable() {
    let mut campaign = Campaign::new(HarnessConfig::default(), U256::from(2024u64)).unwrap();
    for _ in 0..250 {
        campaign.step().unwrap();
    }
    let trace = campaign.trace().clone();
    let report = campaign.finish().unwrap();

    let again = Campaign::new(HarnessConfig::default(), U256::from(2024u64))
        .unwrap()
        .run(250)
        .unwrap();
    assert_eq!(report, again);

    let replayed = replay(&trace).unwrap();
    assert_eq!(report, replayed);
}

#[test]
fn different_seeds_take_different_paths() {
    let a = Campaign::new(HarnessConfig::default(), U256::from(1u64))
        .unwrap()
        .run(40)
        .unwrap();
    let b = Campaign::new(HarnessConfig::default(), U256::from(2u64))
        .unwrap()
        .run(40)
        .unwrap();
    assert_ne!(a.digest, b.digest);
}

/// An unfunded liquidator cannot cover the debt of the first unhealthy
/// position; halving prices guarantees one appears.
fn unfunded_liquidator_actions() -> (HarnessConfig, Vec<(ActionKind, U256)>) {
    let config = HarnessConfig {
        positions: 1,
        vaults: vec![VaultSpec::priced(18, 8, 1)],
        liquidator_funding: U256::ZERO,
        price_drift_min_bps: 5_000,
        price_drift_max_bps: 5_000,
        ..HarnessConfig::default()
    };
    let mut actions = vec![
        (ActionKind::AddVault, U256::from(1u64)),
        (ActionKind::Deposit, U256::from(2u64)),
    ];
    for i in 0..4u64 {
        actions.push((ActionKind::MintDebt, U256::from(10 + i)));
    }
    for i in 0..64u64 {
        actions.push((ActionKind::PriceDriftAndLiquidate, U256::from(100 + i)));
    }
    (config, actions)
}

#[test]
fn failing_run_reports_trace_and_replays_exactly() {
    let (config, actions) = unfunded_liquidator_actions();
    let failure = Campaign::new(config, U256::from(9u64))
        .unwrap()
        .run_actions(actions)
        .unwrap_err();

    assert!(matches!(
        failure.error,
        HarnessError::Protocol {
            action: "liquidate",
            source: ProtocolError::InsufficientBalance { .. },
        }
    ));
    assert_eq!(failure.trace.actions.len() as u64, failure.step + 1);
    let note = failure.trace.failure.clone().unwrap();
    assert_eq!(note.step, failure.step);

    // Through JSON, as the binary stores it.
    let json = serde_json::to_string(&failure.trace).unwrap();
    let stored: Trace = serde_json::from_str(&json).unwrap();
    let again = replay(&stored).unwrap_err();
    assert_eq!(again.step, failure.step);
    assert_eq!(again.error.to_string(), failure.error.to_string());
    assert_eq!(again.trace.digest(), failure.trace.digest());
}

#[test]
fn replay_rejects_invalid_config() {
    let mut trace = Trace::new(U256::ZERO, HarnessConfig::default());
    trace.config.check_every = 0;
    let failure = replay(&trace).unwrap_err();
    assert!(matches!(failure.error, HarnessError::Config(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn system_cr_is_idempotent(seed in any::<u64>(), steps in 0u64..60) {
        let mut campaign = Campaign::new(HarnessConfig::default(), U256::from(seed)).unwrap();
        for _ in 0..steps {
            campaign.step().unwrap();
        }
        let valuation = campaign.harness().valuation();
        let first = valuation.system_cr().unwrap();
        let second = valuation.system_cr().unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn invariants_hold_for_engine_chosen_sequences(
        seed in any::<u64>(),
        actions in prop::collection::vec((0u8..7, any::<[u64; 4]>()), 1..80),
    ) {
        let actions = actions
            .into_iter()
            .map(|(selector, words)| (ActionKind::from_selector(selector), U256::from_limbs(words)));
        let result = Campaign::new(HarnessConfig::default(), U256::from(seed))
            .unwrap()
            .run_actions(actions);
        if let Err(failure) = result {
            report_failure(&failure);
        }
    }
}
