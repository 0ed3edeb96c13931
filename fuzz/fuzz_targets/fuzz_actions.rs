#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use keel_harness::{Campaign, HarnessConfig};
use keel_types::{ActionKind, U256};

#[derive(Arbitrary, Debug)]
struct Step {
    selector: u8,
    entropy: [u64; 4],
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    root_seed: u64,
    positions: u8,
    steps: Vec<Step>,
}

fuzz_target!(|data: FuzzInput| {
    let config = HarnessConfig {
        positions: 1 + (data.positions % 10) as u64,
        ..HarnessConfig::default()
    };
    let Ok(campaign) = Campaign::new(config, U256::from(data.root_seed)) else {
        return;
    };

    // Cap sequence length so single inputs stay fast.
    let actions = data
        .steps
        .iter()
        .take(256)
        .map(|s| (ActionKind::from_selector(s.selector), U256::from_limbs(s.entropy)));

    if let Err(failure) = campaign.run_actions(actions) {
        for record in failure.trace.tail(10) {
            eprintln!("  {record}");
        }
        panic!("{failure}");
    }
});
