//! Seeded campaigns: pick actions, run them, check invariants, keep the trace.

use crate::config::HarnessConfig;
use crate::driver::{CallStats, Harness, Outcome};
use crate::error::HarnessError;
use crate::sampler::bound_index;
use crate::seed::SeedStream;
use crate::setup::deploy;
use keel_protocol::Protocol;
use keel_types::record::sequence_digest;
use keel_types::{ActionKind, ActionRecord, CollateralProtocol, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{error, info};

/// Where a recorded run stopped, kept alongside the trace that led there.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailureNote {
    pub step: u64,
    pub error: String,
}

/// Everything needed to re-execute a run action for action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Trace {
    pub root_seed: U256,
    pub config: HarnessConfig,
    pub actions: Vec<ActionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureNote>,
}

impl Trace {
    pub fn new(root_seed: U256, config: HarnessConfig) -> Self {
        Self {
            root_seed,
            config,
            actions: Vec::new(),
            failure: None,
        }
    }

    pub fn digest(&self) -> [u8; 32] {
        sequence_digest(&self.actions)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), HarnessError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Trace(format!("encoding: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| HarnessError::Trace(format!("writing {}: {e}", path.display())))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Trace(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| HarnessError::Trace(format!("parsing {}: {e}", path.display())))
    }

    /// The last `n` recorded actions, oldest first.
    pub fn tail(&self, n: usize) -> &[ActionRecord] {
        let start = self.actions.len().saturating_sub(n);
        &self.actions[start..]
    }
}

/// A fatal condition together with the exact sequence that produced it.
#[derive(Debug)]
pub struct RunFailure {
    pub step: u64,
    pub error: HarnessError,
    pub trace: Trace,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed 0x{:x} failed at step {}: {}",
            self.trace.root_seed, self.step, self.error
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Summary of a run that finished with every invariant intact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunReport {
    pub root_seed: U256,
    pub steps: u64,
    pub digest: String,
    pub system_cr: U256,
    pub stats: CallStats,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "seed 0x{:x}: {} steps, digest {}", self.root_seed, self.steps, self.digest)?;
        if self.system_cr == U256::MAX {
            writeln!(f, "system collateralization: no debt")?;
        } else {
            writeln!(f, "system collateralization: {}", self.system_cr)?;
        }
        write!(f, "{}", self.stats)
    }
}

/// Seed of the stream that picks action kinds and entropy words. Kept apart
/// from the harness stream so a trace replays without the picker.
fn picker_root(root_seed: U256) -> U256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"keel-campaign");
    hasher.update(&root_seed.to_be_bytes::<32>());
    U256::from_be_bytes(*hasher.finalize().as_bytes())
}

pub struct Campaign<P> {
    harness: Harness<P>,
    picker: SeedStream,
    trace: Trace,
}

impl Campaign<Protocol> {
    /// Deploys the reference protocol described by `config`.
    pub fn new(config: HarnessConfig, root_seed: U256) -> Result<Self, HarnessError> {
        let (sut, liquidator) = deploy(&config)?;
        let harness = Harness::new(sut, config, root_seed, liquidator);
        Ok(Self::with_harness(harness, root_seed))
    }
}

impl<P: CollateralProtocol> Campaign<P> {
    pub fn with_harness(harness: Harness<P>, root_seed: U256) -> Self {
        let trace = Trace::new(root_seed, harness.config().clone());
        Self {
            harness,
            picker: SeedStream::new(picker_root(root_seed)),
            trace,
        }
    }

    pub fn harness(&self) -> &Harness<P> {
        &self.harness
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Picks the next action and applies it.
    pub fn step(&mut self) -> Result<Outcome, HarnessError> {
        let kind = ActionKind::ALL[bound_index(self.picker.draw(), ActionKind::ALL.len())];
        let entropy = self.picker.draw();
        self.apply(kind, entropy)
    }

    /// Records and runs one action, then checks invariants on the configured
    /// cadence.
    pub fn apply(&mut self, kind: ActionKind, entropy: U256) -> Result<Outcome, HarnessError> {
        let step = self.trace.actions.len() as u64;
        self.trace.actions.push(ActionRecord {
            step,
            kind,
            entropy,
        });
        let outcome = self.harness.execute(kind, entropy)?;
        if step % self.harness.config().check_every == 0 {
            self.harness.check_invariants()?;
        }
        Ok(outcome)
    }

    pub fn run(mut self, steps: u64) -> Result<RunReport, RunFailure> {
        info!("run 0x{:x}: starting {} steps", self.trace.root_seed, steps);
        for _ in 0..steps {
            if let Err(e) = self.step() {
                return Err(self.fail(e));
            }
        }
        self.finish()
    }

    /// Applies a fixed action sequence, as chosen by an outside engine or
    /// read back from a trace.
    pub fn run_actions<I>(mut self, actions: I) -> Result<RunReport, RunFailure>
    where
        I: IntoIterator<Item = (ActionKind, U256)>,
    {
        for (kind, entropy) in actions {
            if let Err(e) = self.apply(kind, entropy) {
                return Err(self.fail(e));
            }
        }
        self.finish()
    }

    /// Final invariant pass and report.
    pub fn finish(mut self) -> Result<RunReport, RunFailure> {
        if let Err(e) = self.harness.check_invariants() {
            return Err(self.fail(e));
        }
        let system_cr = self.harness.valuation().system_cr();
        let system_cr = match system_cr {
            Ok(ratio) => ratio,
            Err(e) => return Err(self.fail(e)),
        };
        let report = RunReport {
            root_seed: self.trace.root_seed,
            steps: self.trace.actions.len() as u64,
            digest: hex::encode(self.trace.digest()),
            system_cr,
            stats: self.harness.stats().clone(),
        };
        info!(
            "run 0x{:x}: {} steps, {} liquidations, invariants hold",
            report.root_seed,
            report.steps,
            report.stats.total_liquidations()
        );
        Ok(report)
    }

    fn fail(&mut self, error: HarnessError) -> RunFailure {
        let step = self.trace.actions.len().saturating_sub(1) as u64;
        error!("run 0x{:x}: step {} failed: {}", self.trace.root_seed, step, error);
        self.trace.failure = Some(FailureNote {
            step,
            error: error.to_string(),
        });
        RunFailure {
            step,
            error,
            trace: self.trace.clone(),
        }
    }
}

/// Re-executes `trace` against a freshly deployed reference protocol.
pub fn replay(trace: &Trace) -> Result<RunReport, RunFailure> {
    let campaign = match Campaign::new(trace.config.clone(), trace.root_seed) {
        Ok(campaign) => campaign,
        Err(error) => {
            return Err(RunFailure {
                step: 0,
                error,
                trace: trace.clone(),
            })
        }
    };
    campaign.run_actions(trace.actions.iter().map(|r| (r.kind, r.entropy)))
}
