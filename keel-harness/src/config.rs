use crate::error::HarnessError;
use keel_types::{pow10, VaultSpec, MAX_SCALE_DECIMALS, U256, WAD};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to build a harness: the initial population, protocol
/// parameters and the ranges the action generators draw from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub positions: u64,
    /// Registered in order; `VaultId(i)` is `vaults[i]`.
    pub vaults: Vec<VaultSpec>,
    pub max_vaults_per_position: usize,
    /// WAD-scaled.
    pub min_collateralization_ratio: U256,
    /// WAD-scaled lower bound for the system-wide ratio once debt exists.
    pub system_cr_floor: U256,
    /// Largest single deposit, in whole tokens of the vault's asset.
    pub deposit_cap_units: u64,
    /// Debt-token balance handed to the liquidator at setup.
    pub liquidator_funding: U256,
    /// Run the invariant checker after every `check_every` actions.
    pub check_every: u64,
    pub price_drift_min_bps: u64,
    pub price_drift_max_bps: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            positions: 10,
            vaults: vec![
                VaultSpec::priced(18, 8, 1),
                VaultSpec::priced(6, 8, 1),
                VaultSpec::priced(8, 18, 30_000),
            ],
            max_vaults_per_position: 3,
            min_collateralization_ratio: WAD * U256::from(3u64) / U256::from(2u64),
            system_cr_floor: WAD,
            deposit_cap_units: 1_000_000_000,
            liquidator_funding: U256::from(10u64).pow(U256::from(40u64)),
            check_every: 1,
            price_drift_min_bps: 9_000,
            price_drift_max_bps: 11_000,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.positions == 0 {
            return Err(HarnessError::Config("at least one position is required".into()));
        }
        if self.vaults.is_empty() {
            return Err(HarnessError::Config("at least one vault is required".into()));
        }
        for (i, vault) in self.vaults.iter().enumerate() {
            if vault.initial_price.is_zero() {
                return Err(HarnessError::Config(format!("vault {i} has a zero price")));
            }
            self.check_scale(i, vault)?;
        }
        if self.min_collateralization_ratio < WAD {
            return Err(HarnessError::Config(format!(
                "minimum collateralization ratio {} is below 100%",
                self.min_collateralization_ratio
            )));
        }
        if self.system_cr_floor > self.min_collateralization_ratio {
            return Err(HarnessError::Config(format!(
                "system floor {} exceeds the minimum ratio {}",
                self.system_cr_floor, self.min_collateralization_ratio
            )));
        }
        if self.price_drift_min_bps == 0 || self.price_drift_min_bps > self.price_drift_max_bps {
            return Err(HarnessError::Config(format!(
                "bad price drift range [{}, {}] bps",
                self.price_drift_min_bps, self.price_drift_max_bps
            )));
        }
        if self.check_every == 0 {
            return Err(HarnessError::Config("check_every must be positive".into()));
        }
        // Liquidation attaches every seized vault to the beneficiary.
        if self.max_vaults_per_position < self.vaults.len() {
            return Err(HarnessError::Config(format!(
                "max_vaults_per_position {} is below the vault count {}",
                self.max_vaults_per_position,
                self.vaults.len()
            )));
        }
        Ok(())
    }

    /// A full deposit at the initial price must be valued without overflow.
    fn check_scale(&self, i: usize, vault: &VaultSpec) -> Result<(), HarnessError> {
        if vault.scale_decimals() > MAX_SCALE_DECIMALS {
            return Err(HarnessError::Config(format!(
                "vault {i}: {} oracle plus asset decimals exceed {MAX_SCALE_DECIMALS}",
                vault.scale_decimals()
            )));
        }
        pow10(vault.asset_decimals as u32)
            .and_then(|unit| unit.checked_mul(U256::from(self.deposit_cap_units)))
            .and_then(|cap| cap.checked_mul(vault.initial_price))
            .and_then(|v| v.checked_mul(WAD))
            .map(|_| ())
            .ok_or_else(|| {
                HarnessError::Config(format!(
                    "vault {i}: a deposit of {} tokens cannot be valued",
                    self.deposit_cap_units
                ))
            })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("reading {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| HarnessError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }
}
