pub mod debt;
pub mod liquidate;
pub mod vaults;
