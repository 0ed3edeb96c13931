//! Stateful, invariant-driven fuzz harness for multi-collateral debt protocols.
//!
//! The harness drives any [`CollateralProtocol`](keel_types::CollateralProtocol)
//! with seeded action sequences whose parameters are legal by construction,
//! and checks the protocol's global invariants between actions.

pub mod campaign;
pub mod config;
pub mod driver;
pub mod error;
pub mod invariants;
pub mod membership;
pub mod sampler;
pub mod seed;
pub mod setup;
pub mod valuation;

pub use campaign::{replay, Campaign, FailureNote, RunFailure, RunReport, Trace};
pub use config::HarnessConfig;
pub use driver::{CallStats, Harness, KindStats, Outcome};
pub use error::HarnessError;
pub use invariants::{InvariantChecker, InvariantViolation};
pub use membership::VaultMembership;
pub use seed::{next_seed, SeedStream};
pub use valuation::{Rounding, Valuation, VaultQuote, Worth, INFINITE_RATIO};
