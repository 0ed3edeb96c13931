use crate::invariants::InvariantViolation;
use crate::valuation::Worth;
use keel_types::{PositionId, ProtocolError, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// A protocol call failed where no failure is tolerated.
    #[error("{action}: unexpected protocol failure: {source}")]
    Protocol {
        action: &'static str,
        #[source]
        source: ProtocolError,
    },
    /// The independent valuation no longer agrees with the protocol's books.
    #[error("model divergence on {position}: debt capacity {capacity} below recorded debt {debt}")]
    ModelDivergence {
        position: PositionId,
        capacity: U256,
        debt: U256,
    },
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("the protocol has no positions to act on")]
    NoSuchPosition,
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error(
        "liquidation of {position} (ratio {ratio}) cost beneficiary {beneficiary}: \
         worth went from {before} to {after}, covered debt {covered}"
    )]
    LiquidationLoss {
        position: PositionId,
        beneficiary: PositionId,
        ratio: U256,
        covered: U256,
        before: Worth,
        after: Worth,
    },
    #[error("mint on {position} raised its ratio from {before} to {after}")]
    CrIncreasedOnMint {
        position: PositionId,
        before: U256,
        after: U256,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("trace file: {0}")]
    Trace(String),
}

impl HarnessError {
    pub fn is_invariant(&self) -> bool {
        matches!(self, HarnessError::Invariant(_))
    }
}

/// Tags a protocol result with the action that issued the call.
pub trait ProtocolResultExt<T> {
    fn during(self, action: &'static str) -> Result<T, HarnessError>;
}

impl<T> ProtocolResultExt<T> for Result<T, ProtocolError> {
    fn during(self, action: &'static str) -> Result<T, HarnessError> {
        self.map_err(|source| HarnessError::Protocol { action, source })
    }
}
