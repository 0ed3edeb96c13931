use crate::action::ActionKind;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One executed harness action: enough to replay it from the same root seed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub step: u64,
    pub kind: ActionKind,
    pub entropy: U256,
}

impl ActionRecord {
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 1 + 32);
        bytes.extend_from_slice(&self.step.to_be_bytes());
        bytes.push(self.kind.index() as u8);
        bytes.extend_from_slice(&self.entropy.to_be_bytes::<32>());
        bytes
    }

    pub fn id(&self) -> [u8; 32] {
        use blake3::Hasher;
        let mut hasher = Hasher::new();
        hasher.update(&self.signing_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} entropy=0x{}",
            self.step,
            self.kind,
            hex::encode(self.entropy.to_be_bytes::<32>())
        )
    }
}

/// Rolling digest over a sequence of records; two runs that executed the same
/// actions in the same order share a digest.
pub fn sequence_digest(records: &[ActionRecord]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for record in records {
        hasher.update(&record.id());
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_changes_with_any_field() {
        let base = ActionRecord {
            step: 3,
            kind: ActionKind::Deposit,
            entropy: U256::from(42u64),
        };
        let mut other = base.clone();
        other.step = 4;
        assert_ne!(base.id(), other.id());

        let mut other = base.clone();
        other.kind = ActionKind::Withdraw;
        assert_ne!(base.id(), other.id());

        let mut other = base.clone();
        other.entropy = U256::from(43u64);
        assert_ne!(base.id(), other.id());
    }

    #[test]
    fn digest_is_order_sensitive() {
        let a = ActionRecord { step: 0, kind: ActionKind::MintDebt, entropy: U256::from(1u64) };
        let b = ActionRecord { step: 1, kind: ActionKind::BurnDebt, entropy: U256::from(2u64) };
        assert_eq!(sequence_digest(&[a.clone(), b.clone()]), sequence_digest(&[a.clone(), b.clone()]));
        assert_ne!(sequence_digest(&[a.clone(), b.clone()]), sequence_digest(&[b, a]));
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = ActionRecord {
            step: 9,
            kind: ActionKind::PriceDriftAndLiquidate,
            entropy: U256::MAX,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ActionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
