//! Local mirror of which vaults each position has attached.
//!
//! The protocol only exposes indexed lookups, so the harness keeps its own
//! ordered copy. The mirror is updated strictly after a successful protocol
//! call and is always a subset of the protocol's record (liquidations may
//! attach vaults on the protocol side that the mirror only learns about via a
//! later `add`).

use crate::sampler::bound_index;
use keel_types::{PositionId, VaultId, U256};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct VaultMembership {
    /// Every vault, in registration order.
    registry: Vec<VaultId>,
    max_per_position: usize,
    attached: BTreeMap<PositionId, Vec<VaultId>>,
}

impl VaultMembership {
    pub fn new(registry: Vec<VaultId>, max_per_position: usize) -> Self {
        Self {
            registry,
            max_per_position,
            attached: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &[VaultId] {
        &self.registry
    }

    pub fn max_per_position(&self) -> usize {
        self.max_per_position
    }

    /// Attached vaults of `position` in attach order.
    pub fn attached(&self, position: PositionId) -> &[VaultId] {
        self.attached
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_attached(&self, position: PositionId, vault: VaultId) -> bool {
        self.attached(position).contains(&vault)
    }

    pub fn len(&self, position: PositionId) -> usize {
        self.attached(position).len()
    }

    pub fn is_full(&self, position: PositionId) -> bool {
        self.len(position) >= self.max_per_position
    }

    /// Record a successful protocol `add`.
    pub fn attach(&mut self, position: PositionId, vault: VaultId) {
        assert!(
            self.registry.contains(&vault),
            "attach: {vault} is not a registered vault"
        );
        let list = self.attached.entry(position).or_default();
        assert!(
            !list.contains(&vault),
            "attach: {vault} already attached to {position}"
        );
        assert!(
            list.len() < self.max_per_position,
            "attach: {position} already holds {} vaults",
            list.len()
        );
        list.push(vault);
    }

    /// Record a successful protocol `remove`.
    pub fn detach(&mut self, position: PositionId, vault: VaultId) {
        let list = self.attached.entry(position).or_default();
        let idx = list
            .iter()
            .position(|v| *v == vault)
            .unwrap_or_else(|| panic!("detach: {vault} is not attached to {position}"));
        list.remove(idx);
    }

    /// A vault not yet attached to `position`, chosen among the candidates in
    /// registration order. `None` once every vault is attached.
    pub fn pick_unattached(&self, position: PositionId, draw: U256) -> Option<VaultId> {
        let candidates: Vec<VaultId> = self
            .registry
            .iter()
            .copied()
            .filter(|v| !self.is_attached(position, *v))
            .collect();
        pick(&candidates, draw)
    }

    /// An attached vault of `position`, chosen in registration order.
    pub fn pick_attached(&self, position: PositionId, draw: U256) -> Option<VaultId> {
        let candidates: Vec<VaultId> = self
            .registry
            .iter()
            .copied()
            .filter(|v| self.is_attached(position, *v))
            .collect();
        pick(&candidates, draw)
    }
}

fn pick(candidates: &[VaultId], draw: U256) -> Option<VaultId> {
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[bound_index(draw, candidates.len())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership() -> VaultMembership {
        VaultMembership::new(vec![VaultId(0), VaultId(1), VaultId(2)], 3)
    }

    #[test]
    fn pick_unattached_is_none_exactly_when_full() {
        let mut m = membership();
        let p = PositionId(4);
        for v in [VaultId(2), VaultId(0)] {
            assert!(m.pick_unattached(p, U256::ZERO).is_some());
            m.attach(p, v);
        }
        assert_eq!(m.pick_unattached(p, U256::ZERO), Some(VaultId(1)));
        assert_eq!(m.pick_unattached(p, U256::MAX), Some(VaultId(1)));
        m.attach(p, VaultId(1));
        assert_eq!(m.pick_unattached(p, U256::from(17u64)), None);
        assert!(m.is_full(p));
    }

    #[test]
    fn pick_attached_is_none_for_fresh_position() {
        let m = membership();
        assert_eq!(m.pick_attached(PositionId(0), U256::from(3u64)), None);
    }

    #[test]
    fn picks_follow_registration_order() {
        let mut m = membership();
        let p = PositionId(1);
        m.attach(p, VaultId(2));
        m.attach(p, VaultId(0));
        // Candidates are [vault#0, vault#2] regardless of attach order.
        assert_eq!(m.pick_attached(p, U256::ZERO), Some(VaultId(0)));
        assert_eq!(m.pick_attached(p, U256::from(1u64)), Some(VaultId(2)));
        assert_eq!(m.attached(p), &[VaultId(2), VaultId(0)]);
    }

    #[test]
    fn detach_keeps_remaining_order() {
        let mut m = membership();
        let p = PositionId(0);
        for v in [VaultId(0), VaultId(1), VaultId(2)] {
            m.attach(p, v);
        }
        m.detach(p, VaultId(1));
        assert_eq!(m.attached(p), &[VaultId(0), VaultId(2)]);
        assert!(!m.is_attached(p, VaultId(1)));
        assert_eq!(m.len(p), 2);
    }

    #[test]
    fn positions_are_independent() {
        let mut m = membership();
        m.attach(PositionId(0), VaultId(1));
        assert!(m.is_attached(PositionId(0), VaultId(1)));
        assert!(!m.is_attached(PositionId(1), VaultId(1)));
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn duplicate_attach_panics() {
        let mut m = membership();
        m.attach(PositionId(0), VaultId(0));
        m.attach(PositionId(0), VaultId(0));
    }

    #[test]
    #[should_panic(expected = "is not attached")]
    fn detach_of_non_member_panics() {
        let mut m = membership();
        m.detach(PositionId(0), VaultId(0));
    }
}
