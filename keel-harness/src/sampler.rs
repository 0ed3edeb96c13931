//! Maps raw draws into inclusive ranges so every generated parameter is legal
//! by construction.
//!
//! Draws already inside the range pass through unchanged, the smallest and
//! largest few raw values land on the endpoints, everything else wraps.

use keel_types::U256;

/// `lo <= result <= hi`. Panics if `lo > hi`: an inverted range is a harness
/// bug, not a runtime condition.
pub fn bound(raw: U256, lo: U256, hi: U256) -> U256 {
    assert!(lo <= hi, "bound: inverted range [{lo}, {hi}]");
    if raw >= lo && raw <= hi {
        return raw;
    }
    // [0, MAX] contains every raw value, so `size` cannot overflow here.
    let size = hi - lo + U256::from(1u64);
    let three = U256::from(3u64);

    if raw <= three && size > raw {
        return lo + raw;
    }
    let from_top = U256::MAX - raw;
    if raw >= U256::MAX - three && size > from_top {
        return hi - from_top;
    }

    if raw > hi {
        let rem = (raw - hi) % size;
        if rem.is_zero() {
            return hi;
        }
        lo + rem - U256::from(1u64)
    } else {
        let rem = (lo - raw) % size;
        if rem.is_zero() {
            return lo;
        }
        hi - rem + U256::from(1u64)
    }
}

pub fn bound_u64(raw: U256, lo: u64, hi: u64) -> u64 {
    bound(raw, U256::from(lo), U256::from(hi)).to::<u64>()
}

/// Uniform-ish index into a non-empty collection of `len` items.
pub fn bound_index(raw: U256, len: usize) -> usize {
    assert!(len > 0, "bound_index: empty collection");
    bound_u64(raw, 0, len as u64 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn degenerate_range_returns_lo() {
        for raw in [U256::ZERO, u(1), u(12345), U256::MAX] {
            assert_eq!(bound(raw, u(77), u(77)), u(77));
        }
    }

    #[test]
    fn in_range_values_pass_through() {
        assert_eq!(bound(u(15), u(10), u(20)), u(15));
        assert_eq!(bound(u(10), u(10), u(20)), u(10));
        assert_eq!(bound(u(20), u(10), u(20)), u(20));
    }

    #[test]
    fn small_and_huge_raw_values_hit_endpoints() {
        assert_eq!(bound(U256::ZERO, u(100), u(200)), u(100));
        assert_eq!(bound(u(3), u(100), u(200)), u(103));
        assert_eq!(bound(U256::MAX, u(100), u(200)), u(200));
        assert_eq!(bound(U256::MAX - u(1), u(100), u(200)), u(199));
    }

    #[test]
    fn full_range_is_identity() {
        assert_eq!(bound(U256::MAX, U256::ZERO, U256::MAX), U256::MAX);
        assert_eq!(bound(u(5), U256::ZERO, U256::MAX), u(5));
    }

    #[test]
    #[should_panic(expected = "inverted range")]
    fn inverted_range_panics() {
        bound(u(1), u(2), u(1));
    }

    #[test]
    fn index_covers_every_slot() {
        let mut seen = [false; 3];
        for raw in 0..64u64 {
            seen[bound_index(u(raw), 3)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    proptest! {
        #[test]
        fn result_is_always_in_range(raw in any::<[u64; 4]>(), a in any::<u64>(), b in any::<u64>()) {
            let raw = U256::from_limbs(raw);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let x = bound(raw, u(lo), u(hi));
            prop_assert!(x >= u(lo) && x <= u(hi));
        }

        #[test]
        fn bound_is_deterministic(raw in any::<[u64; 4]>(), lo in 0u64..1_000, span in 0u64..1_000) {
            let raw = U256::from_limbs(raw);
            prop_assert_eq!(bound(raw, u(lo), u(lo + span)), bound(raw, u(lo), u(lo + span)));
        }

        #[test]
        fn both_endpoints_are_reachable(lo in 0u64..1_000_000, span in 1u64..1_000_000) {
            let hi = lo + span;
            prop_assert_eq!(bound(U256::ZERO, u(lo), u(hi)), u(lo));
            prop_assert_eq!(bound(U256::MAX, u(lo), u(hi)), u(hi));
        }
    }
}
