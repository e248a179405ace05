//! Mulberry32
//!
//! One 32-bit word of state, replicated in `StateData::seed`. Peers compare
//! it directly and a bootstrap snapshot carries it for free.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::fixed::Fixed;

const GOLDEN: u32 = 0x6d2b_79f5;

/// Replicated random stream.
///
/// ```
/// use lockstep_arena::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(0);
/// assert_eq!(rng.next_u32(), 1144304738);
/// assert_eq!(rng.state(), 1831565813);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u32,
}

impl DeterministicRng {
    /// The state is the seed: `new(s).state() == s`.
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance and return the next word.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(GOLDEN);
        let z = self.state;
        let z = (z ^ (z >> 15)).wrapping_mul(z | 1);
        let z = z ^ z.wrapping_add((z ^ (z >> 7)).wrapping_mul(z | 61));
        z ^ (z >> 14)
    }

    /// Uniform in `[0, bound)`; `0` when `bound` is `0`.
    #[inline]
    pub fn next_int(&mut self, bound: u32) -> u32 {
        self.scaled(bound as u64) as u32
    }

    /// Uniform in `[lo, hi]`.
    pub fn next_int_range(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        let span = (hi as i64 - lo as i64 + 1) as u64;
        (lo as i64 + self.scaled(span) as i64) as i32
    }

    /// Uniform fixed-point value in `[lo, hi)`.
    pub fn next_fixed_range(&mut self, lo: Fixed, hi: Fixed) -> Fixed {
        if hi <= lo {
            return lo;
        }
        let span = (hi as i64 - lo as i64) as u64;
        (lo as i64 + self.scaled(span) as i64) as Fixed
    }

    /// Current word; the value stored as `StateData::seed`.
    #[inline]
    pub fn state(&self) -> u32 {
        self.state
    }

    // Multiply-shift into [0, span) without a modulo.
    #[inline]
    fn scaled(&mut self, span: u64) -> u64 {
        if span == 0 {
            return 0;
        }
        (self.next_u32() as u64 * span) >> 32
    }
}

/// Map seed for a room label.
///
/// Peers that agree on the label agree on the map without exchanging it;
/// the host still ships the seed in the bootstrap.
pub fn derive_map_seed(room: &[u8]) -> u32 {
    let digest = Sha256::new()
        .chain_update(b"LOCKSTEP_ARENA_MAP_V1")
        .chain_update(room)
        .finalize();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    #[test]
    fn test_mulberry_reference_values() {
        // Changing these desyncs peers on different builds
        let mut rng = DeterministicRng::new(0);
        let seen: Vec<(u32, u32)> = (0..3).map(|_| (rng.next_u32(), rng.state())).collect();
        assert_eq!(
            seen,
            vec![(1144304738, 1831565813), (1416247, 3663131626), (958946056, 1199730143)]
        );

        let mut rng = DeterministicRng::new(42);
        assert_eq!(rng.next_u32(), 2581720956);
        assert_eq!(rng.state(), 1831565855);
    }

    #[test]
    fn test_resume_from_state() {
        let mut rng = DeterministicRng::new(5555);
        for _ in 0..50 {
            rng.next_u32();
        }
        let mut copy = DeterministicRng::new(rng.state());
        for _ in 0..10 {
            assert_eq!(rng.next_u32(), copy.next_u32());
        }
    }

    #[test]
    fn test_bounds() {
        let mut rng = DeterministicRng::new(1234);
        let max = to_fixed(100.0);
        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
            assert!((-10..=10).contains(&rng.next_int_range(-10, 10)));
            let f = rng.next_fixed_range(-max, max);
            assert!(f >= -max && f < max);
        }
        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
        assert_eq!(rng.next_int_range(5, 5), 5);
        assert_eq!(rng.next_fixed_range(max, max), max);
    }

    #[test]
    fn test_full_int_range() {
        let mut rng = DeterministicRng::new(3);
        for _ in 0..100 {
            rng.next_int_range(i32::MIN, i32::MAX);
        }
    }

    #[test]
    fn test_derive_map_seed() {
        assert_eq!(derive_map_seed(b"room-a"), derive_map_seed(b"room-a"));
        assert_ne!(derive_map_seed(b"room-a"), derive_map_seed(b"room-b"));
    }
}
