//! Per-scope deterministic random stream.
//!
//! Every scope owns exactly one [`ScopeRng`]. Command execution and scope
//! ticks draw from it, and the drift monitor samples its position after
//! each tick and command. Two peers that executed the same commands in
//! the same order observe identical [`RngState`]s.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::id::ScopeId;

/// Golden-ratio increment used to spread scope discriminants across seeds.
const SCOPE_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Observable position of a random stream: the seed it started from and
/// how many 32-bit words have been consumed since.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RngState {
    /// Seed the stream was created from.
    pub seed: u64,
    /// Number of 32-bit words consumed.
    pub word_pos: u128,
}

impl RngState {
    /// Fold the state into a single 64-bit sample for drift comparison.
    pub fn fold(&self) -> u64 {
        let lo = self.word_pos as u64;
        let hi = (self.word_pos >> 64) as u64;
        self.seed ^ lo.rotate_left(17) ^ hi.rotate_left(41)
    }
}

/// Deterministic random stream owned by one scope.
///
/// Backed by ChaCha8 so the stream is identical on every platform.
///
/// # Examples
///
/// ```
/// use tandem_core::{ScopeId, ScopeRng};
///
/// let mut a = ScopeRng::for_scope(42, ScopeId::Map(0));
/// let mut b = ScopeRng::for_scope(42, ScopeId::Map(0));
/// assert_eq!(a.next_u32(), b.next_u32());
/// assert_eq!(a.state(), b.state());
/// ```
#[derive(Clone, Debug)]
pub struct ScopeRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl ScopeRng {
    /// Create a stream from a raw seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create the stream for `scope`, derived from the session-wide base seed.
    ///
    /// Distinct scopes get distinct streams from the same base seed.
    pub fn for_scope(base_seed: u64, scope: ScopeId) -> Self {
        let discriminant = (scope.to_wire() as i64).wrapping_add(2) as u64;
        Self::new(base_seed ^ discriminant.wrapping_mul(SCOPE_SEED_MIX))
    }

    /// Draw a uniformly distributed `u32`.
    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Draw a uniformly distributed `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Draw an integer in `lo..hi`. Returns `lo` when the range is empty.
    pub fn range_u32(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo) as u64;
        lo + ((self.next_u32() as u64 * span) >> 32) as u32
    }

    /// Draw a float in `[0, 1)` with 24 bits of precision.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Return `true` with probability `p` (clamped to `[0, 1]`).
    pub fn chance(&mut self, p: f32) -> bool {
        self.next_f32() < p.clamp(0.0, 1.0)
    }

    /// Current stream position.
    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            word_pos: self.rng.get_word_pos(),
        }
    }

    /// Restore a previously captured position.
    ///
    /// Used for cross-scope hand-off: host code that evaluates one scope
    /// while another is mid-tick saves the state before and restores it
    /// after, so draws never leak between scopes.
    pub fn restore(&mut self, state: RngState) {
        if state.seed != self.seed {
            self.rng = ChaCha8Rng::seed_from_u64(state.seed);
            self.seed = state.seed;
        }
        self.rng.set_word_pos(state.word_pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = ScopeRng::new(7);
        let mut b = ScopeRng::new(7);
        for _ in 0..64 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn scopes_get_distinct_streams() {
        let a = ScopeRng::for_scope(1, ScopeId::Global);
        let b = ScopeRng::for_scope(1, ScopeId::Map(0));
        let c = ScopeRng::for_scope(1, ScopeId::Map(1));
        assert_ne!(a.state().seed, b.state().seed);
        assert_ne!(b.state().seed, c.state().seed);
    }

    #[test]
    fn draws_advance_the_state() {
        let mut rng = ScopeRng::new(3);
        let before = rng.state();
        rng.next_u32();
        assert_ne!(before, rng.state());
        assert_ne!(before.fold(), rng.state().fold());
    }

    #[test]
    fn restore_rewinds_the_stream() {
        let mut rng = ScopeRng::new(11);
        rng.next_u64();
        let saved = rng.state();
        let first = rng.next_u32();
        rng.next_u32();
        rng.restore(saved);
        assert_eq!(rng.next_u32(), first);
    }

    #[test]
    fn restore_across_seeds_switches_stream() {
        let mut donor = ScopeRng::new(99);
        donor.next_u32();
        let saved = donor.state();
        let expected = donor.next_u32();

        let mut rng = ScopeRng::new(1);
        rng.restore(saved);
        assert_eq!(rng.next_u32(), expected);
    }

    #[test]
    fn empty_range_returns_low() {
        let mut rng = ScopeRng::new(0);
        assert_eq!(rng.range_u32(5, 5), 5);
        assert_eq!(rng.range_u32(9, 2), 9);
    }

    proptest! {
        #[test]
        fn range_stays_in_bounds(seed in any::<u64>(), lo in 0u32..1000, span in 1u32..1000) {
            let mut rng = ScopeRng::new(seed);
            let v = rng.range_u32(lo, lo + span);
            prop_assert!(v >= lo && v < lo + span);
        }

        #[test]
        fn unit_float_is_half_open(seed in any::<u64>()) {
            let mut rng = ScopeRng::new(seed);
            let v = rng.next_f32();
            prop_assert!((0.0..1.0).contains(&v));
        }
    }
}
