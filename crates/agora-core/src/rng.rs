//! Raffle winner-selection seam.
//!
//! The engine requires only `draw(range) -> r in [0, range)`, deterministic
//! given its seed. Quality of the randomness is a deployment concern: plug a
//! source appropriate to the environment.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Pluggable pseudo-random draw used to pick raffle winners.
pub trait WinnerSource {
    /// Draw an integer uniformly from `[0, range)`.
    ///
    /// Preconditions:
    /// - `range > 0` (callers gate on a non-empty raffle first).
    fn draw(&mut self, range: u128) -> u128;
}

/// Seeded source over [`StdRng`]; deterministic for a fixed seed.
#[derive(Clone, Debug)]
pub struct SeededWinnerSource {
    rng: StdRng,
}

impl SeededWinnerSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl WinnerSource for SeededWinnerSource {
    fn draw(&mut self, range: u128) -> u128 {
        debug_assert!(range > 0);
        self.rng.gen_range(0..range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SeededWinnerSource::from_seed(42);
        let mut b = SeededWinnerSource::from_seed(42);
        for _ in 0..32 {
            assert_eq!(a.draw(1_000), b.draw(1_000));
        }
    }

    #[test]
    fn draws_stay_in_range() {
        let mut s = SeededWinnerSource::from_seed(7);
        for range in [1u128, 2, 3, 10, 1 << 64] {
            for _ in 0..16 {
                assert!(s.draw(range) < range);
            }
        }
    }
}
