//! Uniform random block distribution
//!
//! All blocks are equally likely. Backed by [`Pcg32::bounded`], so the block
//! count is limited to the 32-bit range of the generator.
//!
//! # Example
//!
//! ```
//! use clusterprobe::distribution::{Distribution, uniform::UniformDistribution};
//!
//! let mut dist = UniformDistribution::with_seed(42, 54);
//! for _ in 0..10 {
//!     let block_num = dist.next_block(1024);
//!     assert!(block_num < 1024);
//! }
//! ```

use super::pcg::Pcg32;
use super::Distribution;

/// Uniform random distribution over `[0, num_blocks)`
pub struct UniformDistribution {
    rng: Pcg32,
}

impl UniformDistribution {
    /// Create a new uniform distribution seeded from clock and address
    pub fn new() -> Self {
        Self {
            rng: Pcg32::from_clock_and_address(),
        }
    }

    /// Create a new uniform distribution with a fixed seed
    ///
    /// Useful for reproducible tests.
    pub fn with_seed(initial_state: u64, stream: u64) -> Self {
        Self {
            rng: Pcg32::new(initial_state, stream),
        }
    }

    /// Access the underlying generator (e.g. for intra-block offsets)
    pub fn rng_mut(&mut self) -> &mut Pcg32 {
        &mut self.rng
    }
}

impl Default for UniformDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl Distribution for UniformDistribution {
    #[inline(always)]
    fn next_block(&mut self, num_blocks: u64) -> u64 {
        if num_blocks == 0 {
            return 0;
        }
        // Callers validate the range; clamp so an oversized count still stays in bounds
        let bound = num_blocks.min(u64::from(u32::MAX)) as u32;
        u64::from(self.rng.bounded(bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_distribution_basic() {
        let mut dist = UniformDistribution::new();

        for _ in 0..100 {
            let block_num = dist.next_block(1000);
            assert!(block_num < 1000);
        }
    }

    #[test]
    fn test_uniform_distribution_zero_max() {
        let mut dist = UniformDistribution::new();
        assert_eq!(dist.next_block(0), 0);
    }

    #[test]
    fn test_uniform_distribution_seeded() {
        let mut dist1 = UniformDistribution::with_seed(12345, 1);
        let mut dist2 = UniformDistribution::with_seed(12345, 1);

        for _ in 0..10 {
            assert_eq!(dist1.next_block(1000), dist2.next_block(1000));
        }
    }

    #[test]
    fn test_uniform_distribution_coverage() {
        let mut dist = UniformDistribution::with_seed(42, 7);
        let num_blocks = 100u64;
        let mut buckets = vec![0u32; 10];

        for _ in 0..10000 {
            let block_num = dist.next_block(num_blocks);
            buckets[(block_num * 10 / num_blocks) as usize] += 1;
        }

        // Each bucket should have roughly 1000 samples; allow 20% deviation
        for count in buckets {
            assert!(count > 800 && count < 1200, "Bucket count {} outside expected range", count);
        }
    }
}
