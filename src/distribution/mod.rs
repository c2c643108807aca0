//! Random block selection
//!
//! The random-read probe picks block indices through the [`Distribution`]
//! trait. Distributions generate block numbers (0, 1, ..., N-1) rather than
//! byte offsets; the probe converts them: `offset = block_num * block_size`
//! (plus an optional intra-block jitter).
//!
//! - [`pcg`]: the PCG32 generator with bias-free bounded output
//! - [`uniform`]: equal probability for every block
//!
//! # Example
//!
//! ```
//! use clusterprobe::distribution::{Distribution, uniform::UniformDistribution};
//!
//! let mut dist = UniformDistribution::with_seed(1, 2);
//! let block_num = dist.next_block(1024);
//! assert!(block_num < 1024);
//! ```

/// Block number generator
///
/// Each probe invocation owns its distribution; nothing is shared across
/// probes or threads.
pub trait Distribution: Send {
    /// Return a block number in `[0, num_blocks)`, or 0 when `num_blocks` is 0
    fn next_block(&mut self, num_blocks: u64) -> u64;
}

pub mod pcg;
pub mod uniform;
