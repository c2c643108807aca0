//! Random read probe
//!
//! Each read picks a block index uniformly in `[0, n_blocks)`. Unless the index
//! is the last block, a uniform intra-block offset in `[0, block_size)` is added
//! so the read window may straddle a block boundary. The last block is read
//! exactly at its start, which keeps every window inside the file.

use super::{read_block, ProbeKind, ProbeOutcome, ProbeParams};
use crate::distribution::uniform::UniformDistribution;
use crate::distribution::Distribution;
use crate::error::HarnessError;
use crate::logging::Logger;
use crate::util::buffer::{AlignedBuffer, DEFAULT_ALIGNMENT};
use crate::util::time::Timestamp;
use std::fs::File;
use std::io::{Seek, SeekFrom};

/// Picks absolute read offsets for the random read probe
pub struct RandomReadOffsets {
    dist: UniformDistribution,
    n_blocks: u64,
    block_size: u32,
}

impl RandomReadOffsets {
    /// Build a picker over `n_blocks` blocks of `block_size` bytes
    ///
    /// Both values must fit the generator's 32-bit range.
    pub fn new(dist: UniformDistribution, n_blocks: u64, block_size: usize) -> Result<Self, HarnessError> {
        if n_blocks == 0 || n_blocks > u32::MAX as u64 {
            return Err(HarnessError::Configuration(format!(
                "random read needs 1..={} blocks, got {}",
                u32::MAX,
                n_blocks
            )));
        }
        let block_size = u32::try_from(block_size)
            .ok()
            .filter(|&bs| bs > 0)
            .ok_or_else(|| {
                HarnessError::Configuration(format!(
                    "random read block size must be in 1..={}, got {}",
                    u32::MAX,
                    block_size
                ))
            })?;
        Ok(Self {
            dist,
            n_blocks,
            block_size,
        })
    }

    /// Next absolute offset; always `< n_blocks * block_size`
    pub fn next_offset(&mut self) -> u64 {
        let index = self.dist.next_block(self.n_blocks);
        let mut offset = index * self.block_size as u64;
        if index != self.n_blocks - 1 {
            offset += self.dist.rng_mut().bounded(self.block_size) as u64;
        }
        offset
    }
}

/// Random reads against an existing target with a clock-seeded generator
pub fn random_read(params: &ProbeParams, n_reads: u64, log: &Logger) -> Result<ProbeOutcome, HarnessError> {
    params.check()?;
    let offsets = RandomReadOffsets::new(UniformDistribution::new(), params.n_blocks, params.block_size)?;
    random_read_with(params, n_reads, offsets, log)
}

/// Random reads using the supplied offset picker
///
/// Only the seek+read loop is timed.
pub fn random_read_with(
    params: &ProbeParams,
    n_reads: u64,
    mut offsets: RandomReadOffsets,
    log: &Logger,
) -> Result<ProbeOutcome, HarnessError> {
    params.check()?;

    let mut file = File::open(&params.path).map_err(|e| {
        HarnessError::resource(format!("failed to open {} for reading", params.path.display()), e)
    })?;
    let mut buffer = AlignedBuffer::zeroed(params.block_size, DEFAULT_ALIGNMENT, "random read buffer")?;

    log.debug(format!(
        "random read: {} reads of {} bytes over {} blocks of {}",
        n_reads,
        params.block_size,
        params.n_blocks,
        params.path.display()
    ));

    let start = Timestamp::now();
    for index in 0..n_reads {
        let offset = offsets.next_offset();
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| HarnessError::Seek { offset, source })?;
        read_block(&mut file, buffer.as_mut_slice(), index)?;
    }
    let elapsed_ns = start.elapsed_nanos();

    Ok(ProbeOutcome {
        kind: ProbeKind::RandomRead,
        operations: n_reads,
        bytes: n_reads * params.block_size as u64,
        elapsed_ns,
    })
}
