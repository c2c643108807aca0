//! Sequential write and read probes

use super::{read_block, write_block, ProbeKind, ProbeOutcome, ProbeParams};
use crate::error::HarnessError;
use crate::logging::Logger;
use crate::util::buffer::{AlignedBuffer, DEFAULT_ALIGNMENT};
use crate::util::time::Timestamp;
use std::fs::{File, OpenOptions};

/// Create (or truncate) the target and write `n_blocks` zeroed blocks
///
/// Only the write loop is timed.
pub fn sequential_write(params: &ProbeParams, log: &Logger) -> Result<ProbeOutcome, HarnessError> {
    params.check()?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&params.path)
        .map_err(|e| {
            HarnessError::resource(format!("failed to open {} for writing", params.path.display()), e)
        })?;
    let buffer = AlignedBuffer::zeroed(params.block_size, DEFAULT_ALIGNMENT, "sequential write buffer")?;

    log.debug(format!(
        "sequential write: {} blocks of {} bytes to {}",
        params.n_blocks,
        params.block_size,
        params.path.display()
    ));

    let start = Timestamp::now();
    for index in 0..params.n_blocks {
        write_block(&mut file, buffer.as_slice(), index)?;
    }
    let elapsed_ns = start.elapsed_nanos();

    Ok(ProbeOutcome {
        kind: ProbeKind::SeqWrite,
        operations: params.n_blocks,
        bytes: params.file_bytes(),
        elapsed_ns,
    })
}

/// Read `n_blocks` blocks from the start of an existing target
///
/// Only the read loop is timed.
pub fn sequential_read(params: &ProbeParams, log: &Logger) -> Result<ProbeOutcome, HarnessError> {
    params.check()?;

    let mut file = File::open(&params.path).map_err(|e| {
        HarnessError::resource(format!("failed to open {} for reading", params.path.display()), e)
    })?;
    let mut buffer = AlignedBuffer::zeroed(params.block_size, DEFAULT_ALIGNMENT, "sequential read buffer")?;

    log.debug(format!(
        "sequential read: {} blocks of {} bytes from {}",
        params.n_blocks,
        params.block_size,
        params.path.display()
    ));

    let start = Timestamp::now();
    for index in 0..params.n_blocks {
        read_block(&mut file, buffer.as_mut_slice(), index)?;
    }
    let elapsed_ns = start.elapsed_nanos();

    Ok(ProbeOutcome {
        kind: ProbeKind::SeqRead,
        operations: params.n_blocks,
        bytes: params.file_bytes(),
        elapsed_ns,
    })
}
