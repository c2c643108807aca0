//! IO throughput probes
//!
//! Four independent probes operate on a single scratch file:
//!
//! - [`sequential::sequential_write`] creates/truncates the file and writes
//!   `n_blocks` zero-filled blocks back to back
//! - [`sequential::sequential_read`] reads the same blocks back
//! - [`random::random_read`] reads block-sized windows at PRNG-chosen offsets
//! - [`async_write::async_batched_write`] submits one write per block to an
//!   [`AioEngine`](crate::engine::AioEngine) and drains them in order
//!
//! Every probe times only its transfer loop on the monotonic clock, owns its
//! buffers and file handle exclusively, and releases them on every exit path.
//! A short transfer is fatal to the probe; nothing is retried.

pub mod async_write;
pub mod random;
pub mod sequential;
pub mod suite;

use crate::error::{HarnessError, TransferOp};
use crate::util::time::bandwidth_mb_per_sec;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;

/// Probe selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    SeqWrite,
    SeqRead,
    RandomRead,
    AsyncWrite,
}

impl ProbeKind {
    /// All probes in execution order
    pub const ALL: [ProbeKind; 4] = [
        ProbeKind::SeqWrite,
        ProbeKind::SeqRead,
        ProbeKind::RandomRead,
        ProbeKind::AsyncWrite,
    ];

    /// Title used in bandwidth lines
    pub fn title(&self) -> &'static str {
        match self {
            ProbeKind::SeqWrite => "Sequential Write",
            ProbeKind::SeqRead => "Sequential Read",
            ProbeKind::RandomRead => "Random Read",
            ProbeKind::AsyncWrite => "Async Batched Write",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, ProbeKind::SeqRead | ProbeKind::RandomRead)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeKind::SeqWrite => "seq-write",
            ProbeKind::SeqRead => "seq-read",
            ProbeKind::RandomRead => "random-read",
            ProbeKind::AsyncWrite => "async-write",
        };
        write!(f, "{}", name)
    }
}

/// Inputs shared by all probes
#[derive(Debug, Clone)]
pub struct ProbeParams {
    pub path: PathBuf,
    pub block_size: usize,
    pub n_blocks: u64,
}

impl ProbeParams {
    pub fn new(path: impl Into<PathBuf>, block_size: usize, n_blocks: u64) -> Self {
        Self {
            path: path.into(),
            block_size,
            n_blocks,
        }
    }

    /// Bytes covered by `n_blocks` blocks
    pub fn file_bytes(&self) -> u64 {
        self.n_blocks * self.block_size as u64
    }

    pub(crate) fn check(&self) -> Result<(), HarnessError> {
        if self.block_size == 0 {
            return Err(HarnessError::Configuration("block size must be > 0".into()));
        }
        if self.n_blocks == 0 {
            return Err(HarnessError::Configuration("block count must be > 0".into()));
        }
        Ok(())
    }
}

/// Result of one probe run
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub kind: ProbeKind,
    /// Transfers performed
    pub operations: u64,
    /// Bytes moved inside the timed loop
    pub bytes: u64,
    /// Monotonic time spent in the timed loop
    pub elapsed_ns: u64,
}

impl ProbeOutcome {
    pub fn bandwidth_mb_per_sec(&self) -> f64 {
        bandwidth_mb_per_sec(self.bytes, self.elapsed_ns)
    }
}

/// Write all of `buf`, looping over partial writes
///
/// A write that makes no progress is a short transfer.
pub(crate) fn write_block(file: &mut File, buf: &[u8], index: u64) -> Result<(), HarnessError> {
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => {
                return Err(HarnessError::ShortTransfer {
                    op: TransferOp::Write,
                    index,
                    expected: buf.len(),
                    actual: written,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(HarnessError::resource(
                    format!("write of block {} failed after {} bytes", index, written),
                    e,
                ))
            }
        }
    }
    Ok(())
}

/// Fill all of `buf`, looping over partial reads
///
/// Hitting end of file before the buffer is full is a short transfer.
pub(crate) fn read_block(file: &mut File, buf: &mut [u8], index: u64) -> Result<(), HarnessError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(HarnessError::ShortTransfer {
                    op: TransferOp::Read,
                    index,
                    expected: buf.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(HarnessError::resource(
                    format!("read of block {} failed after {} bytes", index, filled),
                    e,
                ))
            }
        }
    }
    Ok(())
}
