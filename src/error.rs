//! Error taxonomy for probes and collectives
//!
//! Every fatal condition the harness can hit falls in one of four classes.
//! None of them is retried: retrying would distort the measurement.

use std::fmt;
use std::io;
use thiserror::Error;

/// Direction of a data transfer, used in short-transfer reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    Read,
    Write,
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOp::Read => write!(f, "read"),
            TransferOp::Write => write!(f, "write"),
        }
    }
}

/// Broad classification of a [`HarnessError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid setup, e.g. fewer than two skew participants
    Configuration,
    /// Allocation, open or seek failure
    Resource,
    /// Short read or short write
    Transfer,
    /// Collective communication failure or group abort
    Rendezvous,
}

/// Errors raised by the measurement core
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to allocate {size} bytes for {what}")]
    Allocation { what: String, size: usize },

    #[error("short {op} at block {index}: transferred {actual} of {expected} bytes")]
    ShortTransfer {
        op: TransferOp,
        index: u64,
        expected: usize,
        actual: usize,
    },

    #[error("seek to offset {offset} failed: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("rendezvous failed: {0}")]
    Rendezvous(String),

    #[error("run aborted by rank {rank}: {reason}")]
    Aborted { rank: usize, reason: String },
}

impl HarnessError {
    /// Wrap an OS error with a description of what was being attempted
    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        HarnessError::Resource {
            context: context.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            HarnessError::Configuration(_) => ErrorClass::Configuration,
            HarnessError::Resource { .. }
            | HarnessError::Allocation { .. }
            | HarnessError::Seek { .. } => ErrorClass::Resource,
            HarnessError::ShortTransfer { .. } => ErrorClass::Transfer,
            HarnessError::Rendezvous(_) | HarnessError::Aborted { .. } => ErrorClass::Rendezvous,
        }
    }
}
