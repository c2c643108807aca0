//! Asynchronous write engines
//!
//! The asynchronous batched-write probe hands a whole batch of write operations
//! to an [`AioEngine`] without waiting, then queries each operation's status in
//! submission order until the pending sentinel ([`Completion::Pending`]) clears.
//! Engines differ only in the kernel interface used underneath.
//!
//! # Engine Types
//!
//! - **posix**: POSIX AIO (`aio_write` / `aio_error` / `aio_return`). No limit on
//!   the number of outstanding requests beyond memory.
//! - **libaio**: Linux native AIO through raw `io_setup` / `io_submit` /
//!   `io_getevents` syscalls. The whole batch must fit in one AIO context, so
//!   the batch size is bounded by `/proc/sys/fs/aio-max-nr`.
//! - **mock**: in-memory engine for tests with injectable failures.
//!
//! # Lifecycle
//!
//! 1. `prepare(ops)` once: every engine-side request descriptor is built here
//! 2. `submit_batch()` once: hands the prepared descriptors to the kernel
//! 3. `poll(user_data)` repeatedly for every accepted operation
//! 4. `cleanup()`
//!
//! Only steps 2 and 3 sit inside the probe's timed window.

use crate::error::HarnessError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::unix::io::RawFd;

/// Asynchronous write engine
///
/// Engines must be `Send` so a probe can run on any thread, but each probe
/// invocation owns its engine exclusively.
pub trait AioEngine: Send {
    /// Build one request descriptor per operation, in `user_data` order
    ///
    /// A descriptor table that cannot be allocated fails with
    /// [`HarnessError::Allocation`] and leaves nothing allocated.
    fn prepare(&mut self, ops: &[WriteOp]) -> Result<()>;

    /// Submit every prepared operation without waiting for completion
    ///
    /// Operations are accepted in order; `SubmitResult::accepted` is the length
    /// of the accepted prefix. Only accepted operations may be polled.
    ///
    /// # Safety
    ///
    /// The caller must keep every buffer referenced by an accepted operation
    /// alive and unmoved until `poll` has reported a final status for it.
    fn submit_batch(&mut self) -> SubmitResult;

    /// Non-blocking status query for one accepted operation
    ///
    /// Returns `Completion::Pending` while the request is in flight. Once a
    /// final status has been returned, further polls return the same status.
    fn poll(&mut self, user_data: u64) -> Result<Completion>;

    /// Release engine resources; waits out anything still in flight
    fn cleanup(&mut self) -> Result<()>;

    /// Short engine name for reports
    fn name(&self) -> &'static str;
}

/// Empty table with room for exactly `count` descriptors
///
/// The table is never grown afterwards, so element addresses stay stable for
/// the kernel.
pub(crate) fn descriptor_table<T>(count: usize, what: &str) -> Result<Vec<T>> {
    let mut table = Vec::new();
    if table.try_reserve_exact(count).is_err() {
        return Err(HarnessError::Allocation {
            what: what.to_string(),
            size: count.saturating_mul(std::mem::size_of::<T>()),
        }
        .into());
    }
    Ok(table)
}

/// Check that `ops` are numbered `0..ops.len()` in order
pub(crate) fn check_order(ops: &[WriteOp]) -> Result<()> {
    for (i, op) in ops.iter().enumerate() {
        if op.user_data != i as u64 {
            anyhow::bail!(
                "operations must be prepared in user_data order (got {} at {})",
                op.user_data,
                i
            );
        }
    }
    Ok(())
}

/// One positioned write handed to an engine
///
/// The target descriptor is borrowed: the probe owns the file, requests only
/// reference it.
#[derive(Debug, Clone, Copy)]
pub struct WriteOp {
    pub target_fd: RawFd,
    pub offset: u64,
    pub buffer: *const u8,
    pub length: usize,
    /// Caller's index for this operation, echoed by `poll`
    pub user_data: u64,
}

// Safety: WriteOp is a plain descriptor; the buffer lifetime is managed by the probe
unsafe impl Send for WriteOp {}

/// Status of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Still in flight
    Pending,
    /// Finished; number of bytes written
    Done(usize),
    /// Finished with an OS error number
    Failed(i32),
}

/// Outcome of [`AioEngine::submit_batch`]
#[derive(Debug)]
pub struct SubmitResult {
    /// Number of leading operations the engine accepted
    pub accepted: usize,
    /// Why submission stopped early, if it did
    pub error: Option<anyhow::Error>,
}

impl SubmitResult {
    pub fn all(count: usize) -> Self {
        Self {
            accepted: count,
            error: None,
        }
    }
}

/// Engine selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AioEngineKind {
    #[default]
    Posix,
    Libaio,
}

impl fmt::Display for AioEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AioEngineKind::Posix => write!(f, "posix"),
            AioEngineKind::Libaio => write!(f, "libaio"),
        }
    }
}

/// Construct the engine for `kind`
pub fn create_engine(kind: AioEngineKind) -> Result<Box<dyn AioEngine>> {
    match kind {
        #[cfg(target_os = "linux")]
        AioEngineKind::Posix => Ok(Box::new(posix::PosixAioEngine::new())),
        #[cfg(target_os = "linux")]
        AioEngineKind::Libaio => Ok(Box::new(libaio::LibaioEngine::new())),
        #[cfg(not(target_os = "linux"))]
        other => anyhow::bail!("{} engine is only available on Linux", other),
    }
}

pub mod mock;

#[cfg(target_os = "linux")]
pub mod libaio;

#[cfg(target_os = "linux")]
pub mod posix;

#[cfg(test)]
mod tests {
    use super::*;

    fn op(user_data: u64) -> WriteOp {
        WriteOp {
            target_fd: 3,
            offset: user_data * 512,
            buffer: std::ptr::null(),
            length: 512,
            user_data,
        }
    }

    #[test]
    fn test_descriptor_table_reserves_exactly() {
        let table: Vec<u64> = descriptor_table(16, "test table").unwrap();
        assert!(table.is_empty());
        assert!(table.capacity() >= 16);
    }

    #[test]
    fn test_descriptor_table_overflow_is_allocation_error() {
        let err = descriptor_table::<[u8; 4096]>(usize::MAX / 2, "huge table").unwrap_err();
        match err.downcast_ref::<HarnessError>() {
            Some(HarnessError::Allocation { what, .. }) => assert_eq!(what, "huge table"),
            other => panic!("expected allocation error, got {:?}", other),
        }
    }

    #[test]
    fn test_check_order() {
        assert!(check_order(&[op(0), op(1), op(2)]).is_ok());
        assert!(check_order(&[op(0), op(2)]).is_err());
        assert!(check_order(&[]).is_ok());
    }

    #[test]
    fn test_default_engine_is_posix() {
        assert_eq!(AioEngineKind::default(), AioEngineKind::Posix);
        assert_eq!(AioEngineKind::Libaio.to_string(), "libaio");
    }
}
