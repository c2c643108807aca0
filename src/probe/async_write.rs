//! Asynchronous batched write probe
//!
//! Lifecycle:
//!
//! 1. Open the target for append-create (truncating any previous content)
//! 2. Allocate one private zeroed buffer per block, then have the engine build
//!    one request descriptor per block
//! 3. Submit every request to the engine without waiting
//! 4. Busy-poll each request in submission order until it leaves the pending
//!    state, yielding the thread between polls
//! 5. Release the engine, the buffers and the file
//!
//! Timing covers steps 3 and 4. A failed or short request is recorded in the
//! report and logged; polling continues with the next request. Every
//! submitted request is drained before the probe returns, on success and on
//! error, so no buffer is released while the kernel may still reference it.

use super::ProbeParams;
use super::{ProbeKind, ProbeOutcome};
use crate::engine::{AioEngine, Completion, WriteOp};
use crate::error::HarnessError;
use crate::logging::Logger;
use crate::util::buffer::{AlignedBuffer, DEFAULT_ALIGNMENT};
use crate::util::time::Timestamp;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

/// Memory a write request can hand to an engine
pub trait IoBuffer {
    fn as_ptr(&self) -> *const u8;
    fn len(&self) -> usize;
}

impl IoBuffer for AlignedBuffer {
    fn as_ptr(&self) -> *const u8 {
        AlignedBuffer::as_ptr(self)
    }

    fn len(&self) -> usize {
        self.size()
    }
}

/// Source of per-request buffers
pub trait RequestAllocator {
    type Buffer: IoBuffer;

    /// Allocate the zeroed buffer for request `index`
    fn allocate(&mut self, index: u64, size: usize) -> Result<Self::Buffer, HarnessError>;
}

/// Page-aligned heap buffers
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl RequestAllocator for HeapAllocator {
    type Buffer = AlignedBuffer;

    fn allocate(&mut self, _index: u64, size: usize) -> Result<AlignedBuffer, HarnessError> {
        AlignedBuffer::zeroed(size, DEFAULT_ALIGNMENT, "async write buffer")
    }
}

/// Where a request is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Allocated,
    InFlight,
    Written(usize),
    Failed(String),
}

/// One write request: owns its buffer, borrows the file descriptor
struct WriteRequest<B> {
    index: u64,
    offset: u64,
    buffer: B,
    status: RequestStatus,
}

impl<B: IoBuffer> WriteRequest<B> {
    fn op(&self, target_fd: i32) -> WriteOp {
        WriteOp {
            target_fd,
            offset: self.offset,
            buffer: self.buffer.as_ptr(),
            length: self.buffer.len(),
            user_data: self.index,
        }
    }
}

/// A request that failed or came back short
#[derive(Debug, Clone, Serialize)]
pub struct RequestFailure {
    pub index: u64,
    pub reason: String,
}

/// Result of the asynchronous batched write probe
#[derive(Debug, Clone, Serialize)]
pub struct AsyncWriteReport {
    pub engine: String,
    pub requests: u64,
    /// Bytes reported written by completed requests
    pub bytes_written: u64,
    pub elapsed_ns: u64,
    pub failures: Vec<RequestFailure>,
}

impl AsyncWriteReport {
    pub fn outcome(&self) -> ProbeOutcome {
        ProbeOutcome {
            kind: ProbeKind::AsyncWrite,
            operations: self.requests,
            bytes: self.bytes_written,
            elapsed_ns: self.elapsed_ns,
        }
    }
}

/// Run the probe with heap buffers
pub fn async_batched_write(
    params: &ProbeParams,
    engine: &mut dyn AioEngine,
    log: &Logger,
) -> Result<AsyncWriteReport, HarnessError> {
    async_batched_write_with(params, engine, &mut HeapAllocator, log)
}

/// Run the probe with buffers from `allocator`
pub fn async_batched_write_with<A: RequestAllocator>(
    params: &ProbeParams,
    engine: &mut dyn AioEngine,
    allocator: &mut A,
    log: &Logger,
) -> Result<AsyncWriteReport, HarnessError> {
    params.check()?;

    let file = open_append(params)?;
    let requests = allocate_requests(params, allocator, log)?;

    let fd = file.as_raw_fd();
    let ops: Vec<WriteOp> = requests.iter().map(|r| r.op(fd)).collect();
    if let Err(e) = engine.prepare(&ops) {
        log.error(format!("async write: {} engine could not prepare requests: {:#}", engine.name(), e));
        return Err(match e.downcast::<HarnessError>() {
            Ok(err) => err,
            Err(e) => engine_error(format!("failed to set up {} engine", engine.name()), e),
        });
    }

    log.debug(format!(
        "async write: submitting {} requests of {} bytes via {}",
        requests.len(),
        params.block_size,
        engine.name()
    ));

    run_batch(params, engine, file, requests, log)
}

fn open_append(params: &ProbeParams) -> Result<File, HarnessError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .custom_flags(libc::O_APPEND)
        .open(&params.path)
        .map_err(|e| HarnessError::resource(format!("failed to open {} for writing", params.path.display()), e))
}

/// Allocate every request up front
///
/// On failure the requests allocated so far are dropped before returning.
fn allocate_requests<A: RequestAllocator>(
    params: &ProbeParams,
    allocator: &mut A,
    log: &Logger,
) -> Result<Vec<WriteRequest<A::Buffer>>, HarnessError> {
    let count = usize::try_from(params.n_blocks).map_err(|_| HarnessError::Allocation {
        what: "async request table".into(),
        size: usize::MAX,
    })?;

    let mut requests = Vec::new();
    requests
        .try_reserve_exact(count)
        .map_err(|_| HarnessError::Allocation {
            what: "async request table".into(),
            size: count.saturating_mul(std::mem::size_of::<WriteRequest<A::Buffer>>()),
        })?;

    for index in 0..params.n_blocks {
        let buffer = match allocator.allocate(index, params.block_size) {
            Ok(buffer) => buffer,
            Err(e) => {
                log.error(format!("async write: allocation of request {} failed: {}", index, e));
                return Err(e);
            }
        };
        requests.push(WriteRequest {
            index,
            offset: index * params.block_size as u64,
            buffer,
            status: RequestStatus::Allocated,
        });
    }
    Ok(requests)
}

fn run_batch<B: IoBuffer>(
    params: &ProbeParams,
    engine: &mut dyn AioEngine,
    file: File,
    mut requests: Vec<WriteRequest<B>>,
    log: &Logger,
) -> Result<AsyncWriteReport, HarnessError> {
    let start = Timestamp::now();
    let submitted = engine.submit_batch();
    for request in &mut requests[..submitted.accepted] {
        request.status = RequestStatus::InFlight;
    }

    // No early return from here until every accepted request is drained
    for request in &mut requests[..submitted.accepted] {
        request.status = loop {
            match engine.poll(request.index) {
                Ok(Completion::Pending) => std::thread::yield_now(),
                Ok(Completion::Done(bytes)) => break RequestStatus::Written(bytes),
                Ok(Completion::Failed(errno)) => {
                    break RequestStatus::Failed(io::Error::from_raw_os_error(errno).to_string())
                }
                Err(e) => break RequestStatus::Failed(format!("{:#}", e)),
            }
        };
    }
    let elapsed_ns = start.elapsed_nanos();

    let cleanup = engine.cleanup();
    drop(file);

    let mut bytes_written = 0u64;
    let mut failures = Vec::new();
    for request in &requests[..submitted.accepted] {
        let reason = match &request.status {
            RequestStatus::Written(bytes) => {
                bytes_written += *bytes as u64;
                if *bytes >= params.block_size {
                    continue;
                }
                format!("wrote {} of {} bytes", bytes, params.block_size)
            }
            RequestStatus::Failed(reason) => reason.clone(),
            other => format!("left in state {:?}", other),
        };
        log.error(format!("async write request {} failed: {}", request.index, reason));
        failures.push(RequestFailure {
            index: request.index,
            reason,
        });
    }

    if let Some(e) = submitted.error {
        return Err(engine_error(
            format!(
                "async submission stopped after {} of {} requests",
                submitted.accepted,
                requests.len()
            ),
            e,
        ));
    }
    cleanup.map_err(|e| engine_error(format!("failed to release {} engine", engine.name()), e))?;

    if failures.is_empty() {
        log.debug(format!("async write: {} requests completed", requests.len()));
    } else {
        log.warn(format!(
            "async write: {} of {} requests failed",
            failures.len(),
            requests.len()
        ));
    }

    Ok(AsyncWriteReport {
        engine: engine.name().to_string(),
        requests: requests.len() as u64,
        bytes_written,
        elapsed_ns,
        failures,
    })
}

fn engine_error(context: String, e: anyhow::Error) -> HarnessError {
    HarnessError::resource(context, io::Error::other(format!("{:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockAioEngine;
    use crate::error::ErrorClass;
    use crate::logging::{Level, MemorySink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TrackedBuffer {
        inner: AlignedBuffer,
        live: Arc<AtomicUsize>,
    }

    impl IoBuffer for TrackedBuffer {
        fn as_ptr(&self) -> *const u8 {
            self.inner.as_ptr()
        }

        fn len(&self) -> usize {
            self.inner.size()
        }
    }

    impl Drop for TrackedBuffer {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct TrackingAllocator {
        fail_at: Option<u64>,
        live: Arc<AtomicUsize>,
        allocated: usize,
    }

    impl TrackingAllocator {
        fn new(fail_at: Option<u64>) -> Self {
            Self {
                fail_at,
                live: Arc::new(AtomicUsize::new(0)),
                allocated: 0,
            }
        }
    }

    impl RequestAllocator for TrackingAllocator {
        type Buffer = TrackedBuffer;

        fn allocate(&mut self, index: u64, size: usize) -> Result<TrackedBuffer, HarnessError> {
            if self.fail_at == Some(index) {
                return Err(HarnessError::Allocation {
                    what: format!("async write buffer {}", index),
                    size,
                });
            }
            let inner = AlignedBuffer::zeroed(size, DEFAULT_ALIGNMENT, "tracked")?;
            self.live.fetch_add(1, Ordering::SeqCst);
            self.allocated += 1;
            Ok(TrackedBuffer {
                inner,
                live: self.live.clone(),
            })
        }
    }

    fn params(dir: &TempDir, n_blocks: u64) -> ProbeParams {
        ProbeParams::new(dir.path().join("async.dat"), 4096, n_blocks)
    }

    #[test]
    fn test_allocation_failure_releases_earlier_requests() {
        let temp_dir = TempDir::new().unwrap();
        let handle = MockAioEngine::new();
        let mut engine = handle.clone();
        let mut allocator = TrackingAllocator::new(Some(3));

        let err = async_batched_write_with(&params(&temp_dir, 10), &mut engine, &mut allocator, &Logger::disabled())
            .unwrap_err();

        assert!(matches!(err, HarnessError::Allocation { .. }));
        assert_eq!(err.class(), ErrorClass::Resource);
        assert_eq!(allocator.allocated, 3);
        assert_eq!(allocator.live.load(Ordering::SeqCst), 0);
        assert!(handle.calls().is_empty());
        assert!(handle.submitted().is_empty());
    }

    #[test]
    fn test_descriptors_prepared_before_submission() {
        let temp_dir = TempDir::new().unwrap();
        let handle = MockAioEngine::new();
        let mut engine = handle.clone();

        async_batched_write(&params(&temp_dir, 3), &mut engine, &Logger::disabled()).unwrap();

        assert_eq!(
            handle.calls(),
            vec!["prepare", "submit_batch", "poll", "poll", "poll", "cleanup"]
        );
    }

    #[test]
    fn test_descriptor_allocation_failure_releases_buffers() {
        let temp_dir = TempDir::new().unwrap();
        let handle = MockAioEngine::new();
        handle.fail_prepare();
        let mut engine = handle.clone();
        let mut allocator = TrackingAllocator::new(None);

        let err = async_batched_write_with(&params(&temp_dir, 6), &mut engine, &mut allocator, &Logger::disabled())
            .unwrap_err();

        assert!(matches!(err, HarnessError::Allocation { .. }));
        assert_eq!(err.class(), ErrorClass::Resource);
        assert_eq!(allocator.allocated, 6);
        assert_eq!(allocator.live.load(Ordering::SeqCst), 0);
        assert_eq!(handle.calls(), vec!["prepare"]);
        assert!(handle.submitted().is_empty());
    }

    #[test]
    fn test_drains_in_submission_order() {
        let temp_dir = TempDir::new().unwrap();
        let handle = MockAioEngine::new();
        handle.set_pending_polls(2);
        let mut engine = handle.clone();
        let mut allocator = TrackingAllocator::new(None);

        let report = async_batched_write_with(&params(&temp_dir, 10), &mut engine, &mut allocator, &Logger::disabled())
            .unwrap();

        assert_eq!(report.requests, 10);
        assert_eq!(report.bytes_written, 10 * 4096);
        assert!(report.failures.is_empty());
        assert_eq!(report.engine, "mock");
        assert_eq!(handle.submitted(), (0..10).collect::<Vec<u64>>());

        let expected: Vec<u64> = (0..10).flat_map(|i| [i, i, i]).collect();
        assert_eq!(handle.polled(), expected);
        assert!(handle.is_cleaned_up());
        assert_eq!(allocator.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_per_request_failures_are_reported() {
        let temp_dir = TempDir::new().unwrap();
        let handle = MockAioEngine::new();
        handle.fail_request(2, libc::EIO);
        handle.short_write(5, 100);
        let mut engine = handle.clone();

        let sink = MemorySink::new(Level::Trace);
        let lines = sink.clone();
        let log = Logger::new(Level::Trace).with_sink(Box::new(sink));

        let report = async_batched_write(&params(&temp_dir, 8), &mut engine, &log).unwrap();

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 2);
        assert_eq!(report.failures[1].index, 5);
        assert!(report.failures[1].reason.contains("100 of 4096"));
        assert_eq!(report.bytes_written, 6 * 4096 + 100);

        // Every request was still polled after the failures
        assert_eq!(handle.polled(), (0..8).collect::<Vec<u64>>());

        let errors = lines
            .lines()
            .into_iter()
            .filter(|(level, _)| *level == Level::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_partial_submission_drains_then_fails() {
        let temp_dir = TempDir::new().unwrap();
        let handle = MockAioEngine::new();
        handle.limit_submissions(4);
        let mut engine = handle.clone();
        let mut allocator = TrackingAllocator::new(None);

        let err = async_batched_write_with(&params(&temp_dir, 10), &mut engine, &mut allocator, &Logger::disabled())
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Resource);
        assert!(err.to_string().contains("4 of 10"));
        assert_eq!(handle.polled(), vec![0, 1, 2, 3]);
        assert!(handle.is_cleaned_up());
        assert_eq!(allocator.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outcome_from_report() {
        let temp_dir = TempDir::new().unwrap();
        let mut engine = MockAioEngine::new();
        let report = async_batched_write(&params(&temp_dir, 4), &mut engine, &Logger::disabled()).unwrap();
        let outcome = report.outcome();
        assert_eq!(outcome.kind, ProbeKind::AsyncWrite);
        assert_eq!(outcome.operations, 4);
        assert_eq!(outcome.bytes, 4 * 4096);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_posix_engine_writes_file() {
        use crate::engine::posix::PosixAioEngine;

        let temp_dir = TempDir::new().unwrap();
        let params = params(&temp_dir, 16);
        let mut engine = PosixAioEngine::new();

        let report = async_batched_write(&params, &mut engine, &Logger::disabled()).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.bytes_written, 65536);
        assert_eq!(std::fs::metadata(&params.path).unwrap().len(), 65536);
    }
}
