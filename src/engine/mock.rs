//! Mock AIO engine for testing
//!
//! Simulates the asynchronous write lifecycle without touching the file. Each
//! request reports `Pending` for a configurable number of polls before its final
//! status, and individual requests can be made to fail or come back short.
//! Every trait call is recorded in order, so tests can check the lifecycle.
//!
//! # Example
//!
//! ```
//! use clusterprobe::engine::{AioEngine, Completion, WriteOp};
//! use clusterprobe::engine::mock::MockAioEngine;
//!
//! let mut engine = MockAioEngine::new();
//! engine.fail_request(1, 5);
//!
//! let ops: Vec<WriteOp> = (0..2)
//!     .map(|i| WriteOp {
//!         target_fd: 1,
//!         offset: i * 4096,
//!         buffer: std::ptr::null(),
//!         length: 4096,
//!         user_data: i,
//!     })
//!     .collect();
//! engine.prepare(&ops).unwrap();
//! assert_eq!(engine.submit_batch().accepted, 2);
//! assert_eq!(engine.poll(0).unwrap(), Completion::Done(4096));
//! assert_eq!(engine.poll(1).unwrap(), Completion::Failed(5));
//! ```

use super::{check_order, AioEngine, Completion, SubmitResult, WriteOp};
use crate::error::HarnessError;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock AIO engine
///
/// Clones share state, so a test can keep a handle for inspection after
/// handing the engine to a probe.
#[derive(Clone, Default)]
pub struct MockAioEngine {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    prepared: Option<Vec<WriteOp>>,
    fail_prepare: bool,
    pending_polls: usize,
    accept_limit: Option<usize>,
    overrides: HashMap<u64, Completion>,
    lengths: HashMap<u64, usize>,
    remaining: HashMap<u64, usize>,
    submitted: Vec<u64>,
    polled: Vec<u64>,
    calls: Vec<&'static str>,
    cleaned_up: bool,
}

impl MockAioEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `Pending` this many times per request before completing it
    pub fn set_pending_polls(&self, polls: usize) {
        self.lock().pending_polls = polls;
    }

    /// Complete `user_data` with the given errno
    pub fn fail_request(&self, user_data: u64, errno: i32) {
        self.lock().overrides.insert(user_data, Completion::Failed(errno));
    }

    /// Complete `user_data` having written only `bytes`
    pub fn short_write(&self, user_data: u64, bytes: usize) {
        self.lock().overrides.insert(user_data, Completion::Done(bytes));
    }

    /// Make `prepare` fail as if the descriptor table could not be allocated
    pub fn fail_prepare(&self) {
        self.lock().fail_prepare = true;
    }

    /// Accept only the first `count` operations of a batch
    pub fn limit_submissions(&self, count: usize) {
        self.lock().accept_limit = Some(count);
    }

    /// user_data of every accepted operation, in submission order
    pub fn submitted(&self) -> Vec<u64> {
        self.lock().submitted.clone()
    }

    /// user_data of every poll call, in call order
    pub fn polled(&self) -> Vec<u64> {
        self.lock().polled.clone()
    }

    /// Names of the trait methods called so far, in call order
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn is_prepared(&self) -> bool {
        self.lock().prepared.is_some()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.lock().cleaned_up
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from other assertions
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AioEngine for MockAioEngine {
    fn prepare(&mut self, ops: &[WriteOp]) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("prepare");
        check_order(ops)?;
        if state.fail_prepare {
            return Err(HarnessError::Allocation {
                what: "mock descriptor table".into(),
                size: ops.len(),
            }
            .into());
        }
        state.prepared = Some(ops.to_vec());
        state.cleaned_up = false;
        Ok(())
    }

    fn submit_batch(&mut self) -> SubmitResult {
        let mut state = self.lock();
        state.calls.push("submit_batch");
        let ops = match state.prepared.take() {
            Some(ops) => ops,
            None => {
                return SubmitResult {
                    accepted: 0,
                    error: Some(anyhow::anyhow!("Engine not prepared")),
                }
            }
        };

        let total = ops.len();
        let limit = state.accept_limit.unwrap_or(usize::MAX).min(total);
        let pending_polls = state.pending_polls;
        for op in &ops[..limit] {
            state.submitted.push(op.user_data);
            state.lengths.insert(op.user_data, op.length);
            state.remaining.insert(op.user_data, pending_polls);
        }

        if limit < total {
            SubmitResult {
                accepted: limit,
                error: Some(anyhow::anyhow!("mock submission limit reached at {}", limit)),
            }
        } else {
            SubmitResult::all(limit)
        }
    }

    fn poll(&mut self, user_data: u64) -> Result<Completion> {
        let mut state = self.lock();
        state.calls.push("poll");
        state.polled.push(user_data);

        let length = match state.lengths.get(&user_data) {
            Some(&length) => length,
            None => anyhow::bail!("request {} was never submitted", user_data),
        };

        if let Some(remaining) = state.remaining.get_mut(&user_data) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Completion::Pending);
            }
        }

        Ok(state
            .overrides
            .get(&user_data)
            .copied()
            .unwrap_or(Completion::Done(length)))
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("cleanup");
        state.cleaned_up = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(count: u64) -> Vec<WriteOp> {
        (0..count)
            .map(|i| WriteOp {
                target_fd: 3,
                offset: i * 512,
                buffer: std::ptr::null(),
                length: 512,
                user_data: i,
            })
            .collect()
    }

    #[test]
    fn test_mock_pending_then_done() {
        let mut engine = MockAioEngine::new();
        engine.set_pending_polls(2);
        engine.prepare(&ops(1)).unwrap();
        engine.submit_batch();

        assert_eq!(engine.poll(0).unwrap(), Completion::Pending);
        assert_eq!(engine.poll(0).unwrap(), Completion::Pending);
        assert_eq!(engine.poll(0).unwrap(), Completion::Done(512));
        assert_eq!(engine.polled(), vec![0, 0, 0]);
    }

    #[test]
    fn test_mock_overrides() {
        let mut engine = MockAioEngine::new();
        engine.fail_request(0, libc::EIO);
        engine.short_write(1, 100);
        engine.prepare(&ops(3)).unwrap();
        engine.submit_batch();

        assert_eq!(engine.poll(0).unwrap(), Completion::Failed(libc::EIO));
        assert_eq!(engine.poll(1).unwrap(), Completion::Done(100));
        assert_eq!(engine.poll(2).unwrap(), Completion::Done(512));
    }

    #[test]
    fn test_mock_submission_limit() {
        let mut engine = MockAioEngine::new();
        engine.limit_submissions(2);
        engine.prepare(&ops(4)).unwrap();

        let result = engine.submit_batch();
        assert_eq!(result.accepted, 2);
        assert!(result.error.is_some());
        assert_eq!(engine.submitted(), vec![0, 1]);
        assert!(engine.poll(3).is_err());
    }

    #[test]
    fn test_mock_requires_prepare() {
        let mut engine = MockAioEngine::new();
        let result = engine.submit_batch();
        assert_eq!(result.accepted, 0);
        assert!(result.error.is_some());
        assert!(!engine.is_prepared());
    }

    #[test]
    fn test_mock_prepare_failure_is_allocation_error() {
        let mut engine = MockAioEngine::new();
        engine.fail_prepare();
        let err = engine.prepare(&ops(2)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::Allocation { .. })
        ));
        assert!(!engine.is_prepared());
        assert_eq!(engine.submit_batch().accepted, 0);
    }

    #[test]
    fn test_mock_records_call_order() {
        let handle = MockAioEngine::new();
        let mut engine = handle.clone();
        engine.prepare(&ops(1)).unwrap();
        engine.submit_batch();
        engine.poll(0).unwrap();
        engine.cleanup().unwrap();
        assert_eq!(handle.calls(), vec!["prepare", "submit_batch", "poll", "cleanup"]);
        assert!(handle.is_cleaned_up());
    }
}
