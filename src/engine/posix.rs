//! POSIX AIO engine
//!
//! `prepare` fills one table of `aiocb` control blocks, one per write. The
//! table is sized once and never grown, so each block keeps its address for
//! the lifetime of the request. Submission calls `aio_write` once per block;
//! completion is detected by querying `aio_error` until it stops reporting
//! `EINPROGRESS`, after which `aio_return` collects the byte count and
//! releases the request inside the C library.

use super::{check_order, descriptor_table, AioEngine, Completion, SubmitResult, WriteOp};
use crate::Result;
use anyhow::Context;

/// POSIX AIO engine
pub struct PosixAioEngine {
    /// Control blocks indexed by user_data
    control_blocks: Vec<libc::aiocb>,

    /// Number of leading control blocks accepted by `aio_write`
    submitted: usize,

    /// Final status per user_data once `aio_return` has been called
    finished: Vec<Option<Completion>>,
}

impl PosixAioEngine {
    pub fn new() -> Self {
        Self {
            control_blocks: Vec::new(),
            submitted: 0,
            finished: Vec::new(),
        }
    }

    fn control_block(op: &WriteOp) -> libc::aiocb {
        // SAFETY: aiocb is a plain C struct; all-zero is a valid initial state
        let mut cb: libc::aiocb = unsafe { std::mem::zeroed() };
        cb.aio_fildes = op.target_fd;
        cb.aio_buf = op.buffer as *mut libc::c_void;
        cb.aio_nbytes = op.length;
        cb.aio_offset = op.offset as libc::off_t;
        cb.aio_sigevent.sigev_notify = libc::SIGEV_NONE;
        cb
    }

    fn slot(&self, user_data: u64) -> Result<usize> {
        let index = user_data as usize;
        if index >= self.submitted {
            anyhow::bail!("request {} was never submitted", user_data);
        }
        Ok(index)
    }
}

impl Default for PosixAioEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: control blocks hold raw pointers into buffers owned by the probe; the
// engine is used from one thread at a time
unsafe impl Send for PosixAioEngine {}

impl AioEngine for PosixAioEngine {
    fn prepare(&mut self, ops: &[WriteOp]) -> Result<()> {
        check_order(ops)?;
        self.cleanup()?;

        let mut control_blocks = descriptor_table(ops.len(), "aiocb table")?;
        let mut finished = descriptor_table(ops.len(), "completion table")?;
        for op in ops {
            control_blocks.push(Self::control_block(op));
            finished.push(None);
        }

        self.control_blocks = control_blocks;
        self.finished = finished;
        Ok(())
    }

    fn submit_batch(&mut self) -> SubmitResult {
        while self.submitted < self.control_blocks.len() {
            let index = self.submitted;
            // SAFETY: the table is never grown after prepare, so the block
            // stays put until aio_return; the caller keeps the buffer alive
            let rc = unsafe { libc::aio_write(&mut self.control_blocks[index]) };
            if rc == -1 {
                let err = std::io::Error::last_os_error();
                return SubmitResult {
                    accepted: index,
                    error: Some(anyhow::Error::new(err).context(format!("aio_write failed for request {}", index))),
                };
            }
            self.submitted += 1;
        }
        SubmitResult::all(self.submitted)
    }

    fn poll(&mut self, user_data: u64) -> Result<Completion> {
        let index = self.slot(user_data)?;
        if let Some(done) = self.finished[index] {
            return Ok(done);
        }

        let cb = &mut self.control_blocks[index];

        // SAFETY: cb was passed to aio_write and has not been returned yet
        let err = unsafe { libc::aio_error(&*cb) };
        let completion = match err {
            libc::EINPROGRESS => return Ok(Completion::Pending),
            -1 => {
                let os = std::io::Error::last_os_error();
                return Err(os).with_context(|| format!("aio_error failed for request {}", user_data));
            }
            0 => {
                // SAFETY: request has completed; aio_return is called exactly once
                let ret = unsafe { libc::aio_return(&mut *cb) };
                if ret < 0 {
                    Completion::Failed(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
                } else {
                    Completion::Done(ret as usize)
                }
            }
            errno => {
                // Reap the failed request so the C library frees its state
                // SAFETY: request has completed; aio_return is called exactly once
                unsafe { libc::aio_return(&mut *cb) };
                Completion::Failed(errno)
            }
        };

        self.finished[index] = Some(completion);
        Ok(completion)
    }

    fn cleanup(&mut self) -> Result<()> {
        // Anything still in flight must finish before its control block is freed
        for user_data in 0..self.submitted as u64 {
            loop {
                match self.poll(user_data) {
                    Ok(Completion::Pending) => std::thread::yield_now(),
                    _ => break,
                }
            }
        }
        self.control_blocks.clear();
        self.finished.clear();
        self.submitted = 0;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "posix"
    }
}

impl Drop for PosixAioEngine {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::buffer::AlignedBuffer;
    use std::fs::OpenOptions;
    use std::os::unix::io::AsRawFd;
    use tempfile::TempDir;

    fn drain(engine: &mut PosixAioEngine, user_data: u64) -> Completion {
        loop {
            match engine.poll(user_data).unwrap() {
                Completion::Pending => std::thread::yield_now(),
                done => return done,
            }
        }
    }

    #[test]
    fn test_posix_engine_batch_write() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("posix_batch.dat");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_path)
            .unwrap();

        let mut buffers: Vec<AlignedBuffer> = (0..4)
            .map(|_| AlignedBuffer::zeroed(4096, 4096, "test").unwrap())
            .collect();
        for (i, buffer) in buffers.iter_mut().enumerate() {
            buffer.as_mut_slice().fill(i as u8 + 1);
        }

        let ops: Vec<WriteOp> = buffers
            .iter()
            .enumerate()
            .map(|(i, b)| WriteOp {
                target_fd: file.as_raw_fd(),
                offset: (i * 4096) as u64,
                buffer: b.as_ptr(),
                length: b.size(),
                user_data: i as u64,
            })
            .collect();

        let mut engine = PosixAioEngine::new();
        engine.prepare(&ops).unwrap();
        let submitted = engine.submit_batch();
        assert_eq!(submitted.accepted, 4);
        assert!(submitted.error.is_none());

        for i in 0..4 {
            assert_eq!(drain(&mut engine, i), Completion::Done(4096));
            // Final status is sticky
            assert_eq!(engine.poll(i).unwrap(), Completion::Done(4096));
        }
        engine.cleanup().unwrap();
        drop(file);

        let data = std::fs::read(&file_path).unwrap();
        assert_eq!(data.len(), 4 * 4096);
        assert_eq!(data[0], 1);
        assert_eq!(data[3 * 4096], 4);
    }

    #[test]
    fn test_posix_engine_bad_fd() {
        let buffer = AlignedBuffer::zeroed(4096, 4096, "test").unwrap();
        let ops = [WriteOp {
            target_fd: -1,
            offset: 0,
            buffer: buffer.as_ptr(),
            length: 4096,
            user_data: 0,
        }];

        let mut engine = PosixAioEngine::new();
        engine.prepare(&ops).unwrap();
        let submitted = engine.submit_batch();

        // Either rejected at submission or completed with EBADF
        if submitted.accepted == 1 {
            assert_eq!(drain(&mut engine, 0), Completion::Failed(libc::EBADF));
        } else {
            assert!(submitted.error.is_some());
        }
        engine.cleanup().unwrap();
    }

    #[test]
    fn test_posix_engine_unknown_request() {
        let buffer = AlignedBuffer::zeroed(4096, 4096, "test").unwrap();
        let ops = [WriteOp {
            target_fd: -1,
            offset: 0,
            buffer: buffer.as_ptr(),
            length: 4096,
            user_data: 0,
        }];

        let mut engine = PosixAioEngine::new();
        engine.prepare(&ops).unwrap();
        // Prepared but not yet submitted
        assert!(engine.poll(0).is_err());
        assert!(engine.poll(3).is_err());
        engine.cleanup().unwrap();
    }

    #[test]
    fn test_posix_engine_rejects_out_of_order() {
        let buffer = AlignedBuffer::zeroed(4096, 4096, "test").unwrap();
        let ops = [WriteOp {
            target_fd: -1,
            offset: 0,
            buffer: buffer.as_ptr(),
            length: 4096,
            user_data: 1,
        }];

        let mut engine = PosixAioEngine::new();
        assert!(engine.prepare(&ops).is_err());
        assert_eq!(engine.submit_batch().accepted, 0);
    }
}
