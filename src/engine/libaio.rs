//! Linux native AIO engine
//!
//! Uses the kernel AIO syscalls directly through libc rather than a binding
//! crate. `prepare` builds every `iocb` and the pointer array handed to
//! `io_submit`, then places the whole batch in a single AIO context sized to
//! it, so `prepare` fails when the batch exceeds `/proc/sys/fs/aio-max-nr`.
//!
//! Completion polling never blocks: `io_getevents` is called with `min_nr = 0`
//! and a zero timeout, and reaped events are parked per request until polled.

use super::{check_order, descriptor_table, AioEngine, Completion, SubmitResult, WriteOp};
use crate::Result;
use anyhow::Context;
use std::ptr;

type AioContext = libc::c_ulong;

const IOCB_CMD_PWRITE: u16 = 1;

/// Upper bound on events reaped per `io_getevents` call
const MAX_EVENTS_PER_REAP: usize = 4096;

#[repr(C)]
#[derive(Clone, Copy)]
struct IoControlBlock {
    data: u64,
    key: u32,
    aio_rw_flags: u32,
    lio_opcode: u16,
    aio_reqprio: i16,
    aio_fildes: u32,
    buf: u64,
    nbytes: u64,
    offset: i64,
    aio_reserved2: u64,
    flags: u32,
    aio_resfd: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct IoEvent {
    data: u64,
    obj: u64,
    res: i64,
    res2: i64,
}

const EMPTY_EVENT: IoEvent = IoEvent {
    data: 0,
    obj: 0,
    res: 0,
    res2: 0,
};

unsafe fn io_setup(maxevents: libc::c_long, ctxp: *mut AioContext) -> libc::c_long {
    libc::syscall(libc::SYS_io_setup, maxevents, ctxp)
}

unsafe fn io_destroy(ctx: AioContext) -> libc::c_long {
    libc::syscall(libc::SYS_io_destroy, ctx)
}

unsafe fn io_submit(ctx: AioContext, nr: libc::c_long, iocbpp: *mut *mut IoControlBlock) -> libc::c_long {
    libc::syscall(libc::SYS_io_submit, ctx, nr, iocbpp)
}

unsafe fn io_getevents(
    ctx: AioContext,
    min_nr: libc::c_long,
    nr: libc::c_long,
    events: *mut IoEvent,
    timeout: *mut libc::timespec,
) -> libc::c_long {
    libc::syscall(libc::SYS_io_getevents, ctx, min_nr, nr, events, timeout)
}

/// Linux native AIO engine
pub struct LibaioEngine {
    ctx: Option<AioContext>,

    /// Control blocks indexed by user_data; never grown after prepare
    iocbs: Vec<IoControlBlock>,

    /// `io_submit` argument: one pointer into `iocbs` per request
    pointers: Vec<*mut IoControlBlock>,

    /// Number of leading requests accepted by `io_submit`
    submitted: usize,

    /// Reaped status per user_data
    results: Vec<Option<Completion>>,

    /// Submitted but not yet reaped
    in_flight: usize,

    /// Reused event buffer
    events: Vec<IoEvent>,
}

impl LibaioEngine {
    pub fn new() -> Self {
        Self {
            ctx: None,
            iocbs: Vec::new(),
            pointers: Vec::new(),
            submitted: 0,
            results: Vec::new(),
            in_flight: 0,
            events: Vec::new(),
        }
    }

    fn control_block(op: &WriteOp) -> IoControlBlock {
        IoControlBlock {
            data: op.user_data,
            key: 0,
            aio_rw_flags: 0,
            lio_opcode: IOCB_CMD_PWRITE,
            aio_reqprio: 0,
            aio_fildes: op.target_fd as u32,
            buf: op.buffer as u64,
            nbytes: op.length as u64,
            offset: op.offset as i64,
            aio_reserved2: 0,
            flags: 0,
            aio_resfd: 0,
        }
    }

    /// Collect whatever completions are available; blocks only if `wait` is set
    fn reap(&mut self, wait: bool) -> Result<usize> {
        let ctx = match self.ctx {
            Some(ctx) => ctx,
            None => anyhow::bail!("Engine not prepared"),
        };
        if self.in_flight == 0 {
            return Ok(0);
        }

        let mut zero = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        let timeout: *mut libc::timespec = if wait { ptr::null_mut() } else { &mut zero };
        let max_events = self.events.len().min(self.in_flight);

        let reaped = unsafe {
            io_getevents(
                ctx,
                if wait { 1 } else { 0 },
                max_events as libc::c_long,
                self.events.as_mut_ptr(),
                timeout,
            )
        };
        if reaped < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err).context("io_getevents failed");
        }

        for event in &self.events[..reaped as usize] {
            let completion = if event.res >= 0 {
                Completion::Done(event.res as usize)
            } else {
                // Negative result is -errno
                Completion::Failed((-event.res) as i32)
            };
            if let Some(slot) = self.results.get_mut(event.data as usize) {
                *slot = Some(completion);
            }
        }
        self.in_flight -= reaped as usize;
        Ok(reaped as usize)
    }
}

impl Default for LibaioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AioEngine for LibaioEngine {
    fn prepare(&mut self, ops: &[WriteOp]) -> Result<()> {
        check_order(ops)?;
        self.cleanup()?;

        let mut iocbs = descriptor_table(ops.len(), "iocb table")?;
        let mut pointers = descriptor_table(ops.len(), "iocb pointer table")?;
        let mut results = descriptor_table(ops.len(), "completion table")?;
        let event_slots = ops.len().clamp(1, MAX_EVENTS_PER_REAP);
        let mut events = descriptor_table(event_slots, "io_event buffer")?;

        iocbs.extend(ops.iter().map(Self::control_block));
        // The table is full and never grown again, so these pointers stay valid
        pointers.extend(iocbs.iter_mut().map(|iocb| iocb as *mut IoControlBlock));
        results.resize(ops.len(), None);
        events.resize(event_slots, EMPTY_EVENT);

        let capacity = ops.len().max(1);
        let mut ctx: AioContext = 0;
        let result = unsafe { io_setup(capacity as libc::c_long, &mut ctx) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "io_setup failed for {} requests (check /proc/sys/fs/aio-max-nr)",
                capacity
            ));
        }

        self.ctx = Some(ctx);
        self.iocbs = iocbs;
        self.pointers = pointers;
        self.results = results;
        self.events = events;
        Ok(())
    }

    fn submit_batch(&mut self) -> SubmitResult {
        let ctx = match self.ctx {
            Some(ctx) => ctx,
            None => {
                return SubmitResult {
                    accepted: 0,
                    error: Some(anyhow::anyhow!("Engine not prepared")),
                }
            }
        };

        while self.submitted < self.pointers.len() {
            let remaining = (self.pointers.len() - self.submitted) as libc::c_long;
            let result = unsafe { io_submit(ctx, remaining, self.pointers[self.submitted..].as_mut_ptr()) };
            if result <= 0 {
                let err = if result < 0 {
                    anyhow::Error::new(std::io::Error::last_os_error())
                } else {
                    anyhow::anyhow!("io_submit accepted no requests")
                };
                return SubmitResult {
                    accepted: self.submitted,
                    error: Some(err.context(format!("io_submit failed at request {}", self.submitted))),
                };
            }
            self.submitted += result as usize;
            self.in_flight += result as usize;
        }

        SubmitResult::all(self.submitted)
    }

    fn poll(&mut self, user_data: u64) -> Result<Completion> {
        let index = user_data as usize;
        if index >= self.submitted {
            anyhow::bail!("request {} was never submitted", user_data);
        }
        if self.results[index].is_none() {
            self.reap(false)?;
        }
        Ok(self.results[index].unwrap_or(Completion::Pending))
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(ctx) = self.ctx {
            while self.in_flight > 0 {
                self.reap(true)?;
            }

            let result = unsafe { io_destroy(ctx) };
            if result < 0 {
                let err = std::io::Error::last_os_error();
                return Err(err).context("io_destroy failed");
            }
            self.ctx = None;
        }

        self.pointers.clear();
        self.iocbs.clear();
        self.results.clear();
        self.submitted = 0;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "libaio"
    }
}

impl Drop for LibaioEngine {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

// Safety: control blocks hold raw pointers into buffers owned by the probe; the
// engine is used from one thread at a time
unsafe impl Send for LibaioEngine {}
