//! Aligned, zero-filled IO buffers
//!
//! Probe buffers are allocated once per probe (or once per async request) and
//! released when dropped, on every exit path. Allocation failure is reported as
//! a [`HarnessError::Allocation`] instead of aborting the process.

use crate::error::HarnessError;
use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Default alignment; matches the common page and sector size
pub const DEFAULT_ALIGNMENT: usize = 4096;

/// Memory-aligned, zero-initialized buffer
///
/// Alignment keeps the buffers usable with O_DIRECT and kernel AIO.
pub struct AlignedBuffer {
    ptr: *mut u8,
    size: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate `size` zeroed bytes aligned to `alignment`
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if `size` is zero, the layout is invalid or the
    /// allocator returns null.
    pub fn zeroed(size: usize, alignment: usize, what: &str) -> Result<Self, HarnessError> {
        let failed = || HarnessError::Allocation {
            what: what.to_string(),
            size,
        };

        if size == 0 || !alignment.is_power_of_two() {
            return Err(failed());
        }
        let layout = Layout::from_size_align(size, alignment).map_err(|_| failed())?;

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(failed());
        }

        Ok(AlignedBuffer { ptr, size, layout })
    }

    /// Get a raw pointer to the buffer
    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Get the buffer as a slice
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for size bytes for the lifetime of self
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Get the buffer as a mutable slice
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid and uniquely borrowed through &mut self
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Get the size of the buffer in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Verify that the buffer is properly aligned
    #[inline(always)]
    pub fn is_aligned(&self) -> bool {
        (self.ptr as usize) % self.layout.align() == 0
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with this exact layout
        unsafe {
            dealloc(self.ptr, self.layout);
        }
    }
}

// AlignedBuffer is Send because it owns its memory
unsafe impl Send for AlignedBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_buffer() {
        let buffer = AlignedBuffer::zeroed(8192, DEFAULT_ALIGNMENT, "test").unwrap();
        assert_eq!(buffer.size(), 8192);
        assert!(buffer.is_aligned());
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mutable_access() {
        let mut buffer = AlignedBuffer::zeroed(512, 512, "test").unwrap();
        buffer.as_mut_slice()[10] = 0xAB;
        assert_eq!(buffer.as_slice()[10], 0xAB);
    }

    #[test]
    fn test_zero_size_is_allocation_error() {
        match AlignedBuffer::zeroed(0, DEFAULT_ALIGNMENT, "empty") {
            Err(HarnessError::Allocation { what, size }) => {
                assert_eq!(what, "empty");
                assert_eq!(size, 0);
            }
            _ => panic!("expected allocation error"),
        }
    }

    #[test]
    fn test_bad_alignment_rejected() {
        assert!(AlignedBuffer::zeroed(4096, 3, "odd").is_err());
    }
}
