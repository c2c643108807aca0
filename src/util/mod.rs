//! Shared utilities: timing, buffers and number formatting

pub mod buffer;
pub mod time;
pub mod units;
