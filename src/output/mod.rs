//! Report rendering
//!
//! - [`csv`]: the clock-difference matrix file
//! - [`text`]: tables and summary lines for stdout
//! - [`json`]: machine-readable reports

pub mod csv;
pub mod json;
pub mod text;
