//! CSV output formatting
//!
//! The skew matrix is written as one header row followed by one row per rank:
//!
//! ```text
//! Process,P0,P1,P2
//! P0,0,-500,300
//! P1,500,0,800
//! P2,-300,-800,0
//! ```
//!
//! Values are signed nanosecond differences. The file is overwritten on every
//! run.

use crate::skew::SkewMatrix;
use crate::Result;
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default report file name
pub const DEFAULT_REPORT_FILE: &str = "clock_differences.csv";

/// Write the matrix as CSV to any writer
pub fn write_skew_csv_to<W: Write>(out: &mut W, matrix: &SkewMatrix) -> std::io::Result<()> {
    write!(out, "Process")?;
    for col in 0..matrix.size() {
        write!(out, ",P{}", col)?;
    }
    writeln!(out)?;

    for (rank, row) in matrix.rows().enumerate() {
        write!(out, "P{}", rank)?;
        for value in row {
            write!(out, ",{}", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Create (or truncate) `path` and write the matrix to it
pub fn write_skew_csv(path: &Path, matrix: &SkewMatrix) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_skew_csv_to(&mut out, matrix).with_context(|| format!("Failed to write {}", path.display()))?;
    out.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}
