//! Human-readable text output

use crate::probe::suite::SuiteReport;
use crate::probe::ProbeOutcome;
use crate::skew::{MaxSkew, SkewMatrix};
use crate::util::units::{format_bytes, format_with_commas};
use std::fmt::Write;
use std::path::Path;

/// Render the skew matrix as a right-aligned table
///
/// Same layout as the CSV report, with columns padded to the widest cell.
pub fn render_skew_table(matrix: &SkewMatrix) -> String {
    let n = matrix.size();
    let label_width = format!("P{}", n.saturating_sub(1)).len().max("Process".len());
    let cell_width = matrix
        .rows()
        .flat_map(|row| row.iter().map(|v| v.to_string().len()))
        .chain((0..n).map(|i| format!("P{}", i).len()))
        .max()
        .unwrap_or(1);

    let mut out = String::new();
    let _ = write!(out, "{:<label_width$}", "Process");
    for col in 0..n {
        let _ = write!(out, "  {:>cell_width$}", format!("P{}", col));
    }
    out.push('\n');

    for (rank, row) in matrix.rows().enumerate() {
        let _ = write!(out, "{:<label_width$}", format!("P{}", rank));
        for value in row {
            let _ = write!(out, "  {:>cell_width$}", value);
        }
        out.push('\n');
    }
    out
}

pub fn max_skew_line(max: &MaxSkew) -> String {
    format!(
        "Maximum clock difference observed: {} ns (P{}, P{})",
        format_with_commas(max.value),
        max.row,
        max.col
    )
}

pub fn report_written_line(path: &Path) -> String {
    format!("Clock difference matrix written to {}", path.display())
}

/// `<Title> Bandwidth: <MB/s> MB/s`
pub fn bandwidth_line(outcome: &ProbeOutcome) -> String {
    format!("{} Bandwidth: {:.6} MB/s", outcome.kind.title(), outcome.bandwidth_mb_per_sec())
}

/// Print the skew table and summary
pub fn print_skew_report(matrix: &SkewMatrix, csv_path: &Path) {
    print!("{}", render_skew_table(matrix));
    println!();
    println!("{}", report_written_line(csv_path));
    if let Some(max) = matrix.max() {
        println!("{}", max_skew_line(&max));
    }
}

/// Render the suite summary: one bandwidth line per probe, then async failures
pub fn render_suite(report: &SuiteReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = writeln!(out, "{}", bandwidth_line(outcome));
    }

    if let Some(async_report) = &report.async_write {
        if !async_report.failures.is_empty() {
            let _ = writeln!(
                out,
                "Async write: {} of {} requests failed ({} written via {})",
                async_report.failures.len(),
                async_report.requests,
                format_bytes(async_report.bytes_written, 2),
                async_report.engine
            );
        }
    }
    out
}

pub fn print_suite(report: &SuiteReport) {
    print!("{}", render_suite(report));
}
