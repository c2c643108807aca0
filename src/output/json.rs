//! JSON output formatting
//!
//! Machine-readable versions of the skew and IO suite reports, written with
//! `serde_json`. Both carry a small header identifying the host and the time
//! the report was produced.

use crate::probe::async_write::RequestFailure;
use crate::probe::suite::SuiteReport;
use crate::probe::ProbeKind;
use crate::skew::{MaxSkew, SkewMatrix};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Where and when a report was produced
#[derive(Debug, Clone, Serialize)]
pub struct JsonReportInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// RFC 3339 wall-clock time
    pub generated_at: String,
}

impl JsonReportInfo {
    pub fn now() -> Self {
        Self {
            hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Skew probe result as seen by the aggregator
#[derive(Debug, Clone, Serialize)]
pub struct JsonSkewReport {
    pub info: JsonReportInfo,
    pub participants: usize,
    /// Wall-clock samples in nanoseconds, by rank
    pub samples: Vec<i64>,
    /// Row-major differences, `matrix[i][j] = samples[i] - samples[j]`
    pub matrix: Vec<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<MaxSkew>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
}

pub fn build_skew_report(matrix: &SkewMatrix, csv_path: Option<&Path>) -> JsonSkewReport {
    JsonSkewReport {
        info: JsonReportInfo::now(),
        participants: matrix.size(),
        samples: matrix.samples().to_vec(),
        matrix: matrix.rows().map(|row| row.to_vec()).collect(),
        max: matrix.max(),
        csv_path: csv_path.map(|p| p.display().to_string()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonProbeResult {
    pub probe: ProbeKind,
    pub title: &'static str,
    pub operations: u64,
    pub bytes: u64,
    pub elapsed_ns: u64,
    pub mb_per_sec: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSuiteReport {
    pub info: JsonReportInfo,
    pub path: String,
    pub block_size: usize,
    pub n_blocks: u64,
    pub probes: Vec<JsonProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_engine: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub async_failures: Vec<RequestFailure>,
}

pub fn build_suite_report(report: &SuiteReport) -> JsonSuiteReport {
    JsonSuiteReport {
        info: JsonReportInfo::now(),
        path: report.path.display().to_string(),
        block_size: report.block_size,
        n_blocks: report.n_blocks,
        probes: report
            .outcomes
            .iter()
            .map(|o| JsonProbeResult {
                probe: o.kind,
                title: o.kind.title(),
                operations: o.operations,
                bytes: o.bytes,
                elapsed_ns: o.elapsed_ns,
                mb_per_sec: o.bandwidth_mb_per_sec(),
            })
            .collect(),
        async_engine: report.async_write.as_ref().map(|a| a.engine.clone()),
        async_failures: report
            .async_write
            .as_ref()
            .map(|a| a.failures.clone())
            .unwrap_or_default(),
    }
}

/// Write any report to `output_path`
pub fn write_json_output<T: Serialize>(output_path: &Path, report: &T, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, report)?;
    } else {
        serde_json::to_writer(writer, report)?;
    }

    Ok(())
}
