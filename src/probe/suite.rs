//! Probe suite runner
//!
//! Runs the selected probes in a fixed order (sequential write, sequential
//! read, random read, async write) against one scratch file and collects their
//! outcomes. The first fatal probe error stops the suite.

use super::async_write::{async_batched_write, AsyncWriteReport};
use super::random::random_read;
use super::sequential::{sequential_read, sequential_write};
use super::{ProbeKind, ProbeOutcome, ProbeParams};
use crate::engine::{create_engine, AioEngineKind};
use crate::error::HarnessError;
use crate::logging::Logger;
use crate::util::units::format_bytes;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// What the suite should run
#[derive(Debug, Clone)]
pub struct SuitePlan {
    pub params: ProbeParams,
    pub probes: Vec<ProbeKind>,
    /// Random reads per block
    pub read_multiplier: u64,
    pub engine: AioEngineKind,
    /// Keep the scratch file after the suite; a file that existed before the
    /// run is always kept
    pub keep_file: bool,
}

impl SuitePlan {
    fn selected(&self, kind: ProbeKind) -> bool {
        self.probes.contains(&kind)
    }

    fn creates_file(&self) -> bool {
        self.selected(ProbeKind::SeqWrite) || self.selected(ProbeKind::AsyncWrite)
    }
}

/// Collected results of one suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub path: PathBuf,
    pub block_size: usize,
    pub n_blocks: u64,
    pub outcomes: Vec<ProbeOutcome>,
    pub async_write: Option<AsyncWriteReport>,
}

/// Removes the scratch file when dropped, unless it is being kept
struct ScratchFile<'a> {
    path: &'a Path,
    remove: bool,
    log: &'a Logger,
}

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        if !self.remove {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => self.log.debug(format!("removed {}", self.path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => self.log.warn(format!("failed to remove {}: {}", self.path.display(), e)),
        }
    }
}

/// Run the selected probes in order
pub fn run_suite(plan: &SuitePlan, log: &Logger) -> Result<SuiteReport, HarnessError> {
    let params = &plan.params;
    params.check()?;
    if plan.probes.is_empty() {
        return Err(HarnessError::Configuration("no probes selected".into()));
    }
    preflight(plan)?;

    let existed = params.path.exists();
    let _scratch = ScratchFile {
        path: &params.path,
        remove: plan.creates_file() && !plan.keep_file && !existed,
        log,
    };

    log.info(format!(
        "IO suite: {} in {} blocks of {} on {}",
        format_bytes(params.file_bytes(), 2),
        params.n_blocks,
        params.block_size,
        params.path.display()
    ));

    let mut report = SuiteReport {
        path: params.path.clone(),
        block_size: params.block_size,
        n_blocks: params.n_blocks,
        outcomes: Vec::new(),
        async_write: None,
    };

    for kind in ProbeKind::ALL.into_iter().filter(|k| plan.selected(*k)) {
        log.info(format!("running {} probe", kind));
        let outcome = match kind {
            ProbeKind::SeqWrite => sequential_write(params, log),
            ProbeKind::SeqRead => sequential_read(params, log),
            ProbeKind::RandomRead => {
                let n_reads = params.n_blocks.saturating_mul(plan.read_multiplier);
                random_read(params, n_reads, log)
            }
            ProbeKind::AsyncWrite => {
                let mut engine = create_engine(plan.engine).map_err(|e| {
                    HarnessError::Configuration(format!("async engine {} unavailable: {:#}", plan.engine, e))
                })?;
                async_batched_write(params, engine.as_mut(), log).map(|async_report| {
                    let outcome = async_report.outcome();
                    report.async_write = Some(async_report);
                    outcome
                })
            }
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                log.error(format!("{} probe failed: {}", kind, e));
                return Err(e);
            }
        };
        log.info(format!(
            "{} probe: {} in {} ops, {:.6} MB/s",
            kind,
            format_bytes(outcome.bytes, 2),
            outcome.operations,
            outcome.bandwidth_mb_per_sec()
        ));
        report.outcomes.push(outcome);
    }

    Ok(report)
}

/// Read probes need a file of at least `n_blocks * block_size` bytes; when the
/// suite does not write it first, it must already exist
fn preflight(plan: &SuitePlan) -> Result<(), HarnessError> {
    let needs_existing = plan.probes.iter().any(|k| k.is_read()) && !plan.selected(ProbeKind::SeqWrite);
    if !needs_existing {
        return Ok(());
    }

    let params = &plan.params;
    let len = std::fs::metadata(&params.path).map(|m| m.len()).unwrap_or(0);
    if len < params.file_bytes() {
        return Err(HarnessError::Configuration(format!(
            "read probes need {} with at least {} bytes (found {}); select seq-write or create it first",
            params.path.display(),
            params.file_bytes(),
            len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use tempfile::TempDir;

    fn plan(dir: &TempDir, probes: Vec<ProbeKind>) -> SuitePlan {
        SuitePlan {
            params: ProbeParams::new(dir.path().join("suite.dat"), 4096, 16),
            probes,
            read_multiplier: 2,
            engine: AioEngineKind::Posix,
            keep_file: false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_suite_runs_in_order_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        // Selection order does not matter
        let plan = plan(&temp_dir, vec![ProbeKind::AsyncWrite, ProbeKind::SeqRead, ProbeKind::RandomRead, ProbeKind::SeqWrite]);

        let report = run_suite(&plan, &Logger::disabled()).unwrap();
        let kinds: Vec<ProbeKind> = report.outcomes.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, ProbeKind::ALL.to_vec());
        assert_eq!(report.outcomes[0].bytes, 65536);
        assert_eq!(report.outcomes[2].operations, 32);
        assert!(report.async_write.as_ref().unwrap().failures.is_empty());
        assert!(!plan.params.path.exists());
    }

    #[test]
    fn test_keep_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut plan = plan(&temp_dir, vec![ProbeKind::SeqWrite]);
        plan.keep_file = true;

        run_suite(&plan, &Logger::disabled()).unwrap();
        assert_eq!(std::fs::metadata(&plan.params.path).unwrap().len(), 65536);
    }

    #[test]
    fn test_reads_without_file_fail_before_running() {
        let temp_dir = TempDir::new().unwrap();
        let plan = plan(&temp_dir, vec![ProbeKind::SeqRead]);

        let err = run_suite(&plan, &Logger::disabled()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_reads_on_existing_file_keep_it() {
        let temp_dir = TempDir::new().unwrap();
        let plan = plan(&temp_dir, vec![ProbeKind::SeqRead, ProbeKind::RandomRead]);
        std::fs::write(&plan.params.path, vec![0u8; 65536]).unwrap();

        let report = run_suite(&plan, &Logger::disabled()).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.async_write.is_none());
        assert!(plan.params.path.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_existing_file_survives_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        let plan = plan(&temp_dir, vec![ProbeKind::SeqRead, ProbeKind::AsyncWrite]);
        std::fs::write(&plan.params.path, vec![7u8; 65536]).unwrap();

        let report = run_suite(&plan, &Logger::disabled()).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(std::fs::metadata(&plan.params.path).unwrap().len(), 65536);
    }

    #[test]
    fn test_existing_file_kept_after_seq_write() {
        let temp_dir = TempDir::new().unwrap();
        let plan = plan(&temp_dir, vec![ProbeKind::SeqWrite]);
        std::fs::write(&plan.params.path, b"user data").unwrap();

        run_suite(&plan, &Logger::disabled()).unwrap();
        assert!(plan.params.path.exists());
    }

    #[test]
    fn test_empty_selection() {
        let temp_dir = TempDir::new().unwrap();
        let plan = plan(&temp_dir, Vec::new());
        assert!(run_suite(&plan, &Logger::disabled()).is_err());
    }
}
