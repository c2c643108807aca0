//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Precedence, lowest first: built-in defaults, the `--config` file, CLI flags.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::engine::AioEngineKind;
use crate::logging::Level;
use crate::probe::suite::SuitePlan;
use crate::probe::{ProbeKind, ProbeParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default rendezvous port
pub const DEFAULT_PORT: u16 = 7700;

/// Complete harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub skew: SkewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// IO probe suite settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Scratch file the probes run against
    pub path: PathBuf,
    /// Bytes per block
    pub block_size: u64,
    /// Bytes written by each write probe; a multiple of `block_size`
    pub total_bytes: u64,
    /// Random reads per block
    pub read_multiplier: u64,
    pub probes: Vec<ProbeKind>,
    /// Backend for the async batched write probe
    pub aio_engine: AioEngineKind,
    pub keep_file: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("iotest.dat"),
            block_size: 4096,
            total_bytes: 4 * 1024 * 1024 * 1024,
            read_multiplier: 1,
            probes: ProbeKind::ALL.to_vec(),
            aio_engine: AioEngineKind::default(),
            keep_file: false,
        }
    }
}

impl IoConfig {
    pub fn n_blocks(&self) -> u64 {
        if self.block_size == 0 {
            0
        } else {
            self.total_bytes / self.block_size
        }
    }

    /// Build the suite plan; call after validation
    pub fn to_plan(&self) -> SuitePlan {
        SuitePlan {
            params: ProbeParams::new(self.path.clone(), self.block_size as usize, self.n_blocks()),
            probes: self.probes.clone(),
            read_multiplier: self.read_multiplier,
            engine: self.aio_engine,
            keep_file: self.keep_file,
        }
    }
}

/// Clock-skew probe and rendezvous settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewConfig {
    /// Where the aggregator writes the clock difference matrix
    pub report_path: PathBuf,
    /// In-process participants when no coordinator is given
    pub local_participants: usize,
    /// Rendezvous coordinator to join (`host` or `host:port`)
    pub coordinator: Option<String>,
    /// Rank to request from the coordinator
    pub rank: Option<u32>,
    /// Coordinator listen address
    pub listen: String,
    /// Participants per group served by the coordinator
    pub group_size: usize,
    /// Serve groups until interrupted instead of exiting after one
    pub keep_alive: bool,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from(crate::output::csv::DEFAULT_REPORT_FILE),
            local_participants: 2,
            coordinator: None,
            rank: None,
            listen: format!("0.0.0.0:{}", DEFAULT_PORT),
            group_size: 2,
            keep_alive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Level,
    /// Optional log file, appended to
    pub file: Option<PathBuf>,
    /// Suppress console logging
    pub quiet: bool,
    /// ANSI colors on the console
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            file: None,
            quiet: false,
            color: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Machine-readable report destination
    pub json: Option<PathBuf>,
    pub json_pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: None,
            json_pretty: true,
        }
    }
}

impl Config {
    /// Validate complete configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        validator::validate_config(self)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IO: {}", self.io)?;
        writeln!(f, "Skew: {}", self.skew)?;
        write!(f, "Logging: level={:?}, quiet={}", self.logging.level, self.logging.quiet)
    }
}

impl fmt::Display for IoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let probes: Vec<String> = self.probes.iter().map(|p| p.to_string()).collect();
        write!(
            f,
            "path={}, block_size={}, total_bytes={}, read_multiplier={}, probes=[{}], aio_engine={}",
            self.path.display(),
            self.block_size,
            self.total_bytes,
            self.read_multiplier,
            probes.join(","),
            self.aio_engine
        )
    }
}

impl fmt::Display for SkewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coordinator {
            Some(addr) => write!(f, "coordinator={}", addr)?,
            None => write!(f, "local participants={}", self.local_participants)?,
        }
        write!(f, ", report={}", self.report_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.io.block_size, 4096);
        assert_eq!(config.io.total_bytes, 4 << 30);
        assert_eq!(config.io.n_blocks(), 1 << 20);
        assert_eq!(config.io.read_multiplier, 1);
        assert_eq!(config.io.path, PathBuf::from("iotest.dat"));
        assert_eq!(config.io.aio_engine, AioEngineKind::Posix);
        assert_eq!(config.skew.report_path, PathBuf::from("clock_differences.csv"));
        assert_eq!(config.skew.listen, "0.0.0.0:7700");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_plan() {
        let io = IoConfig {
            path: PathBuf::from("/tmp/x.dat"),
            block_size: 8192,
            total_bytes: 8192 * 10,
            read_multiplier: 3,
            probes: vec![ProbeKind::SeqWrite, ProbeKind::RandomRead],
            aio_engine: AioEngineKind::Libaio,
            keep_file: true,
        };
        let plan = io.to_plan();
        assert_eq!(plan.params.block_size, 8192);
        assert_eq!(plan.params.n_blocks, 10);
        assert_eq!(plan.read_multiplier, 3);
        assert_eq!(plan.engine, AioEngineKind::Libaio);
        assert!(plan.keep_file);
    }

    #[test]
    fn test_display_mentions_mode() {
        let mut skew = SkewConfig::default();
        assert!(skew.to_string().contains("local participants=2"));
        skew.coordinator = Some("head:7700".into());
        assert!(skew.to_string().contains("coordinator=head:7700"));
    }
}
