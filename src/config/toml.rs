//! TOML configuration file parsing
//!
//! ```toml
//! [io]
//! path = "/scratch/iotest.dat"
//! block_size = 65536
//! total_bytes = 1073741824
//! probes = ["seq-write", "seq-read", "random-read"]
//! aio_engine = "libaio"
//!
//! [skew]
//! coordinator = "head-node"
//! report_path = "clock_differences.csv"
//!
//! [logging]
//! level = "debug"
//! ```

use super::*;
use crate::config::cli::{Cli, Command};
use crate::config::cli_convert::{convert_engine_kind, convert_log_level, parse_size, with_default_port};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(level) = cli.log_level {
        config.logging.level = convert_log_level(level);
    }
    if let Some(ref file) = cli.log_file {
        config.logging.file = Some(file.clone());
    }
    if cli.quiet {
        config.logging.quiet = true;
    }
    if cli.color {
        config.logging.color = true;
    }
    if let Some(ref json) = cli.json {
        config.output.json = Some(json.clone());
    }

    match &cli.command {
        Command::Skew(args) => {
            if let Some(n) = args.local {
                config.skew.local_participants = n;
                config.skew.coordinator = None;
            }
            if let Some(ref addr) = args.coordinator {
                config.skew.coordinator = Some(addr.clone());
            }
            if args.rank.is_some() {
                config.skew.rank = args.rank;
            }
            if let Some(ref report) = args.report {
                config.skew.report_path = report.clone();
            }
        }
        Command::Rendezvous(args) => {
            if let Some(ref listen) = args.listen {
                config.skew.listen = listen.clone();
            }
            if let Some(size) = args.size {
                config.skew.group_size = size;
            }
            if args.keep_alive {
                config.skew.keep_alive = true;
            }
        }
        Command::Io(args) => {
            if let Some(ref path) = args.path {
                config.io.path = path.clone();
            }
            if let Some(ref block_size) = args.block_size {
                config.io.block_size = parse_size(block_size).context("Invalid --block-size")?;
            }
            if let Some(ref total) = args.total_bytes {
                config.io.total_bytes = parse_size(total).context("Invalid --total-bytes")?;
            }
            if let Some(multiplier) = args.read_multiplier {
                config.io.read_multiplier = multiplier;
            }
            if let Some(ref probes) = args.probes {
                config.io.probes = probes.clone();
            }
            if let Some(engine) = args.aio_engine {
                config.io.aio_engine = convert_engine_kind(engine);
            }
            if args.keep_file {
                config.io.keep_file = true;
            }
        }
    }

    config.skew.coordinator = config
        .skew
        .coordinator
        .map(|addr| with_default_port(&addr, DEFAULT_PORT));

    Ok(config)
}

/// Defaults, then the config file if given, then CLI flags; validated
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    let config = merge_cli_with_config(cli, base)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AioEngineKind;
    use crate::probe::ProbeKind;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = parse_toml_string(
            r#"
            [io]
            block_size = 65536
            probes = ["seq-write", "random-read"]
            aio_engine = "libaio"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.io.block_size, 65536);
        assert_eq!(config.io.total_bytes, 4 << 30);
        assert_eq!(config.io.probes, vec![ProbeKind::SeqWrite, ProbeKind::RandomRead]);
        assert_eq!(config.io.aio_engine, AioEngineKind::Libaio);
        assert_eq!(config.logging.level, Level::Debug);
        assert_eq!(config.skew, SkewConfig::default());
    }

    #[test]
    fn test_unknown_probe_rejected() {
        assert!(parse_toml_string("[io]\nprobes = [\"mmap-read\"]\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[io]\nblock_size = 65536\nread_multiplier = 4\n[logging]\nlevel = \"warn\"").unwrap();

        let cli = Cli::try_parse_from([
            "clusterprobe",
            "--config",
            file.path().to_str().unwrap(),
            "--log-level",
            "trace",
            "io",
            "-b",
            "8k",
            "-s",
            "1M",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.io.block_size, 8192);
        assert_eq!(config.io.total_bytes, 1 << 20);
        assert_eq!(config.io.read_multiplier, 4);
        assert_eq!(config.logging.level, Level::Trace);
    }

    #[test]
    fn test_skew_merge() {
        let cli = Cli::try_parse_from(["clusterprobe", "skew", "--coordinator", "head", "--rank", "3"]).unwrap();
        let config = merge_cli_with_config(&cli, Config::default()).unwrap();
        assert_eq!(config.skew.coordinator.as_deref(), Some("head:7700"));
        assert_eq!(config.skew.rank, Some(3));

        let mut from_file = Config::default();
        from_file.skew.coordinator = Some("head:7700".into());
        let cli = Cli::try_parse_from(["clusterprobe", "skew", "--local", "5"]).unwrap();
        let config = merge_cli_with_config(&cli, from_file).unwrap();
        assert_eq!(config.skew.coordinator, None);
        assert_eq!(config.skew.local_participants, 5);
    }

    #[test]
    fn test_invalid_merged_config_rejected() {
        let cli = Cli::try_parse_from(["clusterprobe", "io", "-b", "4k", "-s", "6k"]).unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("multiple of block_size"));
    }

    #[test]
    fn test_missing_file() {
        let cli = Cli::try_parse_from(["clusterprobe", "--config", "/nonexistent/clusterprobe.toml", "io"]).unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
