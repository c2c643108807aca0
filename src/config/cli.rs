//! CLI argument parsing using clap

use crate::probe::ProbeKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Async write backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AioEngineArg {
    /// POSIX AIO (aio_write / aio_error / aio_return)
    Posix,
    /// Linux kernel AIO (io_submit / io_getevents)
    Libaio,
}

/// clusterprobe - cluster clock-skew and IO throughput diagnostics
#[derive(Parser, Debug)]
#[command(name = "clusterprobe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file; CLI flags override its values
    #[arg(long, global = true, env = "CLUSTERPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Also append log records to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Suppress console logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Colorize console log output
    #[arg(long, global = true)]
    pub color: bool,

    /// Write a JSON report to this file
    #[arg(long, global = true)]
    pub json: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Measure wall-clock disagreement across participants
    Skew(SkewArgs),
    /// Run the rendezvous coordinator for remote skew participants
    Rendezvous(RendezvousArgs),
    /// Run the IO probe suite
    Io(IoArgs),
}

#[derive(Args, Debug, Default)]
pub struct SkewArgs {
    /// Run N participants in this process
    #[arg(long, value_name = "N", conflicts_with = "coordinator")]
    pub local: Option<usize>,

    /// Join the rendezvous coordinator at HOST[:PORT]
    #[arg(long, value_name = "HOST:PORT", env = "CLUSTERPROBE_COORDINATOR")]
    pub coordinator: Option<String>,

    /// Rank to request from the coordinator
    #[arg(long, requires = "coordinator")]
    pub rank: Option<u32>,

    /// Clock difference matrix output (aggregator only)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct RendezvousArgs {
    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Participants per group
    #[arg(long, value_name = "N")]
    pub size: Option<usize>,

    /// Keep serving groups after the first one completes
    #[arg(long)]
    pub keep_alive: bool,
}

#[derive(Args, Debug, Default)]
pub struct IoArgs {
    /// Scratch file path
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Block size (e.g., 4k, 64k, 1M)
    #[arg(short = 'b', long)]
    pub block_size: Option<String>,

    /// Bytes written per write probe (e.g., 256M, 4G)
    #[arg(short = 's', long)]
    pub total_bytes: Option<String>,

    /// Random reads per block
    #[arg(long)]
    pub read_multiplier: Option<u64>,

    /// Probes to run (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub probes: Option<Vec<ProbeKind>>,

    /// Backend for the async write probe
    #[arg(long, value_enum)]
    pub aio_engine: Option<AioEngineArg>,

    /// Keep the scratch file after the suite
    #[arg(long)]
    pub keep_file: bool,
}
