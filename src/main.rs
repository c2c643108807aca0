//! clusterprobe CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use clusterprobe::config::cli::{Cli, Command};
use clusterprobe::config::{toml::load_config, Config, LoggingConfig};
use clusterprobe::distributed::{LocalGroup, RemoteMember, RendezvousCoordinator};
use clusterprobe::logging::{self, ConsoleSink, FileSink, Logger};
use clusterprobe::output::{csv, json, text};
use clusterprobe::probe::suite::run_suite;
use clusterprobe::skew::{run_skew_probe, SkewMatrix};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).context("Configuration validation failed")?;

    let logger = Arc::new(build_logger(&config.logging)?);
    logging::install(logger.clone())?;
    log::info!("clusterprobe v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("configuration:\n{}", config);

    let result = match cli.command {
        Command::Skew(_) => run_skew(&config, logger.clone()),
        Command::Rendezvous(_) => run_rendezvous(&config, logger.clone()),
        Command::Io(_) => run_io(&config, &logger),
    };

    if let Err(ref e) = result {
        logger.fatal(format!("{:#}", e));
    }
    result
}

/// Console sink unless quiet, plus the optional file sink
fn build_logger(config: &LoggingConfig) -> Result<Logger> {
    let mut logger = Logger::new(config.level);
    if !config.quiet {
        logger.add_sink(Box::new(ConsoleSink::new(config.level, config.color)));
    }
    if let Some(ref path) = config.file {
        logger.add_sink(Box::new(FileSink::open(path, config.level)?));
    }
    Ok(logger)
}

fn run_skew(config: &Config, log: Arc<Logger>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let matrix = runtime.block_on(async {
        match config.skew.coordinator {
            Some(ref addr) => run_remote_skew(addr, config.skew.rank, &log).await,
            None => run_local_skew(config.skew.local_participants, log.clone()).await,
        }
    })?;

    let Some(matrix) = matrix else {
        log.info("sample contributed; rank 0 reports the matrix");
        return Ok(());
    };

    let report_path = &config.skew.report_path;
    csv::write_skew_csv(report_path, &matrix)?;
    text::print_skew_report(&matrix, report_path);

    if let Some(ref path) = config.output.json {
        let report = json::build_skew_report(&matrix, Some(report_path.as_path()));
        json::write_json_output(path, &report, config.output.json_pretty)?;
        log.info(format!("JSON report written to {}", path.display()));
    }
    Ok(())
}

async fn run_remote_skew(addr: &str, rank: Option<u32>, log: &Logger) -> Result<Option<SkewMatrix>> {
    let mut member = RemoteMember::connect(addr, rank, log).await?;
    let matrix = run_skew_probe(&mut member, log).await?;
    member.leave().await?;
    Ok(matrix)
}

/// One task per in-process participant; the first failure wins
async fn run_local_skew(participants: usize, log: Arc<Logger>) -> Result<Option<SkewMatrix>> {
    let mut handles = Vec::with_capacity(participants);
    for mut member in LocalGroup::new(participants) {
        let log = log.clone();
        handles.push(tokio::spawn(async move { run_skew_probe(&mut member, &log).await }));
    }

    let mut aggregated = None;
    let mut first_error = None;
    for handle in handles {
        match handle.await.context("Skew participant task failed")? {
            Ok(Some(matrix)) => aggregated = Some(matrix),
            Ok(None) => {}
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(aggregated),
    }
}

fn run_rendezvous(config: &Config, log: Arc<Logger>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let coordinator = RendezvousCoordinator::bind(&config.skew.listen, config.skew.group_size, log)
            .await
            .context("Failed to start rendezvous coordinator")?;
        coordinator.serve(config.skew.keep_alive).await
    })
}

fn run_io(config: &Config, log: &Logger) -> Result<()> {
    let plan = config.io.to_plan();
    let report = run_suite(&plan, log)?;
    text::print_suite(&report);

    if let Some(ref path) = config.output.json {
        json::write_json_output(path, &json::build_suite_report(&report), config.output.json_pretty)?;
        log.info(format!("JSON report written to {}", path.display()));
    }
    Ok(())
}
