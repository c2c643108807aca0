//! Leveled logging with pluggable sinks
//!
//! The measurement core never reaches for a process-wide logger. Callers build a
//! [`Logger`], register any number of sinks in the order they should fire, and
//! hand a reference to the code that wants to narrate progress. Log output is
//! purely informational: [`Logger::disabled`] must not change any result.
//!
//! The binary additionally installs the same logger behind the `log` facade via
//! [`install`], so `log::info!` and friends end up in the same sinks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::Location;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Local};

/// Log severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            Level::Trace => "\x1b[94m",
            Level::Debug => "\x1b[36m",
            Level::Info => "\x1b[32m",
            Level::Warn => "\x1b[33m",
            Level::Error => "\x1b[31m",
            Level::Fatal => "\x1b[35m",
        }
    }

    fn from_log(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }

    fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error | Level::Fatal => log::LevelFilter::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single formatted log event handed to every sink
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub level: Level,
    pub time: DateTime<Local>,
    pub file: &'a str,
    pub line: u32,
    pub message: &'a str,
}

/// Destination for log records
pub trait LogSink: Send + Sync {
    /// Minimum level this sink accepts
    fn level(&self) -> Level;

    fn write(&self, record: &LogRecord<'_>);
}

/// Writes `HH:MM:SS LEVEL file:line: message` lines to stderr
pub struct ConsoleSink {
    level: Level,
    color: bool,
}

impl ConsoleSink {
    pub fn new(level: Level, color: bool) -> Self {
        Self { level, color }
    }
}

impl LogSink for ConsoleSink {
    fn level(&self) -> Level {
        self.level
    }

    fn write(&self, record: &LogRecord<'_>) {
        let time = record.time.format("%H:%M:%S");
        let mut stderr = std::io::stderr().lock();
        let _ = if self.color {
            writeln!(
                stderr,
                "{} {}{:<5}\x1b[0m \x1b[90m{}:{}:\x1b[0m {}",
                time,
                record.level.color(),
                record.level.as_str(),
                record.file,
                record.line,
                record.message
            )
        } else {
            writeln!(
                stderr,
                "{} {:<5} {}:{}: {}",
                time,
                record.level.as_str(),
                record.file,
                record.line,
                record.message
            )
        };
    }
}

/// Appends `YYYY-MM-DD HH:MM:SS LEVEL file:line: message` lines to a file
pub struct FileSink {
    level: Level,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &Path, level: Level) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        Ok(Self {
            level,
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn level(&self) -> Level {
        self.level
    }

    fn write(&self, record: &LogRecord<'_>) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(
                file,
                "{} {:<5} {}:{}: {}",
                record.time.format("%Y-%m-%d %H:%M:%S"),
                record.level.as_str(),
                record.file,
                record.line,
                record.message
            );
            let _ = file.flush();
        }
    }
}

/// Keeps records in memory; handy for asserting on narration in tests
#[derive(Clone, Default)]
pub struct MemorySink {
    level: Level,
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemorySink {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn level(&self) -> Level {
        self.level
    }

    fn write(&self, record: &LogRecord<'_>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((record.level, record.message.to_string()));
        }
    }
}

/// Level-gated dispatcher over an ordered list of sinks
pub struct Logger {
    level: Level,
    quiet: bool,
    sinks: Vec<Box<dyn LogSink>>,
}

impl Logger {
    /// Logger with a threshold and no sinks yet
    pub fn new(level: Level) -> Self {
        Self {
            level,
            quiet: false,
            sinks: Vec::new(),
        }
    }

    /// Logger that drops everything
    pub fn disabled() -> Self {
        Self {
            level: Level::Fatal,
            quiet: true,
            sinks: Vec::new(),
        }
    }

    /// Register a sink; sinks fire in registration order
    pub fn add_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// True if a record at `level` would reach at least one sink
    pub fn enabled(&self, level: Level) -> bool {
        !self.quiet && level >= self.level && self.sinks.iter().any(|s| level >= s.level())
    }

    /// Dispatch a message; formatting is skipped when nothing would receive it
    #[track_caller]
    pub fn emit(&self, level: Level, message: impl fmt::Display) {
        let location = Location::caller();
        self.dispatch(level, location.file(), location.line(), &message);
    }

    fn dispatch(&self, level: Level, file: &str, line: u32, message: &dyn fmt::Display) {
        if !self.enabled(level) {
            return;
        }
        let text = message.to_string();
        let record = LogRecord {
            level,
            time: Local::now(),
            file,
            line,
            message: &text,
        };
        for sink in &self.sinks {
            if level >= sink.level() {
                sink.write(&record);
            }
        }
    }

    #[track_caller]
    pub fn trace(&self, message: impl fmt::Display) {
        self.emit(Level::Trace, message);
    }

    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display) {
        self.emit(Level::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.emit(Level::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.emit(Level::Warn, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.emit(Level::Error, message);
    }

    #[track_caller]
    pub fn fatal(&self, message: impl fmt::Display) {
        self.emit(Level::Fatal, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("quiet", &self.quiet)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Adapter exposing a shared [`Logger`] through the `log` facade
struct FacadeBridge(Arc<Logger>);

impl log::Log for FacadeBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.0.enabled(Level::from_log(metadata.level()))
    }

    fn log(&self, record: &log::Record) {
        self.0.dispatch(
            Level::from_log(record.level()),
            record.file().unwrap_or(record.target()),
            record.line().unwrap_or(0),
            record.args(),
        );
    }

    fn flush(&self) {}
}

/// Route `log` crate macros into `logger`
///
/// Fails if another facade logger was installed first.
pub fn install(logger: Arc<Logger>) -> anyhow::Result<()> {
    let max = logger.level().to_level_filter();
    log::set_boxed_logger(Box::new(FacadeBridge(logger)))
        .map_err(|e| anyhow::anyhow!("Failed to install log facade: {}", e))?;
    log::set_max_level(max);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
        assert_eq!(Level::default(), Level::Info);
    }

    #[test]
    fn test_level_gating() {
        let sink = MemorySink::new(Level::Trace);
        let logger = Logger::new(Level::Info).with_sink(Box::new(sink.clone()));

        logger.debug("hidden");
        logger.info("shown");
        logger.error(format_args!("value {}", 42));

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (Level::Info, "shown".to_string()));
        assert_eq!(lines[1], (Level::Error, "value 42".to_string()));
    }

    #[test]
    fn test_per_sink_threshold_and_order() {
        let all = MemorySink::new(Level::Trace);
        let errors_only = MemorySink::new(Level::Error);
        let logger = Logger::new(Level::Trace)
            .with_sink(Box::new(all.clone()))
            .with_sink(Box::new(errors_only.clone()));

        logger.trace("t");
        logger.warn("w");
        logger.fatal("f");

        assert_eq!(all.lines().len(), 3);
        assert_eq!(errors_only.lines(), vec![(Level::Fatal, "f".to_string())]);
        assert_eq!(logger.sink_count(), 2);
    }

    #[test]
    fn test_disabled_drops_everything() {
        let mut disabled = Logger::disabled();
        let sink = MemorySink::new(Level::Trace);
        disabled.add_sink(Box::new(sink.clone()));
        disabled.fatal("dropped");
        assert!(sink.lines().is_empty());

        let disabled = Logger::disabled();
        assert!(!disabled.enabled(Level::Fatal));
        disabled.fatal("nowhere");
    }

    #[test]
    fn test_many_sinks_no_cap() {
        let mut logger = Logger::new(Level::Info);
        let sinks: Vec<MemorySink> = (0..64).map(|_| MemorySink::new(Level::Info)).collect();
        for sink in &sinks {
            logger.add_sink(Box::new(sink.clone()));
        }
        logger.info("fan out");
        assert!(sinks.iter().all(|s| s.lines().len() == 1));
    }

    #[test]
    fn test_file_sink_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("probe.log");

        let logger = Logger::new(Level::Debug)
            .with_sink(Box::new(FileSink::open(&path, Level::Debug).unwrap()));
        logger.info("written to file");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("INFO "));
        assert!(contents.contains("logging.rs:"));
        assert!(contents.trim_end().ends_with("written to file"));
    }
}
