//! CLI to Config conversion utilities

use crate::config::cli;
use crate::engine::AioEngineKind;
use crate::logging::Level;
use anyhow::{Context, Result};

/// Parse a size string (e.g., "4G", "256M", "4k") to bytes
///
/// Suffixes are binary (`k` = 1024).
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with('k') || s.ends_with("kb") {
        (s.trim_end_matches("kb").trim_end_matches('k'), 1024u64)
    } else if s.ends_with('m') || s.ends_with("mb") {
        (s.trim_end_matches("mb").trim_end_matches('m'), 1024 * 1024)
    } else if s.ends_with('g') || s.ends_with("gb") {
        (s.trim_end_matches("gb").trim_end_matches('g'), 1024 * 1024 * 1024)
    } else if s.ends_with('t') || s.ends_with("tb") {
        (s.trim_end_matches("tb").trim_end_matches('t'), 1024 * 1024 * 1024 * 1024)
    } else {
        (s.trim_end_matches('b'), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size format: {}", s))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Size out of range: {}", s))
}

pub fn convert_log_level(level: cli::LogLevel) -> Level {
    match level {
        cli::LogLevel::Trace => Level::Trace,
        cli::LogLevel::Debug => Level::Debug,
        cli::LogLevel::Info => Level::Info,
        cli::LogLevel::Warn => Level::Warn,
        cli::LogLevel::Error => Level::Error,
        cli::LogLevel::Fatal => Level::Fatal,
    }
}

pub fn convert_engine_kind(engine: cli::AioEngineArg) -> AioEngineKind {
    match engine {
        cli::AioEngineArg::Posix => AioEngineKind::Posix,
        cli::AioEngineArg::Libaio => AioEngineKind::Libaio,
    }
}

/// Append `default_port` to a bare host name
///
/// `head` becomes `head:7700`; `head:9000`, `10.0.0.1:9000` and
/// `[::1]:9000` are kept as given.
pub fn with_default_port(addr: &str, default_port: u16) -> String {
    let addr = addr.trim();
    if addr.parse::<std::net::SocketAddr>().is_ok() {
        return addr.to_string();
    }
    if addr.parse::<std::net::Ipv6Addr>().is_ok() {
        return format!("[{}]:{}", addr, default_port);
    }
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, default_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("4KB").unwrap(), 4096);
        assert_eq!(parse_size("256M").unwrap(), 256 << 20);
        assert_eq!(parse_size(" 4G ").unwrap(), 4 << 30);
        assert_eq!(parse_size("1t").unwrap(), 1 << 40);
        assert_eq!(parse_size("512b").unwrap(), 512);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("four k").is_err());
        assert!(parse_size("-1k").is_err());
        assert!(parse_size("99999999999t").is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(convert_log_level(cli::LogLevel::Warn), Level::Warn);
        assert_eq!(convert_engine_kind(cli::AioEngineArg::Libaio), AioEngineKind::Libaio);
    }

    #[test]
    fn test_with_default_port() {
        assert_eq!(with_default_port("head", 7700), "head:7700");
        assert_eq!(with_default_port("head:9000", 7700), "head:9000");
        assert_eq!(with_default_port("10.0.0.1", 7700), "10.0.0.1:7700");
        assert_eq!(with_default_port("[::1]:9000", 7700), "[::1]:9000");
        assert_eq!(with_default_port("::1", 7700), "[::1]:7700");
    }
}
