//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_io(&config.io)?;
    validate_skew(&config.skew)?;
    Ok(())
}

/// Validate the IO probe settings
pub fn validate_io(io: &IoConfig) -> Result<()> {
    if io.block_size == 0 {
        anyhow::bail!("block_size must be greater than 0");
    }
    if io.block_size > u32::MAX as u64 {
        anyhow::bail!("block_size {} does not fit in 32 bits", io.block_size);
    }
    if io.total_bytes == 0 {
        anyhow::bail!("total_bytes must be greater than 0");
    }
    if io.total_bytes % io.block_size != 0 {
        anyhow::bail!(
            "total_bytes ({}) must be a multiple of block_size ({})",
            io.total_bytes,
            io.block_size
        );
    }
    if io.n_blocks() > u32::MAX as u64 {
        anyhow::bail!(
            "total_bytes / block_size = {} blocks does not fit in 32 bits",
            io.n_blocks()
        );
    }
    if io.read_multiplier == 0 {
        anyhow::bail!("read_multiplier must be at least 1");
    }
    if io.probes.is_empty() {
        anyhow::bail!("at least one probe must be selected");
    }
    if io.path.as_os_str().is_empty() {
        anyhow::bail!("io path must not be empty");
    }
    Ok(())
}

/// Validate the skew and rendezvous settings
///
/// A local run with a single participant is left to the probe, which aborts
/// it as a configuration error.
pub fn validate_skew(skew: &SkewConfig) -> Result<()> {
    if skew.local_participants == 0 {
        anyhow::bail!("local_participants must be at least 1");
    }
    if skew.group_size < 2 {
        anyhow::bail!(
            "rendezvous group size must be at least 2, got {}",
            skew.group_size
        );
    }
    if skew.group_size > u32::MAX as usize {
        anyhow::bail!("rendezvous group size {} is too large", skew.group_size);
    }
    if skew.report_path.as_os_str().is_empty() {
        anyhow::bail!("report_path must not be empty");
    }
    if let Some(ref addr) = skew.coordinator {
        if addr.trim().is_empty() {
            anyhow::bail!("coordinator address must not be empty");
        }
    }
    Ok(())
}
