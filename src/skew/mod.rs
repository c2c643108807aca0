//! Clock-skew probe
//!
//! Every participant waits at a barrier, samples its wall clock as soon as
//! the barrier releases, and contributes the sample to an all-gather. The
//! aggregator (rank 0) turns the rank-ordered samples into a [`SkewMatrix`];
//! every other rank is done once its sample has been contributed.
//!
//! The clock is `CLOCK_REALTIME` on purpose: the probe measures how far
//! independently-set wall clocks disagree.

pub mod matrix;

pub use matrix::{MaxSkew, SkewMatrix};

use crate::distributed::Collective;
use crate::error::HarnessError;
use crate::logging::Logger;
use crate::util::time::wall_clock_ns;

/// Rank that builds and reports the matrix
pub const AGGREGATOR_RANK: usize = 0;

/// Run the skew probe on `group` using the wall clock
///
/// Returns `Some(matrix)` on the aggregator and `None` everywhere else.
/// A group of fewer than two participants aborts the whole group with a
/// configuration error before any collective is entered.
pub async fn run_skew_probe<C: Collective>(group: &mut C, log: &Logger) -> Result<Option<SkewMatrix>, HarnessError> {
    run_skew_probe_with(group, wall_clock_ns, log).await
}

/// [`run_skew_probe`] with an injected clock
pub async fn run_skew_probe_with<C, F>(
    group: &mut C,
    mut clock: F,
    log: &Logger,
) -> Result<Option<SkewMatrix>, HarnessError>
where
    C: Collective,
    F: FnMut() -> i64,
{
    let rank = group.rank();
    let size = group.size();

    if size < 2 {
        let reason = format!("skew probe needs at least 2 participants, got {}", size);
        log.error(&reason);
        group.abort(&reason).await;
        return Err(HarnessError::Configuration(reason));
    }

    log.debug(format!("rank {} of {} waiting at barrier", rank, size));
    group.barrier().await?;
    let sample = clock();
    log.trace(format!("rank {} sampled {} ns", rank, sample));

    let samples = group.all_gather(sample).await?;
    if rank != AGGREGATOR_RANK {
        log.debug(format!("rank {} contributed its sample", rank));
        return Ok(None);
    }

    let matrix = SkewMatrix::from_samples(&samples);
    if let Some(max) = matrix.max() {
        log.info(format!("maximum skew {} ns between P{} and P{}", max.value, max.row, max.col));
    }
    Ok(Some(matrix))
}
