//! clusterprobe - Cluster diagnostic harness
//!
//! clusterprobe bundles two measurement facilities used when bringing up or
//! debugging a cluster:
//!
//! - **Clock-skew probe**: a group of cooperating participants rendezvous at a
//!   barrier, sample their wall clocks, exchange the samples with an all-gather
//!   and the aggregator (rank 0) reports the full pairwise skew matrix.
//! - **IO probes**: sequential write, sequential read, random read and
//!   asynchronous batched write throughput against a single scratch file.
//!
//! # Architecture
//!
//! - **Bounded PRNG**: PCG32 with rejection-sampled bounded output ([`distribution`])
//! - **IO probe suite**: four probes plus a suite runner ([`probe`]) over
//!   pluggable async write engines ([`engine`])
//! - **Collective rendezvous**: barrier and all-gather, in-process or over TCP
//!   ([`distributed`])
//! - **Skew analyzer**: pairwise difference matrix and reports ([`skew`], [`output`])

pub mod config;
pub mod distributed;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod probe;
pub mod skew;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use error::HarnessError;
pub use logging::{Level, Logger};

/// Result type used by the wire and binary layers
pub type Result<T> = anyhow::Result<T>;
