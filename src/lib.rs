//! Micro-benchmarks for two CPU cache effects.
//!
//! - **False sharing**: two workers increment their own counters. When both counters live on
//!   one cache line ([`Unpadded`]) every write invalidates the other core's copy of the line.
//!   Padding the first counter by one line ([`Padded`]) removes the contention.
//! - **Access order**: summing two square matrices where the second one is read transposed
//!   ([`combine_transposed`]) misses the cache on almost every read. Walking the same
//!   computation in small tiles ([`combine_transposed_blocked`]) recovers most of the
//!   row-major ([`combine`]) speed.
//!
//! Timing is left to the caller. See `benches/cache_effects.rs` and the `cache-fx-report`
//! binary.

pub use {
    cache_line::{
        accumulate, CacheLinePad, Counter, CounterPair, CounterRecord, PaddedCounter,
        CACHE_LINE_SIZE,
    },
    config::{Config, CONFIG},
    error::{Error, Result},
    false_sharing::{expected_sum, FalseSharing, Padded, Unpadded, ITERATIONS},
    matrix::{
        combine, combine_transposed, combine_transposed_blocked, create_matrix, operands,
        SquareMatrix, Tiling, Traversal, BLOCK_SIZE, FILL_VALUE, MATRIX_LEN,
    },
    workers::{Job, WorkerPair},
};

pub mod config;
mod cache_line;
mod error;
mod false_sharing;
mod matrix;
pub mod sys;
mod workers;

/// Statistics
pub mod stats {
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

    pub(super) static NUM_UNPINNED_WORKERS: AtomicUsize = AtomicUsize::new(0);

    /// How many workers were asked to pin themselves to a CPU and ended up floating.
    ///
    /// Non-zero values mean the false-sharing workers may have been time-sliced on one core,
    /// which hides the effect being measured.
    pub fn num_unpinned_workers() -> u64 {
        NUM_UNPINNED_WORKERS.load(Relaxed) as _
    }
}
