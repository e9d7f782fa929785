use {
    crate::{
        cache_line::{
            accumulate, Counter, CounterPair, CounterRecord, PaddedCounter, CACHE_LINE_SIZE,
        },
        config::Config,
        error::Result,
        sys::CACHE_LINE_SIZE_HINT,
        workers::WorkerPair,
    },
    std::sync::Arc,
};

/// Accumulation steps each worker performs per repetition.
pub const ITERATIONS: i64 = 1_000_000;

/// Two counters on one cache line.
pub type Unpadded = FalseSharing<Counter, Counter>;

/// The same two counters with a cache line of padding after the first.
pub type Padded = FalseSharing<PaddedCounter, Counter>;

/// Value of a counter after one repetition: `0 + 1 + ... + (iterations - 1)`.
pub const fn expected_sum(iterations: i64) -> i64 {
    iterations * (iterations - 1) / 2
}

/// A false-sharing experiment: two workers hammering one counter each.
///
/// The counters and the workers are set up once in [`Self::new`]. Every call to
/// [`Self::repetition`] is one measured repetition. Counters are never reset, so after `k`
/// repetitions each holds `k * expected_sum(iterations)`.
pub struct FalseSharing<A, B> {
    pair: Arc<CounterPair<A, B>>,
    workers: WorkerPair,
    iterations: i64,
}

impl<A: CounterRecord, B: CounterRecord> FalseSharing<A, B> {
    pub fn new(iterations: i64, pin_workers: bool) -> Result<Self> {
        warn_on_large_lines();
        let workers = WorkerPair::spawn(pin_workers)?;
        let pair = Arc::new(CounterPair::new());
        log::debug!(
            "counters {} bytes apart, same cache line: {}",
            pair.counter_distance(),
            pair.shares_cache_line()
        );
        Ok(Self {
            pair,
            workers,
            iterations,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.counter_iterations, config.pin_workers)
    }

    /// Runs one repetition and returns after both workers are done.
    pub fn repetition(&self) {
        let iterations = self.iterations;
        let first = self.pair.clone();
        let second = self.pair.clone();
        self.workers.run(
            move || accumulate(&mut *first.first.lock(), iterations),
            move || accumulate(&mut *second.second.lock(), iterations),
        );
    }

    pub fn values(&self) -> (i64, i64) {
        self.pair.values()
    }

    pub fn pair(&self) -> &CounterPair<A, B> {
        &self.pair
    }

    pub fn iterations(&self) -> i64 {
        self.iterations
    }
}

fn warn_on_large_lines() {
    if let Some(line) = *CACHE_LINE_SIZE_HINT {
        if line > CACHE_LINE_SIZE {
            log::warn!(
                "hardware cache line is {} bytes but records are padded for {}; \
                 the padded experiment may still share lines",
                line,
                CACHE_LINE_SIZE
            );
        }
    }
}
