use {
    parking_lot::Mutex,
    std::{
        fmt::{Debug, Formatter},
        hint::black_box,
    },
};

/// Size in bytes of the cache line the records below are laid out for.
///
/// 64 bytes holds for current x86_64 and most aarch64 cores. The padding experiment is only
/// meaningful if this is at least the real line size; see [`crate::sys::CACHE_LINE_SIZE_HINT`].
pub const CACHE_LINE_SIZE: usize = 64;

/// One cache line worth of unused bytes.
///
/// Placing this after a field guarantees that whatever follows the field in memory starts at
/// least one line further away, so two writers of adjacent records never hit the same line.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct CacheLinePad([u8; CACHE_LINE_SIZE]);

impl Default for CacheLinePad {
    fn default() -> Self {
        Self([0; CACHE_LINE_SIZE])
    }
}

impl Debug for CacheLinePad {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CacheLinePad({})", CACHE_LINE_SIZE)
    }
}

/// A record holding a single counter that is mutated by exactly one worker.
pub trait CounterRecord: Default + Send + 'static {
    fn counter(&self) -> &i64;

    fn counter_mut(&mut self) -> &mut i64;
}

/// Bare counter. Two of these side by side fit in one cache line.
#[derive(Default, Debug)]
#[repr(C)]
pub struct Counter {
    n: i64,
}

impl CounterRecord for Counter {
    fn counter(&self) -> &i64 {
        &self.n
    }

    fn counter_mut(&mut self) -> &mut i64 {
        &mut self.n
    }
}

/// Counter followed by a [`CacheLinePad`].
#[derive(Default, Debug)]
#[repr(C)]
pub struct PaddedCounter {
    n: i64,
    _pad: CacheLinePad,
}

impl CounterRecord for PaddedCounter {
    fn counter(&self) -> &i64 {
        &self.n
    }

    fn counter_mut(&mut self) -> &mut i64 {
        &mut self.n
    }
}

/// Adds `0 + 1 + ... + (iterations - 1)` to the record's counter, one store per step.
///
/// The counter is laundered through `black_box` on every step so that the loop is neither
/// folded into a closed form nor kept in a register.
#[inline(never)]
pub fn accumulate<R: CounterRecord>(record: &mut R, iterations: i64) {
    let slot = record.counter_mut();
    for index in 0..iterations {
        *black_box(&mut *slot) += index;
    }
}

/// Two counter records stored next to each other.
///
/// The pair starts on a line boundary, so two [`Counter`]s are guaranteed to share the first
/// line while a [`PaddedCounter`] in front pushes the second counter onto a later line.
///
/// Each record sits behind a lock that is taken once per repetition by the worker that owns the
/// record for that repetition. The lock is never contended.
#[repr(C, align(64))]
#[derive(Default)]
pub struct CounterPair<A, B> {
    pub first: Mutex<A>,
    pub second: Mutex<B>,
}

impl<A: CounterRecord, B: CounterRecord> CounterPair<A, B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current values of both counters.
    pub fn values(&self) -> (i64, i64) {
        (*self.first.lock().counter(), *self.second.lock().counter())
    }

    /// Byte distance between the two counters.
    pub fn counter_distance(&self) -> usize {
        let first = self.first.lock().counter() as *const i64 as usize;
        let second = self.second.lock().counter() as *const i64 as usize;
        first.abs_diff(second)
    }

    /// Whether both counters live in the same [`CACHE_LINE_SIZE`] line.
    pub fn shares_cache_line(&self) -> bool {
        let first = self.first.lock().counter() as *const i64 as usize;
        let second = self.second.lock().counter() as *const i64 as usize;
        first / CACHE_LINE_SIZE == second / CACHE_LINE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::mem};

    #[test]
    fn padding_adds_a_full_line() {
        assert_eq!(mem::size_of::<CacheLinePad>(), CACHE_LINE_SIZE);
        assert!(mem::size_of::<PaddedCounter>() >= mem::size_of::<Counter>() + CACHE_LINE_SIZE);
    }

    #[test]
    fn pair_is_line_aligned() {
        assert_eq!(mem::align_of::<CounterPair<Counter, Counter>>(), CACHE_LINE_SIZE);
        let pair = Box::new(CounterPair::<Counter, Counter>::new());
        assert_eq!(&*pair as *const _ as usize % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn unpadded_counters_share_a_line() {
        let pair = Box::new(CounterPair::<Counter, Counter>::new());
        assert!(pair.shares_cache_line());
        assert!(pair.counter_distance() < CACHE_LINE_SIZE);
    }

    #[test]
    fn padded_counter_separates_lines() {
        let pair = Box::new(CounterPair::<PaddedCounter, Counter>::new());
        assert!(!pair.shares_cache_line());
        assert!(pair.counter_distance() >= CACHE_LINE_SIZE);
    }

    #[test]
    fn accumulate_sums_indices() {
        let mut counter = Counter::default();
        accumulate(&mut counter, 10);
        assert_eq!(*counter.counter(), 45);
        accumulate(&mut counter, 1_000_000);
        assert_eq!(*counter.counter(), 45 + 499_999_500_000);
    }

    #[test]
    fn pad_is_zeroed() {
        let padded = PaddedCounter::default();
        assert_eq!(padded._pad.0, [0; CACHE_LINE_SIZE]);
        assert_eq!(*padded.counter(), 0);
    }
}
