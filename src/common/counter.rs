use std::sync::atomic::{AtomicIsize, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use once_cell::sync::Lazy;
use quanta::Clock;

/// How long `estimated_value` may serve a cached sum before summing again.
pub(crate) const ESTIMATE_REFRESH_NANOS: u64 = 1_000_000;

static DEFAULT_NUM_STRIPES: Lazy<usize> =
    Lazy::new(|| crate::common::available_parallelism() * 2);

/// A striped, signed counter of live entries.
///
/// Every thread adds to its own stripe, so concurrent writers rarely contend
/// on the same cache line. Reading the exact value sums all stripes, which is
/// why a cheaper, cached estimate is offered too.
pub(crate) struct Counter {
    // Each stripe is padded to a cache line. The size of a cache line is
    // calculated by `crossbeam_utils::CachePadded`.
    stripes: Box<[CachePadded<AtomicIsize>]>,
    clock: Clock,
    estimate: AtomicIsize,
    // `u64::MAX` means the estimate was never computed.
    last_refresh: AtomicU64,
}

impl Default for Counter {
    fn default() -> Self {
        Self::with_stripes(*DEFAULT_NUM_STRIPES, Clock::new())
    }
}

impl Counter {
    pub(crate) fn with_stripes(num_stripes: usize, clock: Clock) -> Self {
        let stripes = std::iter::repeat_with(AtomicIsize::default)
            .map(CachePadded::new)
            .take(num_stripes.max(1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            stripes,
            clock,
            estimate: AtomicIsize::default(),
            last_refresh: AtomicU64::new(u64::MAX),
        }
    }

    pub(crate) fn num_stripes(&self) -> usize {
        self.stripes.len()
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn increment(&self) {
        self.stripe().fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.stripe().fetch_sub(1, Ordering::Relaxed);
    }

    /// Sums every stripe. Under concurrent updates the result can be
    /// momentarily negative; callers clamp it.
    pub(crate) fn value(&self) -> isize {
        self.stripes
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .sum()
    }

    /// Returns a recently computed sum, recomputing it when it is older than
    /// `ESTIMATE_REFRESH_NANOS`.
    pub(crate) fn estimated_value(&self) -> isize {
        let now = self.clock.raw();
        let last = self.last_refresh.load(Ordering::Acquire);

        let is_stale = last == u64::MAX
            || self.clock.delta_as_nanos(last, now) >= ESTIMATE_REFRESH_NANOS;

        // Only the thread that wins the timestamp refreshes the estimate.
        if is_stale
            && self
                .last_refresh
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            let value = self.value();
            self.estimate.store(value, Ordering::Release);
            return value;
        }

        self.estimate.load(Ordering::Acquire)
    }

    fn stripe(&self) -> &AtomicIsize {
        thread_local! { static MY_INDEX: usize = next_index() };
        MY_INDEX.with(|i| &self.stripes[*i % self.stripes.len()])
    }
}

fn next_index() -> usize {
    static INDEX: AtomicUsize = AtomicUsize::new(0);

    let mut i0 = INDEX.load(Ordering::Acquire);
    loop {
        let i1 = (i0 + 1) % *DEFAULT_NUM_STRIPES;
        match INDEX.compare_exchange_weak(i0, i1, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => return i0,
            Err(i2) => i0 = i2,
        }
    }
}
