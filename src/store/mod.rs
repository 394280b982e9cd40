//! Bounded per-metric sliding-window storage.
//!
//! Each metric id owns one [`MetricSeries`], created lazily on first
//! append. A series keeps the newest `capacity` samples in arrival order
//! and evicts from the front when a batch pushes it over.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

/// Default window bound per metric.
pub const DEFAULT_WINDOW_CAPACITY: usize = 1_000_000;

/// Sliding window of readings for one metric id.
#[derive(Debug)]
pub struct MetricSeries {
    window: VecDeque<i64>,
    capacity: usize,
}

impl MetricSeries {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::new(),
            capacity,
        }
    }

    /// Append a batch, evicting the oldest samples once the window
    /// exceeds capacity. Batches larger than the capacity leave only
    /// their newest `capacity` samples.
    pub fn append(&mut self, samples: &[i64]) {
        self.window.extend(samples.iter().copied());

        let excess = self.window.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.window.drain(..excess);
        }
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Contiguous view of the window, oldest sample first.
    ///
    /// Takes `&mut self` because the ring may need to be rotated into one
    /// slice; the series has a single owner so this is free of contention.
    pub fn snapshot(&mut self) -> &[i64] {
        self.window.make_contiguous();
        self.window.as_slices().0
    }
}

/// All metric series tracked by one collector.
#[derive(Debug)]
pub struct MetricStore {
    series: HashMap<i64, MetricSeries>,
    capacity: usize,
}

impl MetricStore {
    /// Create a store whose series are bounded at `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            series: HashMap::new(),
            capacity,
        }
    }

    /// Append a batch to the series for `id`, creating it on first sight,
    /// and return the series for follow-up snapshotting.
    pub fn append(&mut self, id: i64, samples: &[i64]) -> &mut MetricSeries {
        let series = match self.series.entry(id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(MetricSeries::new(self.capacity)),
        };
        series.append(samples);
        series
    }

    /// Look up the series for `id`, if any batch has arrived for it.
    pub fn get_mut(&mut self, id: i64) -> Option<&mut MetricSeries> {
        self.series.get_mut(&id)
    }

    /// Number of distinct metric ids seen so far.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_within_capacity() {
        let mut store = MetricStore::new(10);
        let series = store.append(1, &[1, 2, 3]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.snapshot(), &[1, 2, 3]);
    }

    #[test]
    fn test_eviction_keeps_newest_suffix() {
        let mut store = MetricStore::new(5);
        store.append(0, &[1, 2, 3]);
        let series = store.append(0, &[4, 5, 6]);

        assert_eq!(series.len(), 5);
        assert_eq!(series.snapshot(), &[2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_batch_larger_than_capacity() {
        let mut store = MetricStore::new(4);
        let series = store.append(9, &[1, 2, 3, 4, 5, 6, 7]);

        assert_eq!(series.len(), 4);
        assert_eq!(series.snapshot(), &[4, 5, 6, 7]);
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut store = MetricStore::new(7);
        for batch in 0..50i64 {
            let data: Vec<i64> = (batch * 3..batch * 3 + 3).collect();
            let series = store.append(0, &data);
            assert!(series.len() <= 7);
        }

        let series = store.get_mut(0).unwrap();
        // 50 batches of 3 ends at sample 149; newest 7 survive.
        assert_eq!(series.snapshot(), &[143, 144, 145, 146, 147, 148, 149]);
    }

    #[test]
    fn test_series_are_independent() {
        let mut store = MetricStore::new(3);
        store.append(1, &[1, 1, 1, 1]);
        store.append(2, &[2]);

        assert_eq!(store.series_count(), 2);
        assert_eq!(store.get_mut(1).unwrap().len(), 3);
        assert_eq!(store.get_mut(2).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let mut store = MetricStore::new(3);
        store.append(5, &[8, 9]);
        let series = store.append(5, &[]);
        assert_eq!(series.snapshot(), &[8, 9]);
    }

    #[test]
    fn test_unknown_id_lookup() {
        let mut store = MetricStore::new(3);
        assert!(store.get_mut(42).is_none());
    }
}
