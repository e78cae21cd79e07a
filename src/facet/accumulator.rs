//! Histogram accumulator
//!
//! Sparse mapping of bucket key to `(count, total)`, filled one observation
//! at a time. Buckets are created on first observation and never removed.
//! One accumulator has exactly one writer; partial accumulators built on
//! separate threads are combined with [`HistogramAccumulator::merge`].

use crate::facet::result::BucketEntry;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Count and script total of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorEntry {
    pub count: u64,
    pub total: f64,
}

impl AccumulatorEntry {
    fn absorb(&mut self, other: &AccumulatorEntry) {
        self.count += other.count;
        self.total += other.total;
    }
}

/// Bucket key → (count, total)
#[derive(Debug, Clone, Default)]
pub struct HistogramAccumulator {
    entries: HashMap<i64, AccumulatorEntry>,
}

impl HistogramAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observation of `value` in bucket `key`
    #[inline]
    pub fn record(&mut self, key: i64, value: f64) {
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.count += 1;
                entry.total += value;
            }
            Entry::Vacant(slot) => {
                slot.insert(AccumulatorEntry {
                    count: 1,
                    total: value,
                });
            }
        }
    }

    /// Fold `other` into this accumulator
    ///
    /// Keys present on both sides get their counts and totals summed; keys
    /// present on one side pass through unchanged.
    pub fn merge(&mut self, other: HistogramAccumulator) {
        if self.entries.is_empty() {
            self.entries = other.entries;
            return;
        }

        self.entries.reserve(other.entries.len());
        for (key, entry) in other.entries {
            match self.entries.entry(key) {
                Entry::Occupied(mut slot) => slot.get_mut().absorb(&entry),
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
            }
        }
    }

    pub fn get(&self, key: i64) -> Option<&AccumulatorEntry> {
        self.entries.get(&key)
    }

    /// Number of distinct buckets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of counts over all buckets
    pub fn total_count(&self) -> u64 {
        self.entries.values().map(|e| e.count).sum()
    }

    /// Frozen copy of all buckets, ordered by key
    pub fn snapshot(&self) -> Vec<BucketEntry> {
        let mut buckets: Vec<BucketEntry> = self
            .entries
            .iter()
            .map(|(&key, entry)| BucketEntry {
                key,
                count: entry.count,
                total: entry.total,
            })
            .collect();
        buckets.sort_unstable_by_key(|b| b.key);
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(observations: &[(i64, f64)]) -> HistogramAccumulator {
        let mut acc = HistogramAccumulator::new();
        for &(key, value) in observations {
            acc.record(key, value);
        }
        acc
    }

    #[test]
    fn test_record_counts_and_sums() {
        let values = [1.5, -2.0, 0.0, 4.25, 10.0];
        let mut acc = HistogramAccumulator::new();
        for v in values {
            acc.record(42, v);
        }

        let entry = acc.get(42).unwrap();
        assert_eq!(entry.count, 5);
        assert_eq!(entry.total, values.iter().sum::<f64>());
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_first_observation_creates_bucket() {
        let mut acc = HistogramAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.get(7).is_none());

        acc.record(7, 3.0);
        assert_eq!(
            acc.get(7),
            Some(&AccumulatorEntry {
                count: 1,
                total: 3.0
            })
        );
    }

    #[test]
    fn test_nan_total_is_kept() {
        let acc = accumulator(&[(0, 1.0), (0, f64::NAN)]);
        let entry = acc.get(0).unwrap();
        assert_eq!(entry.count, 2);
        assert!(entry.total.is_nan());
    }

    #[test]
    fn test_merge_union() {
        let mut a = accumulator(&[(1, 1.0), (2, 2.0), (2, 3.0)]);
        let b = accumulator(&[(2, 10.0), (3, 7.0)]);

        a.merge(b);

        assert_eq!(a.len(), 3);
        assert_eq!(a.get(1), Some(&AccumulatorEntry { count: 1, total: 1.0 }));
        assert_eq!(a.get(2), Some(&AccumulatorEntry { count: 3, total: 15.0 }));
        assert_eq!(a.get(3), Some(&AccumulatorEntry { count: 1, total: 7.0 }));
    }

    #[test]
    fn test_merge_commutative_and_associative() {
        let a = accumulator(&[(1, 1.0), (2, 2.0)]);
        let b = accumulator(&[(2, 4.0), (3, 8.0)]);
        let c = accumulator(&[(1, 16.0), (3, 32.0), (4, 64.0)]);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b.clone();
        ba.merge(a.clone());
        assert_eq!(ab.snapshot(), ba.snapshot());

        let mut ab_c = ab;
        ab_c.merge(c.clone());
        let mut bc = b;
        bc.merge(c);
        let mut a_bc = a;
        a_bc.merge(bc);
        assert_eq!(ab_c.snapshot(), a_bc.snapshot());
    }

    #[test]
    fn test_merge_into_empty() {
        let mut empty = HistogramAccumulator::new();
        empty.merge(accumulator(&[(5, 1.0)]));
        assert_eq!(empty.total_count(), 1);
    }

    #[test]
    fn test_snapshot_sorted_by_key() {
        let acc = accumulator(&[(30, 1.0), (-10, 1.0), (20, 2.0), (30, 1.0)]);
        let keys: Vec<i64> = acc.snapshot().iter().map(|b| b.key).collect();
        assert_eq!(keys, vec![-10, 20, 30]);
        assert_eq!(acc.total_count(), 4);
    }
}
