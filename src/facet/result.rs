//! Facet result snapshot
//!
//! The immutable value handed to whatever merges, sorts or serializes facets
//! downstream. The comparator directive is carried along untouched.

use crate::facet::accumulator::HistogramAccumulator;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordering requested for presentation of the buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparatorType {
    /// By bucket key
    #[default]
    Time,
    /// By bucket count
    Count,
    /// By script total
    Total,
}

impl fmt::Display for ComparatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time => write!(f, "time"),
            Self::Count => write!(f, "count"),
            Self::Total => write!(f, "total"),
        }
    }
}

/// One histogram bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketEntry {
    /// Bucket key (window start, or the exact timestamp)
    pub key: i64,
    /// Number of observations
    pub count: u64,
    /// Sum of script values
    pub total: f64,
}

impl BucketEntry {
    /// Average script value per observation
    pub fn mean(&self) -> f64 {
        self.total / self.count as f64
    }
}

/// Snapshot of a date histogram facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetResult {
    name: String,
    comparator: ComparatorType,
    entries: Vec<BucketEntry>,
}

impl FacetResult {
    /// Freeze an accumulator into a result
    pub fn from_accumulator(
        name: impl Into<String>,
        comparator: ComparatorType,
        accumulator: &HistogramAccumulator,
    ) -> Self {
        Self {
            name: name.into(),
            comparator,
            entries: accumulator.snapshot(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comparator(&self) -> ComparatorType {
        self.comparator
    }

    /// Buckets ordered by key
    pub fn entries(&self) -> &[BucketEntry] {
        &self.entries
    }

    /// Bucket with the given key
    pub fn get(&self, key: i64) -> Option<&BucketEntry> {
        self.entries
            .binary_search_by_key(&key, |b| b.key)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Observations across all buckets
    pub fn total_count(&self) -> u64 {
        self.entries.iter().map(|b| b.count).sum()
    }
}
