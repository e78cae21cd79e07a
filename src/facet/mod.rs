//! Date Histogram Facet
//!
//! Counts matching documents per time bucket and sums a script-computed
//! value per bucket, in one streaming pass over each segment:
//!
//! - **bucket**: bucket key policies, interval and time zone parsing
//! - **accumulator**: sparse key → (count, total) table
//! - **collector**: segment binding and the per-document loop
//! - **result**: immutable snapshot handed downstream
//! - **error**: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use chronofacet::config::FacetConfig;
//! use chronofacet::facet::FacetCollector;
//!
//! let config = FacetConfig::new("sales_per_day", "created", "doc['price'] * params.rate")
//!     .interval("1d")
//!     .param("rate", 1.2);
//!
//! let mut collector = FacetCollector::new(&config, index.as_ref(), index.clone(), &scripts)?;
//! for segment in index.segments() {
//!     collector.bind_segment(&segment)?;
//!     collector.collect_all(0..segment.max_doc)?;
//! }
//! let result = collector.finish();
//! ```

mod accumulator;
mod bucket;
mod collector;
mod error;
mod result;

pub use accumulator::{AccumulatorEntry, HistogramAccumulator};
pub use bucket::{parse_interval, BucketKeyFn, IntervalSetting, TimeAdjustment};
pub use collector::FacetCollector;
pub use error::{BindFailure, CollectResult, FacetError};
pub use result::{BucketEntry, ComparatorType, FacetResult};
