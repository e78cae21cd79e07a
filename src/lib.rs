//! # chronofacet
//!
//! Streaming date histogram facets over a segmented index: every matching
//! document's date values are floored into time buckets, and each bucket
//! keeps a document-value count plus the sum of a per-document script value.
//!
//! ## Modules
//!
//! - [`facet`]: Bucketing, accumulation, the collector and its result
//! - [`index`]: Collaborator traits and an in-memory segmented index
//! - [`script`]: The `expr` value script language
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronofacet::config::FacetConfig;
//! use chronofacet::facet::FacetCollector;
//! use chronofacet::index::load_dataset;
//! use chronofacet::script::ExprScriptService;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = Arc::new(load_dataset("orders.json".as_ref())?);
//!     let scripts = ExprScriptService::new(index.clone());
//!
//!     let config = FacetConfig::new("revenue", "created", "doc['price'] * params.rate")
//!         .interval("1d")
//!         .param("rate", 1.2);
//!
//!     let mut collector = FacetCollector::new(&config, index.as_ref(), index.clone(), &scripts)?;
//!     index.collect(&mut collector)?;
//!
//!     for bucket in collector.finish().entries() {
//!         println!("{}: {} values, total {:.2}", bucket.key, bucket.count, bucket.total);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod facet;
pub mod index;
pub mod script;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, DataConfig, FacetConfig, LoggingConfig};

pub use facet::{
    BucketEntry, BucketKeyFn, CollectResult, ComparatorType, FacetCollector, FacetError,
    FacetResult, HistogramAccumulator, IntervalSetting, TimeAdjustment,
};

pub use index::{
    load_dataset, DatasetError, FieldDataError, FieldDataProvider, FieldDataType, FieldMapping,
    InMemoryIndex, MappingResolver, ScriptError, ScriptService, SegmentBuilder, SegmentContext,
};

pub use script::ExprScriptService;
