//! Date histogram facet collector
//!
//! Drives the per-document loop for one facet:
//!
//! ```text
//! new()                  resolve mapping, compile script   (UNBOUND)
//!   bind_segment(s0)     field data + script for s0        (BOUND s0)
//!     collect(doc)...    values → key → evaluate → record  (COLLECTING s0)
//!   bind_segment(s1)     rebind both, in lockstep          (BOUND s1)
//!     collect(doc)...
//! finish()               snapshot, consumes the collector  (DONE)
//! ```
//!
//! A collector owns its accumulator and binding outright, so separate
//! collectors can run on separate threads without any locking.

use crate::config::FacetConfig;
use crate::facet::accumulator::HistogramAccumulator;
use crate::facet::bucket::{BucketKeyFn, TimeAdjustment};
use crate::facet::error::{BindFailure, CollectResult, FacetError};
use crate::facet::result::{ComparatorType, FacetResult};
use crate::index::{
    DocId, DocumentValues, FieldDataProvider, FieldDataType, MappingResolver, ScriptService,
    SegmentContext, SegmentScript, ValueScript,
};
use std::sync::Arc;

/// State attached to the segment currently being collected
struct SegmentBinding {
    segment: SegmentContext,
    values: Arc<dyn DocumentValues>,
    script: Box<dyn SegmentScript>,
}

/// Builds a date histogram of counts and script totals
pub struct FacetCollector {
    name: String,
    comparator: ComparatorType,
    index_name: String,
    data_type: FieldDataType,
    type_filter: Option<String>,
    key_fn: BucketKeyFn,
    adjustment: TimeAdjustment,
    field_data: Arc<dyn FieldDataProvider>,
    script: Box<dyn ValueScript>,
    binding: Option<SegmentBinding>,
    accumulator: HistogramAccumulator,
}

impl FacetCollector {
    /// Validate `config` against the schema and compile the value script
    ///
    /// Fails with a configuration error when the field is unmapped or not a
    /// long/date field, the interval or time zone is invalid, or the script
    /// does not compile.
    pub fn new(
        config: &FacetConfig,
        mappings: &dyn MappingResolver,
        field_data: Arc<dyn FieldDataProvider>,
        scripts: &dyn ScriptService,
    ) -> CollectResult<Self> {
        let facet = config.name.clone();

        let mapping = mappings
            .resolve_field(&config.field)
            .ok_or_else(|| FacetError::MissingMapping {
                facet: facet.clone(),
                field: config.field.clone(),
            })?;

        if !mapping.data_type.is_long() {
            return Err(FacetError::UnsupportedFieldType {
                facet,
                field: config.field.clone(),
                data_type: mapping.data_type,
            });
        }

        let key_fn = config
            .interval
            .to_millis()
            .and_then(BucketKeyFn::new)
            .ok_or_else(|| FacetError::InvalidInterval {
                facet: facet.clone(),
                interval: config.interval.to_string(),
            })?;

        let adjustment =
            TimeAdjustment::parse(&config.time_zone).ok_or_else(|| FacetError::InvalidTimeZone {
                facet: facet.clone(),
                time_zone: config.time_zone.clone(),
            })?;

        let script = scripts
            .compile(&config.lang, &config.script, &config.params)
            .map_err(|source| FacetError::ScriptCompile {
                facet: facet.clone(),
                source,
            })?;

        tracing::debug!(
            facet = %facet,
            field = %config.field,
            index_name = %mapping.index_name,
            key_fn = %key_fn,
            doc_type = ?mapping.doc_type,
            "Created date histogram collector"
        );

        Ok(Self {
            name: facet,
            comparator: config.comparator,
            index_name: mapping.index_name,
            data_type: mapping.data_type,
            type_filter: mapping.doc_type,
            key_fn,
            adjustment,
            field_data,
            script,
            binding: None,
            accumulator: HistogramAccumulator::new(),
        })
    }

    /// Attach the collector to `segment`
    ///
    /// Must be called before the first document of every segment. Field data
    /// and script are both resolved before either replaces the previous
    /// binding; on failure the collector is left unbound.
    pub fn bind_segment(&mut self, segment: &SegmentContext) -> CollectResult<()> {
        self.binding = None;

        let values = self
            .field_data
            .long_values(self.data_type, segment, &self.index_name)
            .map_err(|e| self.bind_error(segment, e.into()))?;
        let script = self
            .script
            .for_segment(segment)
            .map_err(|e| self.bind_error(segment, e.into()))?;

        tracing::debug!(facet = %self.name, segment = %segment, "Bound segment");

        self.binding = Some(SegmentBinding {
            segment: *segment,
            values,
            script,
        });
        Ok(())
    }

    /// Record every value of `doc` in the bound segment
    ///
    /// A document with several values contributes one observation per value,
    /// duplicates included. A script failure is returned as is; observations
    /// already recorded for earlier values stay in the histogram.
    pub fn collect(&mut self, doc: DocId) -> CollectResult<()> {
        let binding = match self.binding.as_mut() {
            Some(binding) => binding,
            None => {
                return Err(FacetError::NotBound {
                    facet: self.name.clone(),
                })
            }
        };

        for &timestamp in binding.values.values(doc) {
            let key = self.adjustment.bucket_key(self.key_fn, timestamp);
            let value = binding
                .script
                .evaluate(doc)
                .map_err(|source| FacetError::ScriptEvaluation {
                    facet: self.name.clone(),
                    doc,
                    source,
                })?;
            self.accumulator.record(key, value);
        }
        Ok(())
    }

    /// Collect a run of documents from the bound segment
    pub fn collect_all<I>(&mut self, docs: I) -> CollectResult<()>
    where
        I: IntoIterator<Item = DocId>,
    {
        for doc in docs {
            self.collect(doc)?;
        }
        Ok(())
    }

    /// Snapshot the histogram
    pub fn finish(self) -> FacetResult {
        tracing::info!(
            facet = %self.name,
            buckets = self.accumulator.len(),
            observations = self.accumulator.total_count(),
            "Date histogram facet finished"
        );
        FacetResult::from_accumulator(self.name, self.comparator, &self.accumulator)
    }

    /// Hand over the raw histogram, for merging with other partial results
    pub fn into_accumulator(self) -> HistogramAccumulator {
        self.accumulator
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document type the caller should restrict matching to, if any
    pub fn type_filter(&self) -> Option<&str> {
        self.type_filter.as_deref()
    }

    pub fn key_fn(&self) -> BucketKeyFn {
        self.key_fn
    }

    /// Segment currently bound
    pub fn segment(&self) -> Option<SegmentContext> {
        self.binding.as_ref().map(|b| b.segment)
    }

    /// Histogram collected so far
    pub fn accumulator(&self) -> &HistogramAccumulator {
        &self.accumulator
    }

    fn bind_error(&self, segment: &SegmentContext, source: BindFailure) -> FacetError {
        FacetError::SegmentBinding {
            facet: self.name.clone(),
            segment: *segment,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{
        FieldDataError, FieldMapping, InMemoryIndex, ScriptError, ScriptParams, SegmentBuilder,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY: i64 = 86_400_000;
    const HOUR: i64 = 3_600_000;

    /// Script returning a fixed value per (segment, doc)
    #[derive(Clone, Default)]
    struct TableScripts {
        values: Arc<HashMap<(u32, DocId), f64>>,
        bound: Arc<AtomicUsize>,
        fail_on_segment: Option<u32>,
    }

    struct TableScript(TableScripts);

    struct TableSegmentScript {
        ord: u32,
        values: Arc<HashMap<(u32, DocId), f64>>,
    }

    impl ScriptService for TableScripts {
        fn compile(
            &self,
            lang: &str,
            _source: &str,
            _params: &ScriptParams,
        ) -> Result<Box<dyn ValueScript>, ScriptError> {
            if lang != "table" {
                return Err(ScriptError::UnsupportedLanguage(lang.to_string()));
            }
            Ok(Box::new(TableScript(self.clone())))
        }
    }

    impl ValueScript for TableScript {
        fn for_segment(
            &self,
            segment: &SegmentContext,
        ) -> Result<Box<dyn SegmentScript>, ScriptError> {
            if self.0.fail_on_segment == Some(segment.ord) {
                return Err(ScriptError::UnknownField("broken".to_string()));
            }
            self.0.bound.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TableSegmentScript {
                ord: segment.ord,
                values: Arc::clone(&self.0.values),
            }))
        }
    }

    impl SegmentScript for TableSegmentScript {
        fn evaluate(&mut self, doc: DocId) -> Result<f64, ScriptError> {
            self.values
                .get(&(self.ord, doc))
                .copied()
                .ok_or(ScriptError::MissingValue {
                    field: "table".to_string(),
                    doc,
                })
        }
    }

    fn scripts(values: &[((u32, DocId), f64)]) -> TableScripts {
        TableScripts {
            values: Arc::new(values.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn config(interval: i64) -> FacetConfig {
        FacetConfig::new("histo", "created", "value").lang("table").interval(interval)
    }

    /// One segment, one document per timestamp
    fn single_segment(timestamps: &[i64]) -> Arc<InMemoryIndex> {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Date));
        let mut builder = SegmentBuilder::new();
        for &t in timestamps {
            let doc = builder.add_document(None);
            builder.add_long(doc, "created", t);
        }
        index.add_segment(builder).unwrap();
        Arc::new(index)
    }

    fn run(index: &Arc<InMemoryIndex>, config: &FacetConfig, scripts: &TableScripts) -> FacetResult {
        let mut collector =
            FacetCollector::new(config, index.as_ref(), index.clone(), scripts).unwrap();
        index.collect(&mut collector).unwrap();
        collector.finish()
    }

    #[test]
    fn test_daily_buckets() {
        let index = single_segment(&[0, HOUR, DAY, 2 * DAY]);
        let scripts = scripts(&[((0, 0), 1.0), ((0, 1), 2.0), ((0, 2), 3.0), ((0, 3), 4.0)]);

        let result = run(&index, &config(DAY), &scripts);

        assert_eq!(result.len(), 3);
        let day0 = result.get(0).unwrap();
        assert_eq!((day0.count, day0.total), (2, 3.0));
        let day1 = result.get(DAY).unwrap();
        assert_eq!((day1.count, day1.total), (1, 3.0));
        let day2 = result.get(2 * DAY).unwrap();
        assert_eq!((day2.count, day2.total), (1, 4.0));
    }

    #[test]
    fn test_identity_policy_keeps_raw_timestamps() {
        let index = single_segment(&[-5, 7, 7, 1_000]);
        let scripts = scripts(&[((0, 0), 1.0), ((0, 1), 1.0), ((0, 2), 2.0), ((0, 3), 1.0)]);

        let result = run(&index, &config(1), &scripts);

        let keys: Vec<i64> = result.entries().iter().map(|b| b.key).collect();
        assert_eq!(keys, vec![-5, 7, 1_000]);
        assert_eq!(result.get(7).unwrap().count, 2);
        assert_eq!(result.get(7).unwrap().total, 3.0);
    }

    #[test]
    fn test_pre_epoch_timestamps_floor() {
        let index = single_segment(&[-1, -HOUR, -DAY, -DAY - 1]);
        let scripts = scripts(&[((0, 0), 1.0), ((0, 1), 1.0), ((0, 2), 1.0), ((0, 3), 1.0)]);

        let result = run(&index, &config(DAY), &scripts);

        assert_eq!(result.get(-DAY).unwrap().count, 3);
        assert_eq!(result.get(-2 * DAY).unwrap().count, 1);
        assert!(result.get(0).is_none());
    }

    #[test]
    fn test_multi_valued_document_counts_every_value() {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Date));
        let mut builder = SegmentBuilder::new();
        let doc = builder.add_document(None);
        builder
            .add_long(doc, "created", HOUR)
            .add_long(doc, "created", HOUR)
            .add_long(doc, "created", DAY + HOUR);
        index.add_segment(builder).unwrap();
        let index = Arc::new(index);

        let scripts = scripts(&[((0, 0), 2.5)]);
        let result = run(&index, &config(DAY), &scripts);

        assert_eq!(result.total_count(), 3);
        let first = result.get(0).unwrap();
        assert_eq!((first.count, first.total), (2, 5.0));
        assert_eq!(result.get(DAY).unwrap().count, 1);
    }

    #[test]
    fn test_document_without_values_contributes_nothing() {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Date));
        let mut builder = SegmentBuilder::new();
        builder.add_document(None);
        let doc = builder.add_document(None);
        builder.add_long(doc, "created", 10);
        index.add_segment(builder).unwrap();
        let index = Arc::new(index);

        // doc 0 has no script value either; it must never be evaluated
        let scripts = scripts(&[((0, 1), 1.0)]);
        let result = run(&index, &config(1), &scripts);

        assert_eq!(result.total_count(), 1);
    }

    #[test]
    fn test_rebinds_per_segment() {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Date));
        for ts in [[0, HOUR], [DAY, DAY + HOUR]] {
            let mut builder = SegmentBuilder::new();
            for t in ts {
                let doc = builder.add_document(None);
                builder.add_long(doc, "created", t);
            }
            index.add_segment(builder).unwrap();
        }
        let index = Arc::new(index);

        // Same local doc ids in both segments, different values
        let scripts = scripts(&[((0, 0), 1.0), ((0, 1), 2.0), ((1, 0), 10.0), ((1, 1), 20.0)]);
        let result = run(&index, &config(DAY), &scripts);

        assert_eq!(result.get(0).unwrap().total, 3.0);
        assert_eq!(result.get(DAY).unwrap().total, 30.0);
        assert_eq!(scripts.bound.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_mapping_fails_at_construction() {
        let index = single_segment(&[0]);
        let scripts = scripts(&[]);
        let config = FacetConfig::new("histo", "nope", "value").lang("table");

        let err = FacetCollector::new(&config, index.as_ref(), index.clone(), &scripts)
            .err()
            .unwrap();

        assert!(matches!(
            err,
            FacetError::MissingMapping { ref facet, ref field } if facet == "histo" && field == "nope"
        ));
        assert!(err.is_configuration());
        assert_eq!(scripts.bound.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_double_field_rejected() {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Double));
        let index = Arc::new(index);

        let result = FacetCollector::new(&config(1), index.as_ref(), index.clone(), &scripts(&[]));
        assert!(matches!(
            result,
            Err(FacetError::UnsupportedFieldType {
                data_type: FieldDataType::Double,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_interval_and_time_zone() {
        let index = single_segment(&[0]);
        let scripts = scripts(&[]);

        let result = FacetCollector::new(&config(0), index.as_ref(), index.clone(), &scripts);
        assert!(matches!(result, Err(FacetError::InvalidInterval { .. })));

        let bad_expr = config(1).interval("month");
        let result = FacetCollector::new(&bad_expr, index.as_ref(), index.clone(), &scripts);
        assert!(matches!(result, Err(FacetError::InvalidInterval { .. })));

        let bad_zone = config(1).time_zone("Mars/Olympus");
        let result = FacetCollector::new(&bad_zone, index.as_ref(), index.clone(), &scripts);
        assert!(matches!(result, Err(FacetError::InvalidTimeZone { .. })));
    }

    #[test]
    fn test_script_compile_error() {
        let index = single_segment(&[0]);
        let config = config(1).lang("painless");

        let result = FacetCollector::new(&config, index.as_ref(), index.clone(), &scripts(&[]));
        assert!(matches!(
            result,
            Err(FacetError::ScriptCompile {
                source: ScriptError::UnsupportedLanguage(_),
                ..
            })
        ));
    }

    #[test]
    fn test_collect_before_bind() {
        let index = single_segment(&[0]);
        let mut collector =
            FacetCollector::new(&config(1), index.as_ref(), index.clone(), &scripts(&[])).unwrap();

        assert!(matches!(
            collector.collect(0),
            Err(FacetError::NotBound { .. })
        ));
        assert!(collector.accumulator().is_empty());
    }

    #[test]
    fn test_segment_binding_failure_leaves_unbound() {
        let index = single_segment(&[0]);
        let mut scripts = scripts(&[((0, 0), 1.0)]);
        scripts.fail_on_segment = Some(0);
        let mut collector =
            FacetCollector::new(&config(1), index.as_ref(), index.clone(), &scripts).unwrap();

        let segment = index.segments().next().unwrap();
        let err = collector.bind_segment(&segment).unwrap_err();
        assert!(matches!(
            err,
            FacetError::SegmentBinding {
                source: BindFailure::Script(_),
                ..
            }
        ));
        assert_eq!(collector.segment(), None);
        assert!(matches!(collector.collect(0), Err(FacetError::NotBound { .. })));
    }

    #[test]
    fn test_unknown_segment_is_binding_error() {
        let index = single_segment(&[0]);
        let mut collector =
            FacetCollector::new(&config(1), index.as_ref(), index.clone(), &scripts(&[])).unwrap();

        let err = collector
            .bind_segment(&SegmentContext::new(9, 0, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            FacetError::SegmentBinding {
                source: BindFailure::FieldData(FieldDataError::UnknownSegment(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_script_error_propagates() {
        let index = single_segment(&[0, 1]);
        let scripts = scripts(&[((0, 0), 1.0)]);
        let mut collector =
            FacetCollector::new(&config(1), index.as_ref(), index.clone(), &scripts).unwrap();
        let segment = index.segments().next().unwrap();
        collector.bind_segment(&segment).unwrap();

        collector.collect(0).unwrap();
        let err = collector.collect(1).unwrap_err();
        assert!(matches!(err, FacetError::ScriptEvaluation { doc: 1, .. }));

        // earlier observations stay committed
        assert_eq!(collector.accumulator().total_count(), 1);
        assert_eq!(collector.segment(), Some(segment));
    }

    #[test]
    fn test_type_filter_requested() {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Date).doc_type("event"));
        let mut builder = SegmentBuilder::new();
        let event = builder.add_document(Some("event"));
        builder.add_long(event, "created", 5);
        let other = builder.add_document(Some("audit"));
        builder.add_long(other, "created", 5);
        index.add_segment(builder).unwrap();
        let index = Arc::new(index);

        let scripts = scripts(&[((0, 0), 1.0), ((0, 1), 100.0)]);
        let collector =
            FacetCollector::new(&config(1), index.as_ref(), index.clone(), &scripts).unwrap();
        assert_eq!(collector.type_filter(), Some("event"));

        let result = run(&index, &config(1), &scripts);
        assert_eq!(result.total_count(), 1);
        assert_eq!(result.get(5).unwrap().total, 1.0);
    }

    #[test]
    fn test_time_zone_shifts_buckets() {
        let index = single_segment(&[DAY - HOUR]);
        let scripts = scripts(&[((0, 0), 1.0)]);

        let utc = run(&index, &config(DAY), &scripts);
        assert!(utc.get(0).is_some());

        let shifted = run(&index, &config(DAY).time_zone("+02:00"), &scripts);
        assert!(shifted.get(DAY).is_none());
        assert_eq!(shifted.get(DAY - 2 * HOUR).unwrap().count, 1);

        let exact = run(&index, &config(1).time_zone("+02:00"), &scripts);
        assert_eq!(exact.get(DAY - HOUR).unwrap().count, 1);
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_comparator_forwarded() {
        let index = single_segment(&[0]);
        let scripts = scripts(&[((0, 0), 1.0)]);
        let config = config(1).comparator(ComparatorType::Total);

        let result = run(&index, &config, &scripts);
        assert_eq!(result.comparator(), ComparatorType::Total);
        assert_eq!(result.name(), "histo");
    }

    #[test]
    fn test_parallel_segments_match_sequential() {
        let mut index = InMemoryIndex::new();
        index.add_mapping(FieldMapping::new("created", FieldDataType::Date));
        let mut values = Vec::new();
        for ord in 0..4u32 {
            let mut builder = SegmentBuilder::new();
            for i in 0..50i64 {
                let doc = builder.add_document(None);
                builder.add_long(doc, "created", (ord as i64 * 50 + i) * HOUR);
                values.push(((ord, doc), i as f64));
            }
            index.add_segment(builder).unwrap();
        }
        let index = Arc::new(index);
        let scripts = scripts(&values);
        let config = config(DAY);

        let sequential = run(&index, &config, &scripts);
        let parallel = index
            .collect_parallel(|| {
                FacetCollector::new(&config, index.as_ref(), index.clone(), &scripts)
            })
            .unwrap();
        let parallel = FacetResult::from_accumulator("histo", ComparatorType::Time, &parallel);

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.total_count(), 200);
    }

    #[test]
    fn test_collector_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FacetCollector>();
    }
}
