//! In-memory segmented index
//!
//! Holds field mappings and a list of immutable segments. Each segment stores
//! its columns in a compressed-sparse-row layout: one offsets array with
//! `max_doc + 1` entries and one flat values array, so reading the values of
//! a document is two loads and a slice.
//!
//! ```text
//! offsets: [0, 2, 2, 3]      doc 0 → values[0..2]
//! values:  [t0, t1, t2]      doc 1 → (none)
//!                            doc 2 → values[2..3]
//! ```
//!
//! Query matching is "match all", optionally narrowed to one document type.

use crate::facet::{CollectResult, FacetCollector, HistogramAccumulator};
use crate::index::{
    DocId, DocumentValues, FieldDataError, FieldDataProvider, FieldDataType, FieldMapping,
    MappingResolver, NumericValues, SegmentContext, Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Multi-valued column of one field within one segment
#[derive(Debug, Clone, PartialEq)]
pub struct MultiValueColumn<T> {
    offsets: Vec<u32>,
    values: Vec<T>,
}

impl<T: Copy> MultiValueColumn<T> {
    /// Column in which no document has a value
    pub fn empty() -> Self {
        Self {
            offsets: vec![0],
            values: Vec::new(),
        }
    }

    /// Build from per-document value lists, indexed by doc id
    pub fn from_docs<D, V>(docs: D) -> Self
    where
        D: IntoIterator<Item = V>,
        V: IntoIterator<Item = T>,
    {
        let mut column = Self::empty();
        for doc_values in docs {
            column.values.extend(doc_values);
            column.offsets.push(column.values.len() as u32);
        }
        column
    }

    /// Values of `doc`; empty for documents past the end of the column
    pub fn doc_values(&self, doc: DocId) -> &[T] {
        let doc = doc as usize;
        match (self.offsets.get(doc), self.offsets.get(doc + 1)) {
            (Some(&start), Some(&end)) => &self.values[start as usize..end as usize],
            _ => &[],
        }
    }

    /// Number of documents covered by the column
    pub fn num_docs(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of stored values
    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

impl DocumentValues for MultiValueColumn<i64> {
    fn values(&self, doc: DocId) -> &[Timestamp] {
        self.doc_values(doc)
    }
}

impl NumericValues for MultiValueColumn<i64> {
    fn first(&self, doc: DocId) -> Option<f64> {
        self.doc_values(doc).first().map(|&v| v as f64)
    }

    fn count(&self, doc: DocId) -> usize {
        self.doc_values(doc).len()
    }
}

impl NumericValues for MultiValueColumn<f64> {
    fn first(&self, doc: DocId) -> Option<f64> {
        self.doc_values(doc).first().copied()
    }

    fn count(&self, doc: DocId) -> usize {
        self.doc_values(doc).len()
    }
}

/// A raw value added to a segment under construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Long(i64),
    Double(f64),
}

impl FieldValue {
    fn as_f64(self) -> f64 {
        match self {
            FieldValue::Long(v) => v as f64,
            FieldValue::Double(v) => v,
        }
    }
}

/// Accumulates documents for a new segment
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    doc_types: Vec<Option<String>>,
    fields: HashMap<String, Vec<(DocId, FieldValue)>>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document and return its segment-local id
    pub fn add_document(&mut self, doc_type: Option<&str>) -> DocId {
        self.doc_types.push(doc_type.map(str::to_owned));
        (self.doc_types.len() - 1) as DocId
    }

    /// Set the type of `doc`, creating untyped documents up to it if needed
    pub fn set_doc_type(&mut self, doc: DocId, doc_type: impl Into<String>) -> &mut Self {
        self.reserve_doc(doc);
        self.doc_types[doc as usize] = Some(doc_type.into());
        self
    }

    /// Add an integer value under the column `index_name`
    pub fn add_long(&mut self, doc: DocId, index_name: &str, value: i64) -> &mut Self {
        self.push(doc, index_name, FieldValue::Long(value))
    }

    /// Add a floating point value under the column `index_name`
    pub fn add_double(&mut self, doc: DocId, index_name: &str, value: f64) -> &mut Self {
        self.push(doc, index_name, FieldValue::Double(value))
    }

    pub fn push(&mut self, doc: DocId, index_name: &str, value: FieldValue) -> &mut Self {
        self.reserve_doc(doc);
        self.fields
            .entry(index_name.to_string())
            .or_default()
            .push((doc, value));
        self
    }

    /// Number of documents in the segment
    pub fn max_doc(&self) -> u32 {
        self.doc_types.len() as u32
    }

    fn reserve_doc(&mut self, doc: DocId) {
        let needed = doc as usize + 1;
        if self.doc_types.len() < needed {
            self.doc_types.resize(needed, None);
        }
    }
}

#[derive(Debug, Clone)]
enum Column {
    Long(Arc<MultiValueColumn<i64>>),
    Double(Arc<MultiValueColumn<f64>>),
}

impl Column {
    fn data_type(&self) -> FieldDataType {
        match self {
            Column::Long(_) => FieldDataType::Long,
            Column::Double(_) => FieldDataType::Double,
        }
    }
}

#[derive(Debug)]
struct MemorySegment {
    context: SegmentContext,
    doc_types: Vec<Option<String>>,
    columns: HashMap<String, Column>,
}

impl MemorySegment {
    fn matching_docs<'a>(&'a self, type_filter: Option<&'a str>) -> impl Iterator<Item = DocId> + 'a {
        (0..self.context.max_doc).filter(move |&doc| match type_filter {
            Some(wanted) => self.doc_types[doc as usize].as_deref() == Some(wanted),
            None => true,
        })
    }

    fn collect_into(&self, collector: &mut FacetCollector) -> CollectResult<()> {
        let type_filter = collector.type_filter().map(str::to_owned);
        collector.bind_segment(&self.context)?;
        for doc in self.matching_docs(type_filter.as_deref()) {
            collector.collect(doc)?;
        }
        Ok(())
    }
}

/// Field mappings plus immutable segments, all held in memory
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    mappings: HashMap<String, FieldMapping>,
    segments: Vec<MemorySegment>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the mapping of a field
    pub fn add_mapping(&mut self, mapping: FieldMapping) {
        self.mappings.insert(mapping.name.clone(), mapping);
    }

    /// Seal a segment and append it to the index
    ///
    /// Columns of long/date mapped fields must only hold integers. Columns
    /// without a mapping are stored as longs when every value is an integer.
    pub fn add_segment(&mut self, builder: SegmentBuilder) -> Result<SegmentContext, FieldDataError> {
        let doc_base = self
            .segments
            .last()
            .map(|s| s.context.doc_base + s.context.max_doc)
            .unwrap_or(0);
        let context = SegmentContext::new(self.segments.len() as u32, doc_base, builder.max_doc());

        let mut columns = HashMap::with_capacity(builder.fields.len());
        for (index_name, entries) in builder.fields {
            let mapped_type = self
                .mappings
                .values()
                .find(|m| m.index_name == index_name)
                .map(|m| m.data_type);
            let column = build_column(&index_name, mapped_type, context.max_doc, entries)?;
            columns.insert(index_name, column);
        }

        self.segments.push(MemorySegment {
            context,
            doc_types: builder.doc_types,
            columns,
        });
        Ok(context)
    }

    /// Contexts of all segments, in index order
    pub fn segments(&self) -> impl Iterator<Item = SegmentContext> + '_ {
        self.segments.iter().map(|s| s.context)
    }

    /// Total number of documents across segments
    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.context.max_doc as u64).sum()
    }

    /// Run `collector` over every matching document of every segment
    pub fn collect(&self, collector: &mut FacetCollector) -> CollectResult<()> {
        for segment in &self.segments {
            segment.collect_into(collector)?;
        }
        Ok(())
    }

    /// Run one collector per segment on its own thread and merge the partial
    /// histograms.
    pub fn collect_parallel<F>(&self, build: F) -> CollectResult<HistogramAccumulator>
    where
        F: Fn() -> CollectResult<FacetCollector> + Sync,
    {
        let partials: Vec<CollectResult<HistogramAccumulator>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .segments
                .iter()
                .map(|segment| {
                    let build = &build;
                    scope.spawn(move || -> CollectResult<HistogramAccumulator> {
                        let mut collector = build()?;
                        segment.collect_into(&mut collector)?;
                        Ok(collector.into_accumulator())
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        let mut merged = HistogramAccumulator::new();
        for partial in partials {
            merged.merge(partial?);
        }
        Ok(merged)
    }

    fn segment(&self, context: &SegmentContext) -> Result<&MemorySegment, FieldDataError> {
        self.segments
            .get(context.ord as usize)
            .filter(|s| s.context == *context)
            .ok_or(FieldDataError::UnknownSegment(*context))
    }
}

fn build_column(
    index_name: &str,
    mapped_type: Option<FieldDataType>,
    max_doc: u32,
    entries: Vec<(DocId, FieldValue)>,
) -> Result<Column, FieldDataError> {
    let all_longs = entries.iter().all(|(_, v)| matches!(v, FieldValue::Long(_)));
    let data_type = mapped_type.unwrap_or(if all_longs {
        FieldDataType::Long
    } else {
        FieldDataType::Double
    });

    if !data_type.is_numeric() {
        return Err(FieldDataError::NotNumeric {
            field: index_name.to_string(),
            data_type,
        });
    }

    if data_type.is_long() {
        let mut docs: Vec<Vec<i64>> = vec![Vec::new(); max_doc as usize];
        for (doc, value) in entries {
            match value {
                FieldValue::Long(v) => docs[doc as usize].push(v),
                FieldValue::Double(_) => {
                    return Err(FieldDataError::TypeMismatch {
                        field: index_name.to_string(),
                        requested: data_type,
                        actual: FieldDataType::Double,
                    })
                }
            }
        }
        Ok(Column::Long(Arc::new(MultiValueColumn::from_docs(docs))))
    } else {
        let mut docs: Vec<Vec<f64>> = vec![Vec::new(); max_doc as usize];
        for (doc, value) in entries {
            docs[doc as usize].push(value.as_f64());
        }
        Ok(Column::Double(Arc::new(MultiValueColumn::from_docs(docs))))
    }
}

impl MappingResolver for InMemoryIndex {
    fn resolve_field(&self, name: &str) -> Option<FieldMapping> {
        self.mappings.get(name).cloned()
    }
}

impl FieldDataProvider for InMemoryIndex {
    fn long_values(
        &self,
        data_type: FieldDataType,
        segment: &SegmentContext,
        index_name: &str,
    ) -> Result<Arc<dyn DocumentValues>, FieldDataError> {
        let segment = self.segment(segment)?;
        match segment.columns.get(index_name) {
            Some(Column::Long(column)) => {
                let values: Arc<dyn DocumentValues> = column.clone();
                Ok(values)
            }
            Some(column) => Err(FieldDataError::TypeMismatch {
                field: index_name.to_string(),
                requested: data_type,
                actual: column.data_type(),
            }),
            None => Ok(Arc::new(MultiValueColumn::<i64>::empty())),
        }
    }

    fn numeric_values(
        &self,
        data_type: FieldDataType,
        segment: &SegmentContext,
        index_name: &str,
    ) -> Result<Arc<dyn NumericValues>, FieldDataError> {
        if !data_type.is_numeric() {
            return Err(FieldDataError::NotNumeric {
                field: index_name.to_string(),
                data_type,
            });
        }

        let segment = self.segment(segment)?;
        let values: Arc<dyn NumericValues> = match segment.columns.get(index_name) {
            Some(Column::Long(column)) => column.clone(),
            Some(Column::Double(column)) => column.clone(),
            None => Arc::new(MultiValueColumn::<f64>::empty()),
        };
        Ok(values)
    }
}
