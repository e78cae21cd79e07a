//! Dataset Loading
//!
//! Fills an [`InMemoryIndex`] from a file. The format is picked by extension.
//!
//! # JSON
//!
//! ```json
//! {
//!   "mappings": [
//!     {"name": "created", "type": "date", "doc_type": "event"},
//!     {"name": "price", "type": "double"}
//!   ],
//!   "segments": [
//!     {"docs": [
//!       {"_type": "event", "created": "2024-03-01T10:00:00Z", "price": 2.5},
//!       {"_type": "event", "created": [1709287200000, 1709290800000]}
//!     ]}
//!   ]
//! }
//! ```
//!
//! # CSV
//!
//! One value per row, `segment,doc,field,value`. A `_type` field sets the
//! document type. Every other field gets a mapping of its own name: `long`
//! when all its values are integers or dates, `double` otherwise. Document
//! ids may skip ahead of the segment's last document by at most
//! [`MAX_DOC_GAP`].
//!
//! Values are integers, floats, or date strings (RFC 3339, `YYYY-MM-DDTHH:MM:SS`
//! or `YYYY-MM-DD`, all read as UTC) converted to epoch milliseconds.

use crate::index::memory::FieldValue;
use crate::index::{DocId, FieldDataError, FieldDataType, FieldMapping, InMemoryIndex, SegmentBuilder};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Document key holding the document type
pub const DOC_TYPE_KEY: &str = "_type";

/// Largest jump past a segment's current document count a CSV row may make
pub const MAX_DOC_GAP: u32 = 65_536;

/// Dataset loading errors
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported dataset format: {0:?} (expected .json or .csv)")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid value for '{field}' in segment {segment}, doc {doc}: {reason}")]
    InvalidValue {
        segment: usize,
        doc: DocId,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    FieldData(#[from] FieldDataError),
}

#[derive(Debug, Deserialize)]
struct JsonDataset {
    #[serde(default)]
    mappings: Vec<MappingEntry>,
    #[serde(default)]
    segments: Vec<JsonSegment>,
}

#[derive(Debug, Deserialize)]
struct MappingEntry {
    name: String,
    #[serde(default)]
    index_name: Option<String>,
    #[serde(rename = "type")]
    data_type: FieldDataType,
    #[serde(default)]
    doc_type: Option<String>,
}

impl From<MappingEntry> for FieldMapping {
    fn from(entry: MappingEntry) -> Self {
        let mut mapping = FieldMapping::new(entry.name, entry.data_type);
        if let Some(index_name) = entry.index_name {
            mapping = mapping.index_name(index_name);
        }
        mapping.doc_type = entry.doc_type;
        mapping
    }
}

#[derive(Debug, Deserialize)]
struct JsonSegment {
    #[serde(default)]
    docs: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    segment: u32,
    doc: DocId,
    field: String,
    value: String,
}

/// Load a dataset file into a new index
pub fn load_dataset(path: &Path) -> Result<InMemoryIndex, DatasetError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    let index = match extension.as_deref() {
        Some("json") => parse_json_dataset(&std::fs::read_to_string(path)?)?,
        Some("csv") => parse_csv_dataset(std::fs::File::open(path)?)?,
        _ => return Err(DatasetError::UnsupportedFormat(path.to_path_buf())),
    };

    tracing::info!(
        "Loaded {} documents in {} segments from {:?}",
        index.num_docs(),
        index.segments().count(),
        path
    );
    Ok(index)
}

/// Parse a JSON dataset
pub fn parse_json_dataset(content: &str) -> Result<InMemoryIndex, DatasetError> {
    let dataset: JsonDataset = serde_json::from_str(content)?;

    let mut index = InMemoryIndex::new();
    let mappings: Vec<FieldMapping> = dataset.mappings.into_iter().map(Into::into).collect();
    for mapping in &mappings {
        index.add_mapping(mapping.clone());
    }

    for (ord, segment) in dataset.segments.into_iter().enumerate() {
        let mut builder = SegmentBuilder::new();
        for fields in segment.docs {
            let doc_type = fields.get(DOC_TYPE_KEY).and_then(|v| v.as_str());
            let doc = builder.add_document(doc_type);

            for (name, value) in &fields {
                if name == DOC_TYPE_KEY {
                    continue;
                }
                let index_name = mappings
                    .iter()
                    .find(|m| m.name == *name)
                    .map(|m| m.index_name.as_str())
                    .unwrap_or(name.as_str());
                push_json_value(&mut builder, doc, index_name, value).map_err(|reason| {
                    DatasetError::InvalidValue {
                        segment: ord,
                        doc,
                        field: name.clone(),
                        reason,
                    }
                })?;
            }
        }
        index.add_segment(builder)?;
    }

    Ok(index)
}

fn push_json_value(
    builder: &mut SegmentBuilder,
    doc: DocId,
    index_name: &str,
    value: &serde_json::Value,
) -> Result<(), String> {
    match value {
        serde_json::Value::Null => Ok(()),
        serde_json::Value::Array(items) => {
            for item in items {
                if item.is_array() {
                    return Err("nested arrays are not supported".to_string());
                }
                push_json_value(builder, doc, index_name, item)?;
            }
            Ok(())
        }
        serde_json::Value::Number(n) => {
            let value = match n.as_i64() {
                Some(v) => FieldValue::Long(v),
                None => FieldValue::Double(n.as_f64().ok_or_else(|| format!("{} is out of range", n))?),
            };
            builder.push(doc, index_name, value);
            Ok(())
        }
        serde_json::Value::String(s) => {
            let millis = parse_timestamp(s).ok_or_else(|| format!("'{}' is not a date", s))?;
            builder.add_long(doc, index_name, millis);
            Ok(())
        }
        other => Err(format!("unsupported value {}", other)),
    }
}

/// Parse a CSV dataset with `segment,doc,field,value` columns
pub fn parse_csv_dataset<R: Read>(input: R) -> Result<InMemoryIndex, DatasetError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);

    let mut segments: BTreeMap<u32, SegmentBuilder> = BTreeMap::new();
    let mut all_longs: BTreeMap<String, bool> = BTreeMap::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        let builder = segments.entry(row.segment).or_default();

        if row.doc > builder.max_doc().saturating_add(MAX_DOC_GAP) {
            return Err(DatasetError::InvalidValue {
                segment: row.segment as usize,
                doc: row.doc,
                field: row.field,
                reason: format!(
                    "document id is more than {} past the {} documents seen so far",
                    MAX_DOC_GAP,
                    builder.max_doc()
                ),
            });
        }

        if row.field == DOC_TYPE_KEY {
            builder.set_doc_type(row.doc, row.value);
            continue;
        }

        let value = parse_scalar(&row.value).ok_or_else(|| DatasetError::InvalidValue {
            segment: row.segment as usize,
            doc: row.doc,
            field: row.field.clone(),
            reason: format!("'{}' is neither a number nor a date", row.value),
        })?;
        builder.push(row.doc, &row.field, value);

        let is_long = matches!(value, FieldValue::Long(_));
        all_longs
            .entry(row.field)
            .and_modify(|longs| *longs &= is_long)
            .or_insert(is_long);
    }

    let mut index = InMemoryIndex::new();
    for (field, longs) in all_longs {
        let data_type = if longs {
            FieldDataType::Long
        } else {
            FieldDataType::Double
        };
        index.add_mapping(FieldMapping::new(field, data_type));
    }
    for (_, builder) in segments {
        index.add_segment(builder)?;
    }
    Ok(index)
}

fn parse_scalar(s: &str) -> Option<FieldValue> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(FieldValue::Long(v));
    }
    if let Ok(v) = s.parse::<f64>() {
        return Some(FieldValue::Double(v));
    }
    parse_timestamp(s).map(FieldValue::Long)
}

/// Parse a date string into epoch milliseconds (UTC)
pub fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
