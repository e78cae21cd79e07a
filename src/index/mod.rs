//! Index Collaborators
//!
//! The facet core never touches index storage directly. Everything it needs
//! from the index is expressed through the traits in this module:
//!
//! - **MappingResolver**: field name → index name, data type, owning type
//! - **FieldDataProvider**: per-segment decoded column for one field
//! - **ScriptService**: compiles value scripts, bound per segment
//!
//! # Segment Walk
//!
//! ```text
//! for segment in index:
//!     FieldDataProvider::long_values(type, segment, field) ─┐
//!     ValueScript::for_segment(segment) ────────────────────┤ rebind
//!     for doc in matching(segment):                         │
//!         DocumentValues::values(doc) → timestamps ─────────┘ collect
//! ```
//!
//! [`memory`] provides an in-memory implementation of the mapping and
//! field-data traits, and [`loader`] fills it from JSON or CSV files.

mod error;
pub mod loader;
pub mod memory;

pub use error::{FieldDataError, ScriptError};
pub use loader::{load_dataset, DatasetError};
pub use memory::{InMemoryIndex, MultiValueColumn, SegmentBuilder};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Segment-local document id
pub type DocId = u32;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Named script parameters
pub type ScriptParams = HashMap<String, serde_json::Value>;

/// Identity of one immutable index segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentContext {
    /// Position of the segment within the index
    pub ord: u32,
    /// Global id of the first document in this segment
    pub doc_base: u32,
    /// Number of documents in this segment
    pub max_doc: u32,
}

impl SegmentContext {
    pub fn new(ord: u32, doc_base: u32, max_doc: u32) -> Self {
        Self {
            ord,
            doc_base,
            max_doc,
        }
    }
}

impl fmt::Display for SegmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment[{}]", self.ord)
    }
}

/// Storage type of a mapped field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDataType {
    /// 64-bit signed integers
    Long,
    /// Dates stored as epoch milliseconds
    Date,
    /// 64-bit floats
    Double,
    /// Untokenized strings
    Keyword,
}

impl FieldDataType {
    /// Whether values decode to `i64`
    pub fn is_long(&self) -> bool {
        matches!(self, FieldDataType::Long | FieldDataType::Date)
    }

    /// Whether values have a numeric representation
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldDataType::Keyword)
    }
}

impl fmt::Display for FieldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDataType::Long => write!(f, "long"),
            FieldDataType::Date => write!(f, "date"),
            FieldDataType::Double => write!(f, "double"),
            FieldDataType::Keyword => write!(f, "keyword"),
        }
    }
}

/// Mapping of a user-facing field name onto the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Name used in facet and script definitions
    pub name: String,
    /// Name of the column inside each segment
    pub index_name: String,
    /// Storage type
    #[serde(rename = "type")]
    pub data_type: FieldDataType,
    /// Document type owning the field, when known exactly
    #[serde(default)]
    pub doc_type: Option<String>,
}

impl FieldMapping {
    /// Create a mapping whose index name equals the field name
    pub fn new(name: impl Into<String>, data_type: FieldDataType) -> Self {
        let name = name.into();
        Self {
            index_name: name.clone(),
            name,
            data_type,
            doc_type: None,
        }
    }

    /// Builder: store the column under a different name
    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    /// Builder: set the owning document type
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
}

/// Resolves field names against the index schema
pub trait MappingResolver {
    fn resolve_field(&self, name: &str) -> Option<FieldMapping>;
}

/// Decoded `i64` values of one field within one segment
pub trait DocumentValues: Send + Sync {
    /// All values attached to `doc`, in stored order. Empty when the
    /// document has none.
    fn values(&self, doc: DocId) -> &[Timestamp];

    /// Visit every value of `doc` exactly once.
    fn for_each_value(&self, doc: DocId, visit: &mut dyn FnMut(Timestamp)) {
        for &value in self.values(doc) {
            visit(value);
        }
    }
}

/// Numeric view of one field within one segment, used by scripts
pub trait NumericValues: Send + Sync {
    /// First value of `doc`, if any
    fn first(&self, doc: DocId) -> Option<f64>;

    /// Number of values attached to `doc`
    fn count(&self, doc: DocId) -> usize;
}

/// Supplies per-segment field data, typically from a cache
pub trait FieldDataProvider: Send + Sync {
    fn long_values(
        &self,
        data_type: FieldDataType,
        segment: &SegmentContext,
        index_name: &str,
    ) -> Result<Arc<dyn DocumentValues>, FieldDataError>;

    fn numeric_values(
        &self,
        data_type: FieldDataType,
        segment: &SegmentContext,
        index_name: &str,
    ) -> Result<Arc<dyn NumericValues>, FieldDataError>;
}

/// Schema and field data together, as needed by script engines
pub trait FieldLookup: MappingResolver + FieldDataProvider {}

impl<T: MappingResolver + FieldDataProvider> FieldLookup for T {}

/// Compiles value scripts
pub trait ScriptService: Send + Sync {
    fn compile(
        &self,
        lang: &str,
        source: &str,
        params: &ScriptParams,
    ) -> Result<Box<dyn ValueScript>, ScriptError>;
}

/// A compiled script, not yet attached to any segment
pub trait ValueScript: Send + Sync {
    fn for_segment(&self, segment: &SegmentContext) -> Result<Box<dyn SegmentScript>, ScriptError>;
}

/// A script attached to one segment
///
/// The document id is an argument of every evaluation; there is no
/// "current document" state to forget to update.
pub trait SegmentScript: Send {
    fn evaluate(&mut self, doc: DocId) -> Result<f64, ScriptError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Timestamp>);

    impl DocumentValues for Fixed {
        fn values(&self, _doc: DocId) -> &[Timestamp] {
            &self.0
        }
    }

    #[test]
    fn test_for_each_value_visits_all() {
        let values = Fixed(vec![5, 5, -3]);
        let mut seen = Vec::new();
        values.for_each_value(0, &mut |t| seen.push(t));
        assert_eq!(seen, vec![5, 5, -3]);
    }

    #[test]
    fn test_field_mapping_builder() {
        let mapping = FieldMapping::new("created", FieldDataType::Date)
            .index_name("event.created")
            .doc_type("event");

        assert_eq!(mapping.name, "created");
        assert_eq!(mapping.index_name, "event.created");
        assert_eq!(mapping.doc_type.as_deref(), Some("event"));
    }

    #[test]
    fn test_field_data_type_classes() {
        assert!(FieldDataType::Date.is_long());
        assert!(FieldDataType::Long.is_long());
        assert!(!FieldDataType::Double.is_long());
        assert!(FieldDataType::Double.is_numeric());
        assert!(!FieldDataType::Keyword.is_numeric());
    }

    #[test]
    fn test_mapping_deserialize() {
        let json = r#"{"name": "ts", "index_name": "ts_ms", "type": "date"}"#;
        let mapping: FieldMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.data_type, FieldDataType::Date);
        assert_eq!(mapping.doc_type, None);
    }
}
