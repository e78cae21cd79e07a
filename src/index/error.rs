//! Collaborator error types
//!
//! Errors raised by the field-data and script collaborators. The facet layer
//! wraps these into [`crate::facet::FacetError`] with the facet name attached.

use crate::index::{DocId, FieldDataType, SegmentContext};
use thiserror::Error;

/// Errors raised while resolving per-segment field data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldDataError {
    /// The requested segment is not part of the index
    #[error("Unknown segment: {0}")]
    UnknownSegment(SegmentContext),

    /// The stored column cannot be read as the requested type
    #[error("Field [{field}] holds {actual} values, {requested} requested")]
    TypeMismatch {
        field: String,
        requested: FieldDataType,
        actual: FieldDataType,
    },

    /// The field type has no numeric representation
    #[error("Field [{field}] of type {data_type} has no numeric field data")]
    NotNumeric {
        field: String,
        data_type: FieldDataType,
    },
}

/// Errors raised while compiling, binding or evaluating a value script
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// No engine registered for the script language
    #[error("Unsupported script language: {0}")]
    UnsupportedLanguage(String),

    /// Script source failed to parse
    #[error("Parse error: {0}")]
    Parse(String),

    /// A referenced parameter is missing or unusable
    #[error("Invalid parameter [{name}]: {reason}")]
    Param { name: String, reason: String },

    /// A referenced document field has no mapping
    #[error("No mapping found for script field [{0}]")]
    UnknownField(String),

    /// Field data for a referenced field could not be loaded
    #[error("Field data error: {0}")]
    FieldData(#[from] FieldDataError),

    /// The document has no value for a referenced field
    #[error("Document {doc} has no value for field [{field}]")]
    MissingValue { field: String, doc: DocId },
}
