//! Facet error types
//!
//! Configuration problems surface from [`FacetCollector::new`] before any
//! document is visited. Segment and script failures surface from the call
//! that hit them; nothing is retried or skipped here.
//!
//! [`FacetCollector::new`]: crate::facet::FacetCollector::new

use crate::index::{DocId, FieldDataError, FieldDataType, ScriptError, SegmentContext};
use thiserror::Error;

/// Errors raised while building or running a date histogram facet
#[derive(Error, Debug)]
pub enum FacetError {
    /// The key field has no mapping in the index schema
    #[error("Facet [{facet}]: no mapping found for field [{field}]")]
    MissingMapping { facet: String, field: String },

    /// The key field does not hold integer timestamps
    #[error("Facet [{facet}]: field [{field}] of type {data_type} cannot key a date histogram")]
    UnsupportedFieldType {
        facet: String,
        field: String,
        data_type: FieldDataType,
    },

    /// Interval is not a positive duration
    #[error("Facet [{facet}]: invalid interval [{interval}]")]
    InvalidInterval { facet: String, interval: String },

    /// Time zone adjustment could not be parsed
    #[error("Facet [{facet}]: invalid time zone [{time_zone}]")]
    InvalidTimeZone { facet: String, time_zone: String },

    /// The value script failed to compile
    #[error("Facet [{facet}]: failed to compile value script: {source}")]
    ScriptCompile {
        facet: String,
        #[source]
        source: ScriptError,
    },

    /// Field data or script state could not be resolved for a segment
    #[error("Facet [{facet}]: failed to bind {segment}: {source}")]
    SegmentBinding {
        facet: String,
        segment: SegmentContext,
        #[source]
        source: BindFailure,
    },

    /// The value script failed on a document
    #[error("Facet [{facet}]: value script failed on doc {doc}: {source}")]
    ScriptEvaluation {
        facet: String,
        doc: DocId,
        #[source]
        source: ScriptError,
    },

    /// `collect` was called with no segment bound
    #[error("Facet [{facet}]: collect called before a segment was bound")]
    NotBound { facet: String },
}

impl FacetError {
    /// Whether the error was raised while building the collector
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FacetError::MissingMapping { .. }
                | FacetError::UnsupportedFieldType { .. }
                | FacetError::InvalidInterval { .. }
                | FacetError::InvalidTimeZone { .. }
                | FacetError::ScriptCompile { .. }
        )
    }
}

/// Collaborator that failed during a segment rebind
#[derive(Error, Debug)]
pub enum BindFailure {
    #[error("field data: {0}")]
    FieldData(#[from] FieldDataError),

    #[error("script: {0}")]
    Script(#[from] ScriptError),
}

/// Result type for facet operations
pub type CollectResult<T> = Result<T, FacetError>;
