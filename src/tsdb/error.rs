//! Adapter error types
//!
//! Every failure of the translation engine is a distinct, inspectable variant.
//! Transport and registry failures are wrapped with their own error types.

use crate::registry::RegistryError;
use crate::tsdb::types::PointType;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors that can occur in the time-series adapter
#[derive(Error, Debug)]
pub enum TsdbError {
    /// `ts` was declared as a point name
    #[error("'{0}' is a reserved field name")]
    ReservedFieldName(String),

    /// Point type text outside the closed set
    #[error("Unknown point type: {0}")]
    UnknownPointType(String),

    /// Edge, device or point name fails the identifier allow-list
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The same point name was declared twice
    #[error("Duplicate point declaration: {0}")]
    DuplicatePoint(String),

    /// Malformed declaration or query parameter
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// A write referenced a point with no recorded type
    #[error("No recorded type for point {edge}:{device}:{point}")]
    TypeResolutionMiss {
        edge: String,
        device: String,
        point: String,
    },

    /// A value's variant does not match the declared point type
    #[error("Point {point} is declared {expected} but got a {actual} value")]
    ValueTypeMismatch {
        point: String,
        expected: PointType,
        actual: PointType,
    },

    /// A value cannot be serialized into the dialect
    #[error("Invalid value for point {point}: {reason}")]
    InvalidValue { point: String, reason: String },

    /// The same point was observed twice at the same timestamp in one batch
    #[error("Point {point} has more than one value at {ts}")]
    DuplicateObservation { point: String, ts: String },

    /// A query selects no columns
    #[error("Empty selection: {0}")]
    EmptySelection(String),

    /// Invalid time range (start >= end)
    #[error("Invalid time range: start must be less than end")]
    InvalidTimeRange,

    /// Bucket width is not `<n><unit>`
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Retention is not a positive number of days
    #[error("Invalid retention: {0}")]
    InvalidRetention(String),

    /// A query that requires at least one row returned none
    #[error("Engine returned an empty result for {0}")]
    EmptyResult(String),

    /// A time cell does not match the fixed timestamp format
    #[error("Cannot parse timestamp {value:?}")]
    TimestampParse { value: String },

    /// A required column is absent from the response header
    #[error("Column {0} missing from response")]
    MissingColumn(String),

    /// A row is shorter than the response header
    #[error("Row {row} has {len} cells, header has {expected}")]
    MalformedRow {
        row: usize,
        len: usize,
        expected: usize,
    },

    /// The table exists but some point types were not recorded
    #[error("Table {table} created but types of {pending:?} were not recorded: {reason}")]
    RegistryIncomplete {
        table: String,
        pending: Vec<String>,
        reason: String,
    },

    /// Transport failure (network, auth, engine-reported)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Type registry failure
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl TsdbError {
    /// True when the engine itself rejected a statement
    pub fn is_engine_error(&self) -> bool {
        matches!(self, TsdbError::Transport(TransportError::Engine { .. }))
    }

    /// Dialect error code reported by the engine, if any
    pub fn engine_code(&self) -> Option<i64> {
        match self {
            TsdbError::Transport(TransportError::Engine { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for adapter operations
pub type TsdbResult<T> = Result<T, TsdbError>;
