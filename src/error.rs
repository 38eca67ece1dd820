//! Error types shared across the engine.
//!
//! The taxonomy follows the request lifecycle: schema problems are fatal at
//! startup, URL problems are a 400, unknown tables a 404, validation
//! problems degrade a single column and travel inside the view model, and
//! internal invariant violations are a 500.

use serde::Serialize;

/// Fatal engine errors: ingest-time schema problems, unknown tables or
/// columns at request time, join configuration conflicts, and invariant
/// violations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Ingest-time schema problem; fatal at startup.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("unknown table: {0:?}")]
    UnknownTable(String),

    #[error("unknown column {column:?} on table {table:?}")]
    UnknownColumn { table: String, column: String },

    /// Join discovery found duplicate values on the target side.
    #[error("ambiguous join {key:?}: duplicate value {value:?} in target column")]
    AmbiguousJoin { key: String, value: String },

    /// The request's cancellation token fired mid-pipeline.
    #[error("request cancelled")]
    Cancelled,

    /// Invariant violation inside the pipeline; surfaces as a 500.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal, per-column problem: the request continues with the
/// offending column degraded, and the message travels to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub column: String,
    pub message: String,
}

/// Validation errors collected over one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub computed_errors: Vec<ValidationError>,
    pub filter_errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_empty(&self) -> bool {
        self.computed_errors.is_empty() && self.filter_errors.is_empty()
    }

    pub fn computed(&mut self, column: impl Into<String>, message: impl Into<String>) {
        self.computed_errors.push(ValidationError { column: column.into(), message: message.into() });
    }

    pub fn filter(&mut self, column: impl Into<String>, message: impl Into<String>) {
        self.filter_errors.push(ValidationError { column: column.into(), message: message.into() });
    }
}
