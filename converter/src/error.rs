//! Error types for the statement conversion pipeline.
//!
//! One enum per layer, converted upward with `From` so `?` works across
//! boundaries:
//!
//! - [`CsvError`] - reading and slicing the source file
//! - [`MappingError`] - resolving an attribute through a mapping
//! - [`TransformError`] - grouping and normalizing rows into transactions
//! - [`BalanceMismatch`] - strict ending-balance reconciliation
//! - [`RenderError`] - header/footer grammar requirements
//! - [`RegistryError`] - stored mapping lookup
//! - [`PipelineError`] - top-level orchestration
//!
//! An empty result is not an error: see [`crate::transform::pipeline::Outcome`].

use rust_decimal::Decimal;
use thiserror::Error;

/// Boxed error raised by a native derivation closure.
pub type DeriveError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// CSV Reading Errors
// =============================================================================

/// Errors while reading the source file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read the source.
    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV record.
    #[error("Invalid CSV: {0}")]
    Parse(#[from] csv::Error),

    /// Source bytes could not be decoded.
    #[error("Failed to decode source as {0}")]
    Encoding(String),

    /// Nothing to read.
    #[error("CSV source is empty")]
    EmptyFile,

    /// Header row expected but not found.
    #[error("No header row found at record {0}")]
    NoHeaders(usize),
}

// =============================================================================
// Field Mapping Errors
// =============================================================================

/// Errors while resolving an attribute from a row.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The attribute is not defined by the mapping.
    #[error("Mapping does not define field '{0}'")]
    MissingField(String),

    /// The attribute references a column the row does not have.
    #[error("Field '{attribute}' references missing column '{column}'")]
    MissingColumn { attribute: String, column: String },

    /// A derivation failed.
    #[error("Failed to derive field '{attribute}': {source}")]
    Evaluation {
        attribute: String,
        #[source]
        source: DeriveError,
    },

    /// The mapping definition itself is unusable.
    #[error("Invalid mapping: {0}")]
    InvalidSpec(String),
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors while turning rows into transactions.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Attribute resolution failed.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Amount text is not a number.
    #[error("Invalid amount '{raw}' in row {row}")]
    AmountParse { raw: String, row: usize },

    /// Date text is not a date.
    #[error("Invalid date '{raw}' in row {row}: {message}")]
    DateParse {
        raw: String,
        row: usize,
        message: String,
    },

    /// A group reached the normalizer without rows.
    #[error("Transaction group has no rows")]
    EmptyGroup,

    /// Rows collapsed under one key disagree on a transaction-level attribute.
    #[error("Split '{key}' has rows with different {attribute} (row {row})")]
    InconsistentGroup {
        key: String,
        attribute: &'static str,
        row: usize,
    },

    /// Split amounts of a double-entry transaction do not cancel out.
    #[error("Splits of '{key}' sum to {total} instead of zero")]
    UnbalancedSplits { key: String, total: Decimal },

    /// Split amounts of one transaction exceed the decimal range.
    #[error("Amounts of '{key}' overflow when summed")]
    AmountOverflow { key: String },

    /// The running balance left the decimal range.
    #[error("Running balance overflows at row {row}")]
    BalanceOverflow { row: usize },
}

// =============================================================================
// Balance Reconciliation
// =============================================================================

/// The computed ending balance disagrees with the expected one.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Ending balance mismatch: expected {expected}, computed {actual}")]
pub struct BalanceMismatch {
    pub expected: Decimal,
    pub actual: Decimal,
}

// =============================================================================
// Rendering Errors
// =============================================================================

/// Errors raised while rendering the statement frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// The grammar needs a value that was not supplied.
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// The account type is outside the grammar's closed set.
    #[error("Unsupported {format} account type '{value}' (expected one of: {expected})")]
    UnsupportedAccountType {
        format: &'static str,
        value: String,
        expected: String,
    },
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the mapping registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No mapping with that name.
    #[error("Mapping not found: {0}")]
    NotFound(String),

    /// Name has no usable characters.
    #[error("Invalid mapping name '{0}'")]
    InvalidName(String),

    /// Built-in mappings cannot be replaced or deleted.
    #[error("Mapping '{0}' is built in")]
    BuiltIn(String),

    /// Stored file is not a valid mapping.
    #[error("Invalid mapping file: {0}")]
    InvalidMapping(#[from] serde_json::Error),

    /// IO error.
    #[error("Registry IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level conversion errors.
///
/// This is the error type returned by [`crate::transform::pipeline::convert`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source reading error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Row transformation error.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Strict reconciliation failed.
    #[error(transparent)]
    Balance(#[from] BalanceMismatch),

    /// Header or footer could not be rendered.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Mapping lookup error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Writing the output failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MappingError> for PipelineError {
    fn from(err: MappingError) -> Self {
        PipelineError::Transform(TransformError::Mapping(err))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for attribute resolution.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for transformation operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for rendering.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
