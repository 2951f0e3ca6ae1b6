//! # csv2stmt - bank CSV exports to OFX/QIF statements
//!
//! csv2stmt reads transaction exports from banks and credit-card providers and
//! renders them as OFX or QIF statements that accounting software can import.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │  CSV File   │──▶│   Parser    │──▶│      Transform       │──▶│  Renderer   │
//! │ (any enc.)  │   │ (auto-enc)  │   │ group → normalize →  │   │ (OFX / QIF) │
//! └─────────────┘   └─────────────┘   │ filter → aggregate   │   └─────────────┘
//!                         ▲           └──────────────────────┘
//!                   ┌─────┴─────┐
//!                   │  Mapping  │  columns → attributes (JSON or Rust)
//!                   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use csv2stmt::{builtin, convert_source, ConvertOptions, Format, Outcome};
//!
//! let mapping = builtin("mint").unwrap();
//! let options = ConvertOptions { format: Format::Qif, ..Default::default() };
//! let input = std::fs::File::open("transactions.csv").unwrap();
//! let mut out = std::io::stdout();
//!
//! match convert_source(input, &mapping, &options, &mut out).unwrap() {
//!     Outcome::Converted(summary) => eprintln!("{} transactions", summary.count),
//!     Outcome::Empty => eprintln!("nothing to convert"),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Broadcast progress log
//! - [`models`] - Rows, groups, transactions, summaries
//! - [`dates`] - Date parsing
//! - [`parser`] - CSV decoding with auto-detection
//! - [`mapping`] - Mapping specs, operations and built-ins
//! - [`registry`] - Stored mappings
//! - [`transform`] - Grouping, normalization, filtering, aggregation, pipeline
//! - [`render`] - OFX and QIF grammars

// Core modules
pub mod error;
pub mod logs;
pub mod models;

// Input
pub mod dates;
pub mod parser;

// Mapping
pub mod mapping;
pub mod registry;

// Transformation
pub mod transform;

// Output
pub mod render;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    BalanceMismatch, CsvError, MappingError, PipelineError, PipelineResult, RegistryError,
    RenderError, TransformError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{AggregatedData, Entry, Group, Row, Split, Summary, Transaction, TransactionKind};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_source, detect_delimiter, detect_encoding, peek_headers, read_rows,
    read_rows_from_path, read_source, RowReader,
};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use mapping::{
    builtin, example_mapping, operations_description, AmountFormat, FieldMapper, FieldSpec,
    FieldTransform, MappingSpec, Operation, SourceFormat,
};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use registry::{MappingRegistry, StoredMapping};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{convert, convert_source, transactions, ConvertOptions, Outcome};

// =============================================================================
// Re-exports - Rendering
// =============================================================================

pub use render::{Format, RenderOptions, StatementRenderer};
