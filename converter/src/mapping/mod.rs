//! Field mapping
//!
//! Mappings describe how to derive each transaction attribute from a CSV row:
//! as a literal, a column reference, a declarative transform or a Rust closure.
//!
//! ## Example (JSON)
//!
//! ```json
//! {
//!   "description": "My bank",
//!   "source_format": { "delimiter": ";", "first_row": 1 },
//!   "amount_format": "comma",
//!   "date_format": "%d.%m.%Y",
//!   "fields": {
//!     "date": "Buchungstag",
//!     "amount": "Betrag",
//!     "currency": { "literal": "EUR" },
//!     "payee": {
//!       "derive": {
//!         "source": "Empfaenger",
//!         "operations": [{ "type": "trim" }, { "type": "uppercase" }]
//!       }
//!     }
//!   }
//! }
//! ```

pub mod builtin;
pub mod operations;
pub mod resolver;
pub mod spec;

pub use builtin::{builtin, builtin_mappings, example_mapping, BUILTIN_NAMES};
pub use operations::{operations_description, Operation};
pub use resolver::FieldMapper;
pub use spec::{AmountFormat, Derivation, FieldSpec, FieldTransform, MappingSpec, SourceFormat};
