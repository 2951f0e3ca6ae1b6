//! Transformation module.
//!
//! Turns mapped rows into statement-ready transactions:
//! - Amount: locale-tolerant amount parsing
//! - Grouper: rows to transaction groups (collapse key, chunked)
//! - Normalizer: groups to typed transactions
//! - Filter: inclusive date range
//! - Aggregate: running balances and summary
//! - Pipeline: the whole chain, driven by the output writer

pub mod aggregate;
pub mod amount;
pub mod filter;
pub mod grouper;
pub mod normalizer;
pub mod pipeline;

pub use aggregate::{aggregate, reconcile, Aggregator};
pub use amount::parse_amount;
pub use filter::{filter, DateRange};
pub use grouper::{group_rows, Grouper, DEFAULT_CHUNK_SIZE};
pub use normalizer::Normalizer;
pub use pipeline::*;
