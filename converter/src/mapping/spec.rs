//! Mapping specification
//!
//! A mapping tells the pipeline how to obtain each logical transaction
//! attribute (`date`, `amount`, `payee`, ...) from a raw row, plus hints about
//! the shape of the source file.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::operations::Operation;
use crate::error::DeriveError;
use crate::models::Row;

/// Signature of a native derivation.
pub type DeriveFn = dyn Fn(&Row) -> Result<String, DeriveError> + Send + Sync;

/// A complete mapping from attributes to row values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSpec {
    /// Version of the mapping format
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Shape of the CSV source
    #[serde(default)]
    pub source_format: SourceFormat,

    /// Decimal convention for amount columns
    #[serde(default)]
    pub amount_format: AmountFormat,

    /// Explicit `strftime` layout for the date column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,

    /// Collapsed groups are double-entry and must sum to zero
    #[serde(default)]
    pub is_split: bool,

    /// Attribute resolution table: key = attribute name
    pub fields: BTreeMap<String, FieldSpec>,
}

/// Hints about the CSV layout.
///
/// Every field is optional so a mapping can leave a decision to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_header: Option<bool>,

    /// Index of the header record (or first data record without a header)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_row: Option<usize>,

    /// Index of the last record to read; negative counts from the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_row: Option<i64>,

    /// Number of leading columns to drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_col: Option<usize>,
}

impl SourceFormat {
    /// Fill unset fields from `fallback`. Values set here win.
    pub fn or(&self, fallback: &SourceFormat) -> SourceFormat {
        SourceFormat {
            delimiter: self.delimiter.or(fallback.delimiter),
            encoding: self.encoding.clone().or_else(|| fallback.encoding.clone()),
            has_header: self.has_header.or(fallback.has_header),
            first_row: self.first_row.or(fallback.first_row),
            last_row: self.last_row.or(fallback.last_row),
            first_col: self.first_col.or(fallback.first_col),
        }
    }
}

/// Decimal separator convention for amounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountFormat {
    /// Comma is the decimal mark only when it sits in the last three
    /// characters and no dot does ("1.000,00"); dot otherwise
    #[default]
    Auto,
    /// "1,234.56"
    Dot,
    /// "1.234,56"
    Comma,
}

/// How one attribute is obtained from a row
#[derive(Clone)]
pub enum FieldSpec {
    /// Fixed value, returned unchanged
    Literal(String),
    /// Value of a named column
    Column(String),
    /// Value computed from the whole row
    Derived(Derivation),
}

/// A computed attribute
#[derive(Clone)]
pub enum Derivation {
    /// Declarative column transform, loadable from JSON
    Transform(FieldTransform),
    /// Rust closure; `columns` lists what it reads for compatibility checks
    Native {
        columns: Vec<String>,
        func: Arc<DeriveFn>,
    },
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            FieldSpec::Column(c) => f.debug_tuple("Column").field(c).finish(),
            FieldSpec::Derived(Derivation::Transform(t)) => {
                f.debug_tuple("Derived").field(t).finish()
            }
            FieldSpec::Derived(Derivation::Native { columns, .. }) => f
                .debug_struct("Native")
                .field("columns", columns)
                .finish_non_exhaustive(),
        }
    }
}

impl FieldSpec {
    pub fn literal(value: impl Into<String>) -> Self {
        FieldSpec::Literal(value.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        FieldSpec::Column(name.into())
    }

    pub fn transform(transform: FieldTransform) -> Self {
        FieldSpec::Derived(Derivation::Transform(transform))
    }

    /// Wrap a closure as a derivation.
    pub fn native<F>(columns: &[&str], func: F) -> Self
    where
        F: Fn(&Row) -> Result<String, DeriveError> + Send + Sync + 'static,
    {
        FieldSpec::Derived(Derivation::Native {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            func: Arc::new(func),
        })
    }

    /// Columns this field reads
    pub fn columns(&self) -> Vec<String> {
        match self {
            FieldSpec::Literal(_) => Vec::new(),
            FieldSpec::Column(c) => vec![c.clone()],
            FieldSpec::Derived(Derivation::Transform(t)) => t.get_sources(),
            FieldSpec::Derived(Derivation::Native { columns, .. }) => columns.clone(),
        }
    }
}

// JSON forms: "Column", {"column": "Column"}, {"literal": "x"}, {"derive": {...}}
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldSpecRepr {
    Shorthand(String),
    Tagged(TaggedFieldSpec),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
enum TaggedFieldSpec {
    Literal(String),
    Column(String),
    Derive(FieldTransform),
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum TaggedFieldSpecRef<'a> {
    Literal(&'a str),
    Derive(&'a FieldTransform),
}

impl<'de> Deserialize<'de> for FieldSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match FieldSpecRepr::deserialize(deserializer)? {
            FieldSpecRepr::Shorthand(column)
            | FieldSpecRepr::Tagged(TaggedFieldSpec::Column(column)) => FieldSpec::Column(column),
            FieldSpecRepr::Tagged(TaggedFieldSpec::Literal(value)) => FieldSpec::Literal(value),
            FieldSpecRepr::Tagged(TaggedFieldSpec::Derive(transform)) => {
                FieldSpec::Derived(Derivation::Transform(transform))
            }
        })
    }
}

impl Serialize for FieldSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSpec::Column(column) => serializer.serialize_str(column),
            FieldSpec::Literal(value) => TaggedFieldSpecRef::Literal(value).serialize(serializer),
            FieldSpec::Derived(Derivation::Transform(t)) => {
                TaggedFieldSpecRef::Derive(t).serialize(serializer)
            }
            FieldSpec::Derived(Derivation::Native { .. }) => Err(serde::ser::Error::custom(
                "native derivations cannot be serialized",
            )),
        }
    }
}

/// Declarative transform for a derived attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTransform {
    /// Source column (mutually exclusive with `sources`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Several columns, non-empty values joined with `concat_separator`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,

    #[serde(default = "default_concat_separator")]
    pub concat_separator: String,

    /// Ordered operations applied to the gathered text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<Operation>,

    /// Used when the gathered or transformed text is blank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_concat_separator() -> String {
    " ".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

impl FieldTransform {
    pub fn from_source(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            sources: None,
            concat_separator: default_concat_separator(),
            operations: Vec::new(),
            default: None,
        }
    }

    pub fn from_sources(sources: &[&str], separator: &str) -> Self {
        Self {
            source: None,
            sources: Some(sources.iter().map(|s| s.to_string()).collect()),
            concat_separator: separator.to_string(),
            operations: Vec::new(),
            default: None,
        }
    }

    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn get_sources(&self) -> Vec<String> {
        let mut result = Vec::new();
        if let Some(ref s) = self.source {
            result.push(s.clone());
        }
        if let Some(ref ss) = self.sources {
            result.extend(ss.iter().cloned());
        }
        result
    }
}

impl MappingSpec {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            description: String::new(),
            source_format: SourceFormat::default(),
            amount_format: AmountFormat::default(),
            date_format: None,
            is_split: false,
            fields: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, attribute: &str, field: FieldSpec) -> Self {
        self.fields.insert(attribute.to_string(), field);
        self
    }

    pub fn field(&self, attribute: &str) -> Option<&FieldSpec> {
        self.fields.get(attribute)
    }

    pub fn has_field(&self, attribute: &str) -> bool {
        self.fields.contains_key(attribute)
    }

    /// All source columns referenced by the mapping, sorted and deduplicated
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.fields.values().flat_map(FieldSpec::columns).collect();
        columns.sort();
        columns.dedup();
        columns
    }

    /// Check that every referenced column exists in `headers`
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

impl Default for MappingSpec {
    fn default() -> Self {
        Self::new()
    }
}
