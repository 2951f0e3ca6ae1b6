//! Mapping operations
//!
//! String operations that can be chained inside a derived field to clean up
//! raw column text before it becomes a transaction attribute.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::DeriveError;

/// Compiled `replace` patterns, shared by every row of every run
static PATTERNS: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn compiled(pattern: &str) -> Result<Regex, regex::Error> {
    let mut cache = PATTERNS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// All available field operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Remove leading and trailing whitespace
    Trim,

    /// Convert to uppercase
    Uppercase,

    /// Convert to lowercase
    Lowercase,

    /// Replace using regex pattern
    Replace {
        pattern: String,
        #[serde(default)]
        value: String,
    },

    /// Map values using a lookup table
    Map {
        mapping: BTreeMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
        /// Value used when nothing matches (None = keep the input)
        #[serde(default)]
        default_unmapped: Option<String>,
    },

    /// Keep one piece of a separated value
    Split {
        #[serde(default = "default_split_separator")]
        separator: String,
        #[serde(default)]
        index: usize,
    },

    /// Take a character range
    Substring {
        start: usize,
        #[serde(default)]
        length: Option<usize>,
    },

    /// Ensure string starts with given prefix
    EnsurePrefix { value: String },

    /// Remove all non-digit characters
    DigitsOnly,

    /// Flip the sign of an amount ("12.00" <-> "-12.00")
    Negate,
}

fn default_split_separator() -> String {
    ",".to_string()
}

impl Operation {
    /// Apply this operation to a value
    pub fn apply(&self, value: &str) -> Result<String, DeriveError> {
        Ok(match self {
            Operation::Trim => value.trim().to_string(),
            Operation::Uppercase => value.to_uppercase(),
            Operation::Lowercase => value.to_lowercase(),
            Operation::Replace { pattern, value: replacement } => {
                let re = compiled(pattern)?;
                re.replace_all(value, replacement.as_str()).into_owned()
            }
            Operation::Map { mapping, case_insensitive, default_unmapped } => {
                apply_map(value, mapping, *case_insensitive, default_unmapped.as_deref())
            }
            Operation::Split { separator, index } => value
                .split(separator.as_str())
                .nth(*index)
                .map(|part| part.trim().to_string())
                .unwrap_or_default(),
            Operation::Substring { start, length } => {
                let chars = value.chars().skip(*start);
                match length {
                    Some(len) => chars.take(*len).collect(),
                    None => chars.collect(),
                }
            }
            Operation::EnsurePrefix { value: prefix } => {
                if value.starts_with(prefix.as_str()) {
                    value.to_string()
                } else {
                    format!("{}{}", prefix, value)
                }
            }
            Operation::DigitsOnly => value.chars().filter(|c| c.is_ascii_digit()).collect(),
            Operation::Negate => negate(value),
        })
    }
}

fn apply_map(
    value: &str,
    mapping: &BTreeMap<String, String>,
    case_insensitive: bool,
    default_unmapped: Option<&str>,
) -> String {
    let key = value.trim();
    // An exact key wins; otherwise the first case-folded match in key order
    let found = match mapping.get(key) {
        Some(v) => Some(v),
        None if case_insensitive => mapping
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v),
        None => None,
    };

    match (found, default_unmapped) {
        (Some(v), _) => v.clone(),
        (None, Some(d)) => d.to_string(),
        (None, None) => value.to_string(),
    }
}

fn negate(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Some(rest) = trimmed.strip_prefix('-') {
        rest.to_string()
    } else if let Some(rest) = trimmed.strip_prefix('+') {
        format!("-{}", rest)
    } else if let Some(inner) = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        inner.to_string()
    } else {
        format!("-{}", trimmed)
    }
}

/// Human-readable table of all operations, printed by `csv2stmt operations`
pub fn operations_description() -> String {
    r#"Available field operations:

| Operation | Description | Parameters |
|-----------|-------------|------------|
| trim | Remove leading/trailing whitespace | - |
| uppercase | Convert to uppercase | - |
| lowercase | Convert to lowercase | - |
| replace | Regex pattern replacement | pattern: regex, value: replacement |
| map | Map values using lookup table | mapping: {source: target}, case_insensitive: bool, default_unmapped: string |
| split | Keep one piece of a separated value | separator (default ","), index (default 0) |
| substring | Extract substring | start: start index, length: optional length |
| ensure_prefix | Add prefix if not present | value: prefix string |
| digits_only | Keep only digits | - |
| negate | Flip the sign of an amount | - |

Example derived field in JSON:
"payee": {
  "derive": {
    "source": "Description",
    "operations": [
      {"type": "split", "separator": "*", "index": 0},
      {"type": "replace", "pattern": "\\s+", "value": " "},
      {"type": "trim"}
    ]
  }
}"#
    .to_string()
}
