//! Field mapper: resolve attributes of a row through a [`MappingSpec`].

use crate::error::{MappingError, MappingResult};
use crate::models::Row;

use super::spec::{Derivation, FieldSpec, FieldTransform, MappingSpec};

/// Resolves logical attributes against raw rows.
///
/// Cheap to copy; it only borrows the mapping.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper<'a> {
    spec: &'a MappingSpec,
}

impl<'a> FieldMapper<'a> {
    pub fn new(spec: &'a MappingSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &'a MappingSpec {
        self.spec
    }

    /// Resolve a required attribute.
    ///
    /// Literals come back unchanged, column references return the cell text
    /// and derivations are evaluated against the whole row.
    pub fn resolve(&self, attribute: &str, row: &Row) -> MappingResult<String> {
        let field = self
            .spec
            .field(attribute)
            .ok_or_else(|| MappingError::MissingField(attribute.to_string()))?;
        resolve_field(attribute, field, row)
    }

    /// Resolve an optional attribute; unmapped or blank values give `None`.
    pub fn resolve_optional(&self, attribute: &str, row: &Row) -> MappingResult<Option<String>> {
        let Some(field) = self.spec.field(attribute) else {
            return Ok(None);
        };
        let value = resolve_field(attribute, field, row)?;
        let trimmed = value.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    /// Resolve a collapse key: a mapped attribute name, or else a raw column.
    pub fn resolve_key(&self, key: &str, row: &Row) -> MappingResult<String> {
        if self.spec.has_field(key) {
            return self.resolve(key, row);
        }
        row.get(key)
            .map(str::to_string)
            .ok_or_else(|| MappingError::MissingColumn {
                attribute: key.to_string(),
                column: key.to_string(),
            })
    }
}

fn resolve_field(attribute: &str, field: &FieldSpec, row: &Row) -> MappingResult<String> {
    match field {
        FieldSpec::Literal(value) => Ok(value.clone()),
        FieldSpec::Column(column) => lookup(attribute, row, column).map(str::to_string),
        FieldSpec::Derived(Derivation::Transform(transform)) => {
            apply_transform(attribute, transform, row)
        }
        FieldSpec::Derived(Derivation::Native { func, .. }) => {
            func(row).map_err(|source| MappingError::Evaluation {
                attribute: attribute.to_string(),
                source,
            })
        }
    }
}

fn lookup<'r>(attribute: &str, row: &'r Row, column: &str) -> MappingResult<&'r str> {
    row.get(column).ok_or_else(|| MappingError::MissingColumn {
        attribute: attribute.to_string(),
        column: column.to_string(),
    })
}

fn apply_transform(attribute: &str, transform: &FieldTransform, row: &Row) -> MappingResult<String> {
    let gathered = match (&transform.source, &transform.sources) {
        (Some(source), _) => lookup(attribute, row, source)?.to_string(),
        (None, Some(sources)) => {
            let mut parts = Vec::with_capacity(sources.len());
            for source in sources {
                let value = lookup(attribute, row, source)?.trim();
                if !value.is_empty() {
                    parts.push(value);
                }
            }
            parts.join(&transform.concat_separator)
        }
        (None, None) => String::new(),
    };

    let mut value = match &transform.default {
        Some(default) if gathered.trim().is_empty() => default.clone(),
        _ => gathered,
    };

    for op in &transform.operations {
        value = op.apply(&value).map_err(|source| MappingError::Evaluation {
            attribute: attribute.to_string(),
            source,
        })?;
    }

    match &transform.default {
        Some(default) if value.trim().is_empty() => Ok(default.clone()),
        _ => Ok(value),
    }
}
