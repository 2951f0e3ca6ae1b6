//! Mapping Registry - Store and reuse mapping definitions
//!
//! Built-in mappings are always available. User mappings are JSON files
//! under `.csv2stmt/mappings` and can be matched to a CSV by its headers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};
use crate::logs::log_warning;
use crate::mapping::{builtin_mappings, MappingSpec, BUILTIN_NAMES};

/// Directory where user mappings are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".csv2stmt/mappings";

/// Minimum share of a mapping's columns a CSV must have to be compatible
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A named mapping with its lookup metadata
#[derive(Debug, Clone)]
pub struct StoredMapping {
    pub name: String,
    pub builtin: bool,
    /// Columns the mapping reads
    pub columns: Vec<String>,
    pub mapping: MappingSpec,
}

impl StoredMapping {
    fn new(name: impl Into<String>, builtin: bool, mapping: MappingSpec) -> Self {
        Self {
            name: name.into(),
            builtin,
            columns: mapping.source_columns(),
            mapping,
        }
    }
}

/// Registry of built-in and user mappings
pub struct MappingRegistry {
    registry_dir: PathBuf,
    builtins: Vec<StoredMapping>,
    /// User mappings by name
    stored: BTreeMap<String, StoredMapping>,
}

impl MappingRegistry {
    /// Create a registry over the default directory
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            builtins: builtin_mappings()
                .into_iter()
                .map(|(name, mapping)| StoredMapping::new(name, true, mapping))
                .collect(),
            stored: BTreeMap::new(),
        };
        registry.load_all();
        registry
    }

    pub fn dir(&self) -> &Path {
        &self.registry_dir
    }

    /// Load every `*.json` mapping from the registry directory
    fn load_all(&mut self) {
        let Ok(entries) = fs::read_dir(&self.registry_dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if is_builtin(&name) {
                log_warning(format!("Ignoring {}: '{}' is a built-in mapping", path.display(), name));
                continue;
            }
            match load_file(&path) {
                Ok(mapping) => {
                    self.stored.insert(name.clone(), StoredMapping::new(name, false, mapping));
                }
                Err(e) => log_warning(format!("Skipping {}: {}", path.display(), e)),
            }
        }
    }

    /// Built-ins first, then user mappings by name
    pub fn list(&self) -> Vec<&StoredMapping> {
        self.builtins.iter().chain(self.stored.values()).collect()
    }

    /// Get a mapping by name
    pub fn get(&self, name: &str) -> RegistryResult<&StoredMapping> {
        self.builtins
            .iter()
            .find(|m| m.name == name)
            .or_else(|| self.stored.get(name))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Resolve a mapping reference: a path to a JSON file, or a registry name.
    pub fn resolve(&self, reference: &str) -> RegistryResult<MappingSpec> {
        let path = Path::new(reference);
        if path.extension().is_some_and(|e| e == "json") && path.is_file() {
            return load_file(path);
        }
        self.get(reference).map(|stored| stored.mapping.clone())
    }

    /// Find mappings compatible with the given CSV headers.
    /// Returns mappings sorted by compatibility score, then specificity.
    pub fn find_compatible(&self, headers: &[String]) -> Vec<(&StoredMapping, f64)> {
        let mut compatible: Vec<_> = self
            .list()
            .into_iter()
            .filter_map(|m| {
                let score = compatibility(&m.columns, headers);
                (score > COMPATIBILITY_THRESHOLD).then_some((m, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.columns.len().cmp(&a.0.columns.len()))
        });
        compatible
    }

    /// Save a mapping under `name`; returns the stored name.
    pub fn save(&mut self, name: &str, mapping: MappingSpec) -> RegistryResult<String> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let name = slug;
        if is_builtin(&name) {
            return Err(RegistryError::BuiltIn(name));
        }

        fs::create_dir_all(&self.registry_dir)?;
        let content = mapping.to_json()?;
        fs::write(self.path_for(&name), content)?;

        self.stored.insert(name.clone(), StoredMapping::new(name.clone(), false, mapping));
        Ok(name)
    }

    /// Import a mapping from a JSON file
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let mapping = load_file(path)?;
        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });
        self.save(name, mapping)
    }

    /// Delete a user mapping
    pub fn delete(&mut self, name: &str) -> RegistryResult<()> {
        if is_builtin(name) {
            return Err(RegistryError::BuiltIn(name.to_string()));
        }
        if self.stored.remove(name).is_none() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        fs::remove_file(self.path_for(name))?;
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", name))
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

fn load_file(path: &Path) -> RegistryResult<MappingSpec> {
    let content = fs::read_to_string(path)?;
    Ok(MappingSpec::from_json(&content)?)
}

/// Share of `columns` present in `headers`, case-insensitively
fn compatibility(columns: &[String], headers: &[String]) -> f64 {
    if columns.is_empty() {
        return 0.0;
    }

    let headers_lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let match_count = columns
        .iter()
        .filter(|col| headers_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / columns.len() as f64
}

/// File-safe name: lowercase alphanumerics joined by dashes
fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
