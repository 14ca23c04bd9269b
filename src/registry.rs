//! Resource schema registry and definition loading.
//!
//! The registry holds one immutable table of [`ResourceSchema`] entries,
//! shared by every in-flight request. Lookups clone an `Arc` handle to the
//! current table, so they are lock-free for the duration of a request and
//! never observe a partially-updated table: [`SchemaRegistry::reload`]
//! swaps the whole table in one assignment, old snapshot or new, never a
//! mix.
//!
//! Definitions are JSON: a single schema object or an array of them.
//! Loading handles files, directories, strings, and (with the `remote`
//! feature) HTTP URLs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{LoadError, RegistryError};
use crate::types::ResourceSchema;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

type Table = HashMap<String, Arc<ResourceSchema>>;

/// Read-mostly schema table with atomic whole-table replacement.
#[derive(Debug)]
pub struct SchemaRegistry {
    table: RwLock<Arc<Table>>,
}

impl SchemaRegistry {
    pub fn new(schemas: Vec<ResourceSchema>) -> Self {
        Self {
            table: RwLock::new(Self::index(schemas)),
        }
    }

    fn index(schemas: Vec<ResourceSchema>) -> Arc<Table> {
        let mut table = Table::new();
        for schema in schemas {
            table.insert(schema.name.clone(), Arc::new(schema));
        }
        Arc::new(table)
    }

    /// Look up the schema for a resource name. Fail-closed: an unknown
    /// resource is an error, never a default.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownResource`] when no schema is
    /// registered under `resource`.
    pub fn lookup(&self, resource: &str) -> Result<Arc<ResourceSchema>, RegistryError> {
        self.snapshot()
            .get(resource)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownResource {
                resource: resource.to_string(),
            })
    }

    /// Replace the whole table. In-flight lookups keep the snapshot they
    /// already hold; later lookups see only the new table.
    pub fn reload(&self, schemas: Vec<ResourceSchema>) {
        let next = Self::index(schemas);
        let count = next.len();
        let mut guard = match self.table.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next;
        drop(guard);
        tracing::debug!(schemas = count, "schema registry reloaded");
    }

    /// Current table handle.
    pub fn snapshot(&self) -> Arc<Table> {
        let guard = match self.table.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    /// Registered resource names, sorted.
    pub fn resource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

/// Load schema definitions from a file or directory of `.json` files.
///
/// # Errors
///
/// Returns [`LoadError::FileNotFound`] if the path doesn't exist,
/// [`LoadError::InvalidJson`] on syntax errors, or
/// [`LoadError::InvalidDefinition`] when a definition doesn't describe a
/// resource schema.
pub fn load_schemas(path: &Path) -> Result<Vec<ResourceSchema>, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut schemas = Vec::new();
    for file in collect_definition_files(path) {
        let content = std::fs::read_to_string(&file).map_err(|source| LoadError::Read {
            path: file.clone(),
            source,
        })?;
        schemas.extend(load_schemas_str(&content)?);
    }
    Ok(schemas)
}

/// Load schema definitions from a JSON string.
///
/// Accepts a single definition object or an array of them.
pub fn load_schemas_str(content: &str) -> Result<Vec<ResourceSchema>, LoadError> {
    let value: Value =
        serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    definitions_from_value(value)
}

/// Load schema definitions from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns [`LoadError::Network`] if the request fails, or the same errors
/// as [`load_schemas_str`] for the response body.
#[cfg(feature = "remote")]
pub fn load_schemas_url(url: &str) -> Result<Vec<ResourceSchema>, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::Network {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|source| LoadError::Network {
            url: url.to_string(),
            source,
        })?;

    let body = response.text().map_err(|source| LoadError::Network {
        url: url.to_string(),
        source,
    })?;

    load_schemas_str(&body)
}

fn definitions_from_value(value: Value) -> Result<Vec<ResourceSchema>, LoadError> {
    let raw = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Err(LoadError::InvalidDefinition {
                message: format!(
                    "expected a definition object or array, got {}",
                    crate::types::json_type_name(&other)
                ),
            })
        }
    };

    let mut schemas = Vec::with_capacity(raw.len());
    for item in raw {
        let schema: ResourceSchema =
            serde_json::from_value(item).map_err(|e| LoadError::InvalidDefinition {
                message: e.to_string(),
            })?;
        if schema.name.is_empty() {
            return Err(LoadError::InvalidDefinition {
                message: "definition has an empty resource name".to_string(),
            });
        }
        schemas.push(schema);
    }
    Ok(schemas)
}

pub(crate) fn collect_definition_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn orders() -> ResourceSchema {
        ResourceSchema {
            name: "orders".to_string(),
            attributes: vec!["id".to_string(), "state".to_string()],
            relations: Default::default(),
            supports_history: false,
            supports_search: false,
            body_schema: None,
        }
    }

    #[test]
    fn lookup_known_resource() {
        let registry = SchemaRegistry::new(vec![orders()]);
        let schema = registry.lookup("orders").unwrap();
        assert_eq!(schema.name, "orders");
    }

    #[test]
    fn lookup_unknown_resource_fails_closed() {
        let registry = SchemaRegistry::new(vec![orders()]);
        let err = registry.lookup("widgets").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownResource { resource } if resource == "widgets"
        ));
    }

    #[test]
    fn reload_replaces_whole_table() {
        let registry = SchemaRegistry::new(vec![orders()]);
        assert_eq!(registry.len(), 1);

        let mut accounts = orders();
        accounts.name = "accounts".to_string();
        registry.reload(vec![accounts]);

        assert!(registry.lookup("orders").is_err());
        assert!(registry.lookup("accounts").is_ok());
    }

    #[test]
    fn held_snapshot_survives_reload() {
        let registry = SchemaRegistry::new(vec![orders()]);
        let snapshot = registry.snapshot();

        registry.reload(vec![]);

        // The old snapshot is still fully intact.
        assert!(snapshot.contains_key("orders"));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_lookups_see_one_table_or_the_other() {
        let registry = Arc::new(SchemaRegistry::new(vec![orders()]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = registry.snapshot();
                        // A snapshot holds either the initial table or a
                        // reloaded one, never an in-between state.
                        assert!(snapshot.len() <= 1);
                        if let Some(schema) = snapshot.values().next() {
                            assert!(!schema.name.is_empty());
                        }
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            registry.reload(vec![orders()]);
            registry.reload(vec![]);
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn load_single_definition_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "name": "orders", "attributes": ["id", "state"] }}"#
        )
        .unwrap();

        let schemas = load_schemas(file.path()).unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "orders");
        assert!(!schemas[0].supports_history);
    }

    #[test]
    fn load_definition_array() {
        let schemas = load_schemas_str(
            r#"[
                { "name": "orders", "attributes": ["id"] },
                { "name": "accounts", "attributes": ["id"], "supports_history": true }
            ]"#,
        )
        .unwrap();
        assert_eq!(schemas.len(), 2);
        assert!(schemas[1].supports_history);
    }

    #[test]
    fn load_directory_collects_json_files() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("accounts.json"),
            r#"{ "name": "accounts", "attributes": ["id"] }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("orders.json"),
            r#"{ "name": "orders", "attributes": ["id"] }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a definition").unwrap();

        let schemas = load_schemas(dir.path()).unwrap();
        assert_eq!(schemas.len(), 2);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = load_schemas(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, LoadError::FileNotFound { .. }));
    }

    #[test]
    fn load_rejects_non_definition_json() {
        let err = load_schemas_str("42").unwrap_err();
        assert!(matches!(err, LoadError::InvalidDefinition { .. }));

        let err = load_schemas_str("{ not json").unwrap_err();
        assert!(matches!(err, LoadError::InvalidJson { .. }));

        let err = load_schemas_str(r#"{ "name": "", "attributes": [] }"#).unwrap_err();
        assert!(matches!(err, LoadError::InvalidDefinition { .. }));
    }
}
