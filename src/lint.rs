//! Schema-definition linting - static analysis of definition files.
//!
//! Validates resource definition files before they feed a registry:
//! - JSON syntax errors
//! - resource names that are not spinal-case or that start with a verb
//! - invalid or duplicated attribute names
//! - relation templates without an `{id}` placeholder
//! - embedded body schemas that are not JSON Schema objects

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::registry::collect_definition_files;
use crate::types::json_type_name;
use crate::uri;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// JSON path to the issue (e.g., "/0/attributes/2")
    pub path: String,
    pub message: String,
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a file or directory.
///
/// If path is a directory, recursively finds all .json files.
/// If `strict` is true, warnings are treated as errors.
/// Returns aggregated results for all files.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let files = collect_definition_files(path);
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let file_result = lint_file(file, path);
        total_errors += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        total_warnings += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        results.push(file_result);
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

/// Lint a single definition file.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let mut diagnostics = Vec::new();

    let content = std::fs::read_to_string(file);
    let parsed: Result<Value, _> = match &content {
        Ok(text) => serde_json::from_str(text),
        Err(e) => {
            diagnostics.push(error(file, "E001", "/", format!("cannot read file: {e}")));
            return finish(file, base_path, diagnostics);
        }
    };

    let value = match parsed {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(error(file, "E001", "/", format!("syntax error: {e}")));
            return finish(file, base_path, diagnostics);
        }
    };

    match &value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                check_definition(item, file, &format!("/{i}"), &mut diagnostics);
            }
        }
        _ => check_definition(&value, file, "", &mut diagnostics),
    }

    finish(file, base_path, diagnostics)
}

fn finish(file: &Path, base_path: &Path, diagnostics: Vec<Diagnostic>) -> FileResult {
    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let has_warnings = diagnostics.iter().any(|d| d.severity == Severity::Warning);

    let status = if has_errors {
        FileStatus::Error
    } else if has_warnings {
        FileStatus::Warning
    } else {
        FileStatus::Ok
    };

    FileResult {
        file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        status,
        diagnostics,
    }
}

/// Check one resource definition object.
fn check_definition(value: &Value, file: &Path, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let Value::Object(map) = value else {
        diagnostics.push(error(
            file,
            "E002",
            path,
            format!(
                "definition must be an object, got {}",
                json_type_name(value)
            ),
        ));
        return;
    };

    // Resource name
    match map.get("name") {
        Some(Value::String(name)) => {
            if !uri::is_spinal_case(name) {
                diagnostics.push(error(
                    file,
                    "E002",
                    &format!("{path}/name"),
                    format!("resource name \"{name}\" is not spinal-case"),
                ));
            } else if let Some(verb) = uri::leading_verb(name) {
                diagnostics.push(error(
                    file,
                    "E003",
                    &format!("{path}/name"),
                    format!("resource name \"{name}\" starts with the action verb \"{verb}\""),
                ));
            }
        }
        Some(other) => diagnostics.push(error(
            file,
            "E002",
            &format!("{path}/name"),
            format!("resource name must be a string, got {}", json_type_name(other)),
        )),
        None => diagnostics.push(error(
            file,
            "E002",
            &format!("{path}/name"),
            "missing resource name".to_string(),
        )),
    }

    // Attributes
    let mut attributes: Vec<&str> = Vec::new();
    match map.get("attributes") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let attr_path = format!("{path}/attributes/{i}");
                match item {
                    Value::String(attr) => {
                        if !is_attribute_name(attr) {
                            diagnostics.push(error(
                                file,
                                "E004",
                                &attr_path,
                                format!("invalid attribute name \"{attr}\""),
                            ));
                        }
                        if attributes.contains(&attr.as_str()) {
                            diagnostics.push(error(
                                file,
                                "E005",
                                &attr_path,
                                format!("duplicate attribute \"{attr}\""),
                            ));
                        }
                        attributes.push(attr);
                    }
                    other => diagnostics.push(error(
                        file,
                        "E004",
                        &attr_path,
                        format!("attribute must be a string, got {}", json_type_name(other)),
                    )),
                }
            }
            if items.is_empty() {
                diagnostics.push(warning(
                    file,
                    "W001",
                    &format!("{path}/attributes"),
                    "definition declares no attributes".to_string(),
                ));
            }
        }
        Some(other) => diagnostics.push(error(
            file,
            "E004",
            &format!("{path}/attributes"),
            format!("attributes must be an array, got {}", json_type_name(other)),
        )),
        None => diagnostics.push(warning(
            file,
            "W001",
            &format!("{path}/attributes"),
            "definition declares no attributes".to_string(),
        )),
    }

    // Relations
    if let Some(relations) = map.get("relations") {
        match relations {
            Value::Object(rels) => {
                for (rel, template) in rels {
                    let rel_path = format!("{path}/relations/{rel}");
                    match template {
                        Value::String(template) => {
                            if !template.contains("{id}") {
                                diagnostics.push(error(
                                    file,
                                    "E006",
                                    &rel_path,
                                    format!(
                                        "relation template \"{template}\" has no {{id}} placeholder"
                                    ),
                                ));
                            }
                        }
                        other => diagnostics.push(error(
                            file,
                            "E006",
                            &rel_path,
                            format!(
                                "relation template must be a string, got {}",
                                json_type_name(other)
                            ),
                        )),
                    }
                    if attributes.contains(&rel.as_str()) {
                        diagnostics.push(warning(
                            file,
                            "W002",
                            &rel_path,
                            format!("relation \"{rel}\" shadows an attribute of the same name"),
                        ));
                    }
                }
            }
            other => diagnostics.push(error(
                file,
                "E006",
                &format!("{path}/relations"),
                format!("relations must be an object, got {}", json_type_name(other)),
            )),
        }
    }

    // Embedded body schema
    if let Some(body_schema) = map.get("body_schema") {
        if !body_schema.is_object() {
            diagnostics.push(error(
                file,
                "E007",
                &format!("{path}/body_schema"),
                format!(
                    "body_schema must be a JSON Schema object, got {}",
                    json_type_name(body_schema)
                ),
            ));
        }
    }

    // Search declared with nothing to match against
    if map.get("supports_search") == Some(&Value::Bool(true)) && attributes.is_empty() {
        diagnostics.push(warning(
            file,
            "W003",
            &format!("{path}/supports_search"),
            "search is declared but there are no attributes to match".to_string(),
        ));
    }
}

/// Attribute names are camelCase-ish tokens: a letter, then letters,
/// digits, or underscores.
fn is_attribute_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn error(file: &Path, code: &str, path: &str, message: String) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: code.to_string(),
        file: file.to_path_buf(),
        path: if path.is_empty() { "/" } else { path }.to_string(),
        message,
    }
}

fn warning(file: &Path, code: &str, path: &str, message: String) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        code: code.to_string(),
        file: file.to_path_buf(),
        path: if path.is_empty() { "/" } else { path }.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn lint_valid_definition() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
            "name": "orders",
            "attributes": ["id", "state", "amount"],
            "relations": {{ "customer": "/accounts/{{id}}" }}
        }}"#
        )
        .unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert_eq!(result.status, FileStatus::Ok);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn lint_invalid_json_syntax() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not valid json }}").unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert_eq!(result.status, FileStatus::Error);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, "E001");
    }

    #[test]
    fn lint_non_spinal_name() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "name": "MyOrders", "attributes": ["id"] }}"#).unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert_eq!(result.status, FileStatus::Error);
        assert!(result.diagnostics.iter().any(|d| d.code == "E002"));
    }

    #[test]
    fn lint_verb_name() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "name": "get-orders", "attributes": ["id"] }}"#).unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert!(result.diagnostics.iter().any(|d| d.code == "E003"));
    }

    #[test]
    fn lint_duplicate_attribute() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "name": "orders", "attributes": ["id", "state", "id"] }}"#
        )
        .unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert!(result.diagnostics.iter().any(|d| d.code == "E005"));
    }

    #[test]
    fn lint_relation_without_placeholder() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
            "name": "orders",
            "attributes": ["id"],
            "relations": {{ "customer": "/accounts/42" }}
        }}"#
        )
        .unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert!(result.diagnostics.iter().any(|d| d.code == "E006"));
    }

    #[test]
    fn lint_bad_body_schema() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "name": "orders", "attributes": ["id"], "body_schema": "yes" }}"#
        )
        .unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert!(result.diagnostics.iter().any(|d| d.code == "E007"));
    }

    #[test]
    fn lint_empty_attributes_warns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "name": "orders", "attributes": [] }}"#).unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert_eq!(result.status, FileStatus::Warning);
        assert!(result.diagnostics.iter().any(|d| d.code == "W001"));
    }

    #[test]
    fn lint_array_of_definitions_reports_indexed_paths() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"[
            {{ "name": "orders", "attributes": ["id"] }},
            {{ "name": "Bad Name", "attributes": ["id"] }}
        ]"#
        )
        .unwrap();

        let result = lint_file(file.path(), file.path().parent().unwrap());
        assert_eq!(result.status, FileStatus::Error);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == "E002" && d.path == "/1/name"));
    }

    #[test]
    fn lint_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("valid.json"),
            r#"{"name": "accounts", "attributes": ["id"]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("invalid.json"), "{ not json }").unwrap();

        let result = lint(dir.path(), false);
        assert_eq!(result.files_checked, 2);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);
        assert!(!result.is_ok());
    }

    #[test]
    fn lint_strict_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("orders.json");
        // Definition with warning only (no attributes)
        std::fs::write(&file_path, r#"{"name": "orders", "attributes": []}"#).unwrap();

        let result = lint(&file_path, false);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 0);

        let result = lint(&file_path, true);
        assert_eq!(result.passed, 0);
        assert_eq!(result.failed, 1);
    }
}
