//! REST API Conformance Engine
//!
//! Validates already-parsed HTTP requests against house API style rules and
//! shapes the matching response envelope.
//!
//! The engine checks URI grammar (spinal-case segments, single-digit
//! versioning, reserved-word routes), the query-string grammar (paging,
//! sorting, field selection, attribute filters), verb usage, content
//! negotiation, and credential presence, then builds a success envelope
//! with HATEOAS links and pagination metadata - or the standard error
//! envelope `{"error", "error_code", "error_uri"}`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use api_conform::{
//!     load_schemas_str, AuthDecision, ConformanceEngine, EngineConfig, Method,
//!     RequestDescriptor, ResourceData, SchemaRegistry,
//! };
//! use serde_json::json;
//!
//! let schemas = load_schemas_str(
//!     r#"{ "name": "accounts", "attributes": ["id", "firstName", "lastName"] }"#,
//! ).unwrap();
//! let registry = Arc::new(SchemaRegistry::new(schemas));
//! let engine = ConformanceEngine::new(EngineConfig::new(vec![1, 2]), registry);
//!
//! let request = RequestDescriptor::new(Method::Get, "/1/accounts/007");
//! let data = ResourceData::Resource(json!({ "id": "007", "firstName": "James" }));
//!
//! let envelope = engine.process(&request, AuthDecision::Granted, &data);
//! assert_eq!(envelope.status(), 200);
//! assert!(envelope.link_header().unwrap().contains("rel=\"self\""));
//! ```
//!
//! # Status codes
//!
//! | Outcome | Status |
//! |---------|--------|
//! | GET, full body | 200 |
//! | GET, `fields` projection | 206 |
//! | POST created / accepted for async work | 201 / 202 |
//! | PUT/DELETE, empty body | 204 |
//! | grammar, paging, filter, or body errors | 400 |
//! | credentials missing / rejected | 401 / 403 |
//! | unknown resource, empty `/first`/`/last` | 404 |
//! | verb not meaningful for the path | 405 |
//! | unmatched `Accept` / `Accept-Language` | 406 |
//!
//! 500 is reserved for the transport layer; this engine never produces it.
//!
//! The URI grammar in brief: `/<version>/<resource>[/<id>[/<resource>[/<id>]]]`
//! with an optional trailing reserved word (`first`, `last`, `count`,
//! `history`, `search`), at most two resource levels, spinal-case resource
//! names, and never an action verb.

mod engine;
mod envelope;
mod error;
mod lint;
mod query;
mod registry;
mod types;
mod uri;

pub use engine::ConformanceEngine;
pub use envelope::{build, link_header, project, Link, PaginationMeta, ResponseEnvelope};
pub use error::{ConformError, GrammarError, LoadError, QueryError, RegistryError};
pub use lint::{lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use query::{interpret, render_query, render_sort};
pub use registry::{load_schemas, load_schemas_str, SchemaRegistry};
pub use types::{
    split_path, AuthDecision, EngineConfig, FieldPath, Filter, FilterOp, Method, Paging,
    ParsedPath, QueryDescriptor, RequestDescriptor, ReservedWord, ResourceData, ResourceRef,
    ResourceSchema, SortDirection, SortKey, DISALLOWED_VERB_PREFIXES, MAX_NESTING,
    RESERVED_QUERY_KEYS,
};
pub use uri::{is_spinal_case, validate};

#[cfg(feature = "remote")]
pub use registry::load_schemas_url;
