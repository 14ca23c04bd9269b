//! Core types for request conformance checking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query keys with engine-defined meaning, never treated as filter attributes.
pub const RESERVED_QUERY_KEYS: &[&str] = &["offset", "limit", "sort", "fields"];

/// Action-verb prefixes that must not open a resource segment.
///
/// URIs name things, not actions: `/accounts/007`, never `/get-account/007`.
pub const DISALLOWED_VERB_PREFIXES: &[&str] =
    &["get", "create", "update", "delete", "fetch", "remove"];

/// Maximum resource-chain nesting depth.
pub const MAX_NESTING: usize = 2;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// HTTP method accepted by the engine.
///
/// PATCH is deliberately unrepresentable: partial updates are expressed as
/// PUT of the full representation. [`Method::parse`] returns `None` for PATCH
/// and any other token, which callers map to a 405 envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Parse a method token (case-insensitive).
    ///
    /// Returns `None` for unknown or disallowed methods (notably PATCH).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trailing reserved word routing a request to a special operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedWord {
    First,
    Last,
    Count,
    History,
    Search,
}

impl ReservedWord {
    /// Case-insensitive match against the fixed reserved set.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Some(ReservedWord::First),
            "last" => Some(ReservedWord::Last),
            "count" => Some(ReservedWord::Count),
            "history" => Some(ReservedWord::History),
            "search" => Some(ReservedWord::Search),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedWord::First => "first",
            ReservedWord::Last => "last",
            ReservedWord::Count => "count",
            ReservedWord::History => "history",
            ReservedWord::Search => "search",
        }
    }
}

/// An already-parsed request, as handed over by the transport layer.
///
/// Immutable once constructed: build it with [`RequestDescriptor::new`] and
/// the `with_*` methods, then hand it to the engine.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path split into segments, leading slash removed.
    pub path: Vec<String>,
    /// Query parameters in arrival order, name to raw value.
    pub query: Vec<(String, String)>,
    /// Headers, names lowercased by the constructor.
    pub headers: Vec<(String, String)>,
    /// JSON body, if the request carried one.
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: split_path(path),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Split a raw path into segments, dropping empty ones.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// One link of the resource chain: a resource name and, optionally, an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub name: String,
    pub id: Option<String>,
}

static EMPTY_RESOURCE: ResourceRef = ResourceRef {
    name: String::new(),
    id: None,
};

/// A validated request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    /// API version, a single positive digit.
    pub version: u8,
    /// Resource chain, at most [`MAX_NESTING`] deep.
    pub resources: Vec<ResourceRef>,
    /// Trailing reserved word, when the path routes to one.
    pub reserved: Option<ReservedWord>,
}

impl ParsedPath {
    /// The innermost resource of the chain.
    pub fn leaf(&self) -> &ResourceRef {
        // validate() rejects empty chains, so the fallback is unreachable
        self.resources.last().unwrap_or(&EMPTY_RESOURCE)
    }

    /// Whether the request targets a collection rather than one resource.
    pub fn is_collection(&self) -> bool {
        self.leaf().id.is_none()
    }

    /// Canonical path string, reserved word included.
    pub fn base_path(&self) -> String {
        let mut out = format!("/{}", self.version);
        for r in &self.resources {
            out.push('/');
            out.push_str(&r.name);
            if let Some(id) = &r.id {
                out.push('/');
                out.push_str(id);
            }
        }
        if let Some(word) = self.reserved {
            out.push('/');
            out.push_str(word.as_str());
        }
        out
    }
}

/// Sort direction; ascending is the default when no prefix is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One `sort` entry: attribute plus direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub direction: SortDirection,
}

/// Comparison operator of an attribute filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Le,
    Ge,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Le => "<=",
            FilterOp::Ge => ">=",
        }
    }
}

/// An attribute filter; multiple values are OR-ed within one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub attribute: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

/// Paging window. Absence of the whole struct means "return all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub offset: u64,
    pub limit: u64,
}

/// A `fields` selection entry, at most one dotted level deep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub root: String,
    pub sub: Option<String>,
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sub {
            Some(sub) => write!(f, "{}.{}", self.root, sub),
            None => f.write_str(&self.root),
        }
    }
}

/// Structured interpretation of the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    pub paging: Option<Paging>,
    pub sort: Vec<SortKey>,
    pub fields: Vec<FieldPath>,
    /// Exact-match filters; empty under a SEARCH route.
    pub filters: Vec<Filter>,
    /// Approximate-match terms; populated only under a SEARCH route.
    pub search: Vec<Filter>,
}

impl QueryDescriptor {
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Declared shape of one resource type.
///
/// Loaded from JSON definition files at process start and read-only after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Spinal-case resource name as it appears in URIs.
    pub name: String,
    /// Attribute names clients may sort, filter, and select on.
    pub attributes: Vec<String>,
    /// Relation name to URI template; templates carry an `{id}` placeholder.
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
    #[serde(default)]
    pub supports_history: bool,
    #[serde(default)]
    pub supports_search: bool,
    /// Optional JSON Schema for the resource representation; POST/PUT bodies
    /// are validated against it when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_schema: Option<Value>,
}

impl ResourceSchema {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }
}

/// Business data for the addressed resource, supplied by the storage
/// collaborator. The engine shapes it, it never fetches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceData {
    /// A single resource representation.
    Resource(Value),
    /// The full collection, unfiltered and unpaged.
    Collection(Vec<Value>),
    /// Revision data for a `/history` route.
    Revisions { current: Value, history: Vec<Value> },
    /// The write was queued for asynchronous processing.
    Accepted,
    /// Nothing stored under the addressed path.
    Absent,
}

/// Outcome of the external credential validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Granted,
    MissingCredential,
    Denied,
}

/// Engine-wide configuration, owned by the embedding application.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currently supported API versions; at most the three most recent.
    pub supported_versions: Vec<u8>,
    /// Base URI for the `error_uri` field of error envelopes.
    pub error_uri_base: String,
    /// Languages servable for `Accept-Language` negotiation.
    pub languages: Vec<String>,
    /// When true, requests without granted credentials are rejected.
    pub require_credentials: bool,
}

impl EngineConfig {
    pub fn new(supported_versions: Vec<u8>) -> Self {
        Self {
            supported_versions,
            error_uri_base: "https://developer.example.com/errors".to_string(),
            languages: vec!["en".to_string()],
            require_credentials: false,
        }
    }

    pub fn error_uri_base(mut self, base: impl Into<String>) -> Self {
        self.error_uri_base = base.into();
        self
    }

    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn require_credentials(mut self, require: bool) -> Self {
        self.require_credentials = require;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_rejects_patch() {
        assert_eq!(Method::parse("GET"), Some(Method::Get));
        assert_eq!(Method::parse("delete"), Some(Method::Delete));
        assert_eq!(Method::parse("PATCH"), None);
        assert_eq!(Method::parse("OPTIONS"), None);
    }

    #[test]
    fn reserved_word_parse_case_insensitive() {
        assert_eq!(ReservedWord::parse("first"), Some(ReservedWord::First));
        assert_eq!(ReservedWord::parse("COUNT"), Some(ReservedWord::Count));
        assert_eq!(ReservedWord::parse("History"), Some(ReservedWord::History));
        assert_eq!(ReservedWord::parse("orders"), None);
    }

    #[test]
    fn split_path_drops_empty_segments() {
        assert_eq!(split_path("/1/accounts/007"), vec!["1", "accounts", "007"]);
        assert_eq!(split_path("1/accounts/"), vec!["1", "accounts"]);
        assert!(split_path("/").is_empty());
    }

    #[test]
    fn base_path_renders_chain_and_reserved() {
        let path = ParsedPath {
            version: 1,
            resources: vec![
                ResourceRef {
                    name: "accounts".into(),
                    id: Some("007".into()),
                },
                ResourceRef {
                    name: "orders".into(),
                    id: None,
                },
            ],
            reserved: Some(ReservedWord::Count),
        };
        assert_eq!(path.base_path(), "/1/accounts/007/orders/count");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = RequestDescriptor::new(Method::Get, "/1/accounts")
            .with_header("Accept-Language", "en");
        assert_eq!(req.header("accept-language"), Some("en"));
        assert_eq!(req.header("ACCEPT-LANGUAGE"), Some("en"));
        assert_eq!(req.header("accept"), None);
    }
}
