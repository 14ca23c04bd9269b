//! Response envelope assembly.
//!
//! Shapes collaborator-supplied resource data into the outgoing envelope:
//! field projection, collection sorting and paging, pagination metadata
//! with round-tripping next/previous hrefs, HATEOAS links, reserved-word
//! response shapes, and the standard error body
//! `{"error": ..., "error_code": ..., "error_uri": ...}`.
//!
//! Everything here is a pure function of (data, path, query, schema); no
//! link cache, no hidden state.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ConformError;
use crate::query::render_query;
use crate::types::{
    EngineConfig, FieldPath, Filter, FilterOp, Method, Paging, ParsedPath, QueryDescriptor,
    ReservedWord, ResourceData, ResourceSchema, SortDirection, SortKey,
};

/// One HATEOAS link: where, under which relation, with which verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    pub method: Method,
}

impl Link {
    /// RFC 5988-style header entry: `</uri>; rel="name"; method="VERB"`.
    pub fn header_entry(&self) -> String {
        format!(
            "<{}>; rel=\"{}\"; method=\"{}\"",
            self.href, self.rel, self.method
        )
    }
}

/// Render links as one `Link` header value.
pub fn link_header(links: &[Link]) -> String {
    let entries: Vec<String> = links.iter().map(Link::header_entry).collect();
    entries.join(", ")
}

/// Pagination metadata attached to paged collection responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    /// Total matching resources, before the paging window.
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// The one response produced per request: success or error, never both.
#[derive(Debug, Clone)]
pub enum ResponseEnvelope {
    Success {
        status: u16,
        body: Value,
        links: Vec<Link>,
        pagination: Option<PaginationMeta>,
    },
    Error {
        status: u16,
        error: String,
        error_code: u32,
        error_uri: String,
    },
}

impl ResponseEnvelope {
    /// Render a failure as a fully-formed error envelope.
    pub fn from_error(err: &ConformError, config: &EngineConfig) -> Self {
        let code = err.error_code();
        ResponseEnvelope::Error {
            status: err.status_code(),
            error: err.kind().to_string(),
            error_code: code,
            error_uri: format!("{}/{}", config.error_uri_base, code),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ResponseEnvelope::Success { status, .. } => *status,
            ResponseEnvelope::Error { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success { .. })
    }

    /// The JSON wire body. Error envelopes always serialize to the
    /// standard error shape.
    pub fn to_json(&self) -> Value {
        match self {
            ResponseEnvelope::Success { body, .. } => body.clone(),
            ResponseEnvelope::Error {
                error,
                error_code,
                error_uri,
                ..
            } => json!({
                "error": error,
                "error_code": error_code,
                "error_uri": error_uri,
            }),
        }
    }

    /// The `Link` header value, when the response carries links.
    pub fn link_header(&self) -> Option<String> {
        match self {
            ResponseEnvelope::Success { links, .. } if !links.is_empty() => {
                Some(link_header(links))
            }
            _ => None,
        }
    }

    pub fn pagination(&self) -> Option<&PaginationMeta> {
        match self {
            ResponseEnvelope::Success { pagination, .. } => pagination.as_ref(),
            ResponseEnvelope::Error { .. } => None,
        }
    }
}

/// Assemble the success envelope for a validated request.
///
/// # Errors
///
/// Returns [`ConformError::NotFound`] when the addressed data is absent,
/// of the wrong shape for the route, or an extremal element of an empty
/// collection was requested.
pub fn build(
    data: &ResourceData,
    path: &ParsedPath,
    query: &QueryDescriptor,
    schema: &ResourceSchema,
    method: Method,
) -> Result<ResponseEnvelope, ConformError> {
    match method {
        Method::Post => build_post(data, path),
        Method::Put | Method::Delete => Ok(ResponseEnvelope::Success {
            status: 204,
            body: Value::Null,
            links: vec![self_link(path)],
            pagination: None,
        }),
        Method::Get => build_get(data, path, query, schema),
    }
}

fn build_post(data: &ResourceData, path: &ParsedPath) -> Result<ResponseEnvelope, ConformError> {
    match data {
        ResourceData::Accepted => Ok(ResponseEnvelope::Success {
            status: 202,
            body: Value::Null,
            links: vec![self_link(path)],
            pagination: None,
        }),
        ResourceData::Resource(created) => {
            let mut href = path.base_path();
            if let Some(id) = created.get("id").and_then(Value::as_str) {
                href = format!("{href}/{id}");
            }
            Ok(ResponseEnvelope::Success {
                status: 201,
                body: created.clone(),
                links: vec![Link {
                    rel: "self".to_string(),
                    href,
                    method: Method::Get,
                }],
                pagination: None,
            })
        }
        _ => Ok(ResponseEnvelope::Success {
            status: 201,
            body: Value::Null,
            links: vec![self_link(path)],
            pagination: None,
        }),
    }
}

fn build_get(
    data: &ResourceData,
    path: &ParsedPath,
    query: &QueryDescriptor,
    schema: &ResourceSchema,
) -> Result<ResponseEnvelope, ConformError> {
    match path.reserved {
        Some(ReservedWord::Count) => {
            let items = collection_items(data, path)?;
            let filtered = apply_filters(items, &query.filters);
            // A count is a bare integer, nothing else.
            Ok(ResponseEnvelope::Success {
                status: 200,
                body: json!(filtered.len() as u64),
                links: vec![self_link(path)],
                pagination: None,
            })
        }
        Some(word @ (ReservedWord::First | ReservedWord::Last)) => {
            let items = collection_items(data, path)?;
            let mut matching = apply_filters(items, &query.filters);
            sort_collection(&mut matching, &query.sort);
            let extremal = match word {
                ReservedWord::First => matching.first(),
                _ => matching.last(),
            };
            let Some(element) = extremal else {
                return Err(ConformError::NotFound {
                    what: path.base_path(),
                });
            };
            Ok(ResponseEnvelope::Success {
                status: body_status(query),
                body: project(element, &query.fields),
                links: vec![self_link(path)],
                pagination: None,
            })
        }
        Some(ReservedWord::History) => {
            let ResourceData::Revisions { current, history } = data else {
                return Err(ConformError::NotFound {
                    what: path.base_path(),
                });
            };
            Ok(ResponseEnvelope::Success {
                status: 200,
                body: json!({ "current": current, "history": history }),
                links: vec![self_link(path)],
                pagination: None,
            })
        }
        Some(ReservedWord::Search) => {
            let items = collection_items(data, path)?;
            let mut matching = apply_search(items, &query.search);
            sort_collection(&mut matching, &query.sort);
            let total = matching.len() as u64;
            let window = paging_window(matching, query.paging);
            let matches: Vec<Value> =
                window.iter().map(|v| project(v, &query.fields)).collect();
            // Search results are shaped differently from a plain listing.
            Ok(ResponseEnvelope::Success {
                status: body_status(query),
                body: json!({ "matches": matches, "approximate": true }),
                links: vec![self_link(path)],
                pagination: query.paging.map(|p| pagination_meta(total, p, path, query)),
            })
        }
        None if path.is_collection() => {
            let items = collection_items(data, path)?;
            let mut matching = apply_filters(items, &query.filters);
            sort_collection(&mut matching, &query.sort);
            let total = matching.len() as u64;
            let window = paging_window(matching, query.paging);
            let body: Vec<Value> = window.iter().map(|v| project(v, &query.fields)).collect();
            Ok(ResponseEnvelope::Success {
                status: body_status(query),
                body: Value::Array(body),
                links: vec![self_link(path)],
                pagination: query.paging.map(|p| pagination_meta(total, p, path, query)),
            })
        }
        None => {
            let ResourceData::Resource(resource) = data else {
                return Err(ConformError::NotFound {
                    what: path.base_path(),
                });
            };
            Ok(ResponseEnvelope::Success {
                status: body_status(query),
                body: project(resource, &query.fields),
                links: resource_links(path, schema),
                pagination: None,
            })
        }
    }
}

/// 206 when the client narrowed the representation with `fields`.
fn body_status(query: &QueryDescriptor) -> u16 {
    if query.has_fields() {
        206
    } else {
        200
    }
}

fn collection_items<'a>(
    data: &'a ResourceData,
    path: &ParsedPath,
) -> Result<&'a [Value], ConformError> {
    match data {
        ResourceData::Collection(items) => Ok(items),
        _ => Err(ConformError::NotFound {
            what: path.base_path(),
        }),
    }
}

fn self_link(path: &ParsedPath) -> Link {
    Link {
        rel: "self".to_string(),
        href: path.base_path(),
        method: Method::Get,
    }
}

/// `self` plus one link per declared relation, ids substituted into the
/// relation's URI template.
fn resource_links(path: &ParsedPath, schema: &ResourceSchema) -> Vec<Link> {
    let mut links = vec![self_link(path)];
    if let Some(id) = &path.leaf().id {
        for (rel, template) in &schema.relations {
            let expanded = template.replace("{id}", id);
            let href = if expanded.starts_with('/') {
                format!("/{}{}", path.version, expanded)
            } else {
                format!("/{}/{}", path.version, expanded)
            };
            links.push(Link {
                rel: rel.clone(),
                href,
                method: Method::Get,
            });
        }
    }
    links
}

/// Project a body down to the requested fields. With no fields requested,
/// the body passes through untouched. Idempotent by construction.
pub fn project(value: &Value, fields: &[FieldPath]) -> Value {
    if fields.is_empty() {
        return value.clone();
    }
    let Value::Object(source) = value else {
        return value.clone();
    };

    let mut out = Map::new();
    for field in fields {
        let Some(root_value) = source.get(&field.root) else {
            continue;
        };
        match &field.sub {
            None => {
                out.insert(field.root.clone(), root_value.clone());
            }
            Some(sub) => {
                // Whole-root selection wins over a sub-selection.
                if matches!(out.get(&field.root), Some(v) if !v.is_object()) {
                    continue;
                }
                let Some(sub_value) = root_value.get(sub) else {
                    continue;
                };
                let entry = out
                    .entry(field.root.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = entry {
                    nested.insert(sub.clone(), sub_value.clone());
                }
            }
        }
    }
    Value::Object(out)
}

fn apply_filters(items: &[Value], filters: &[Filter]) -> Vec<Value> {
    items
        .iter()
        .filter(|item| filters.iter().all(|f| filter_matches(item, f)))
        .cloned()
        .collect()
}

fn filter_matches(item: &Value, filter: &Filter) -> bool {
    let attribute = item.get(&filter.attribute).unwrap_or(&Value::Null);
    filter.values.iter().any(|want| match filter.op {
        FilterOp::Eq => scalar_eq(attribute, want),
        FilterOp::Le => matches!(
            scalar_cmp(attribute, want),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Ge => matches!(
            scalar_cmp(attribute, want),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

fn apply_search(items: &[Value], terms: &[Filter]) -> Vec<Value> {
    items
        .iter()
        .filter(|item| {
            terms.iter().all(|term| {
                let attribute = item.get(&term.attribute).unwrap_or(&Value::Null);
                term.values.iter().any(|needle| scalar_contains(attribute, needle))
            })
        })
        .cloned()
        .collect()
}

fn scalar_eq(value: &Value, want: &str) -> bool {
    match value {
        Value::String(s) => s == want,
        Value::Number(n) => want
            .parse::<f64>()
            .map(|w| n.as_f64() == Some(w))
            .unwrap_or(false),
        Value::Bool(b) => want.parse::<bool>().map(|w| *b == w).unwrap_or(false),
        _ => false,
    }
}

/// Numeric comparison when both sides are numbers, lexical otherwise.
fn scalar_cmp(value: &Value, want: &str) -> Option<Ordering> {
    match value {
        Value::Number(n) => {
            let wanted = want.parse::<f64>().ok()?;
            n.as_f64()?.partial_cmp(&wanted)
        }
        Value::String(s) => {
            if let (Ok(a), Ok(b)) = (s.parse::<f64>(), want.parse::<f64>()) {
                a.partial_cmp(&b)
            } else {
                Some(s.as_str().cmp(want))
            }
        }
        _ => None,
    }
}

fn scalar_contains(value: &Value, needle: &str) -> bool {
    let haystack = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Stable sort by the sort keys, in key order.
fn sort_collection(items: &mut [Value], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    items.sort_by(|a, b| {
        for key in keys {
            let left = a.get(&key.attribute).unwrap_or(&Value::Null);
            let right = b.get(&key.attribute).unwrap_or(&Value::Null);
            let ordering = compare_values(left, right);
            let ordering = match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn paging_window(items: Vec<Value>, paging: Option<Paging>) -> Vec<Value> {
    match paging {
        None => items,
        Some(Paging { offset, limit }) => items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect(),
    }
}

/// Total count plus next/previous hrefs. The hrefs re-render the current
/// offset/limit/sort/filter combination with only the offset moved.
fn pagination_meta(
    total: u64,
    paging: Paging,
    path: &ParsedPath,
    query: &QueryDescriptor,
) -> PaginationMeta {
    let href_at = |offset: u64| {
        let mut shifted = query.clone();
        shifted.paging = Some(Paging {
            offset,
            limit: paging.limit,
        });
        format!("{}?{}", path.base_path(), render_query(&shifted))
    };

    let next = (paging.offset + paging.limit < total).then(|| href_at(paging.offset + paging.limit));
    let previous =
        (paging.offset > 0).then(|| href_at(paging.offset.saturating_sub(paging.limit)));

    PaginationMeta {
        total,
        next,
        previous,
    }
}
