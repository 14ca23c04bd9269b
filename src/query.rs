//! Query-string interpretation.
//!
//! Turns raw query parameters into a [`QueryDescriptor`]: paging window,
//! sort keys, field selection, and attribute filters or search terms.
//!
//! Grammar summary:
//!
//! | key | value | meaning |
//! |---|---|---|
//! | `offset`, `limit` | non-negative integer | paging window (both or neither) |
//! | `sort` | `[+\|-]attr,...` | sort keys, ascending by default |
//! | `fields` | `attr[.sub],...` | projection, one dotted level at most |
//! | anything else | `attr(=\|<=\|>=)v[,v...]` | filter (or search term under `/search`) |
//!
//! The interpreter is pure and total given a schema: no I/O, no retries.

use crate::error::QueryError;
use crate::types::{
    Filter, FilterOp, FieldPath, Paging, ParsedPath, QueryDescriptor, ReservedWord,
    ResourceSchema, SortDirection, SortKey,
};

/// Interpret query parameters against a validated path and its schema.
///
/// # Errors
///
/// Returns the first [`QueryError`] encountered, in parameter order.
pub fn interpret(
    params: &[(String, String)],
    path: &ParsedPath,
    schema: &ResourceSchema,
) -> Result<QueryDescriptor, QueryError> {
    let searching = path.reserved == Some(ReservedWord::Search);
    let mut descriptor = QueryDescriptor::default();

    let mut offset: Option<u64> = None;
    let mut limit: Option<u64> = None;

    for (key, value) in params {
        match key.as_str() {
            "offset" => offset = Some(parse_paging_value("offset", value)?),
            "limit" => limit = Some(parse_paging_value("limit", value)?),
            "sort" => descriptor.sort = parse_sort(value, schema)?,
            "fields" => descriptor.fields = parse_fields(value, schema)?,
            _ => {
                let filter = parse_filter(key, value, schema)?;
                if searching {
                    if filter.op != FilterOp::Eq {
                        return Err(QueryError::FilterSyntax {
                            param: key.clone(),
                            reason: "search supports equality matching only".to_string(),
                        });
                    }
                    descriptor.search.push(filter);
                } else {
                    descriptor.filters.push(filter);
                }
            }
        }
    }

    // A lone offset or limit is validated above but applies no window.
    if let (Some(offset), Some(limit)) = (offset, limit) {
        descriptor.paging = Some(Paging { offset, limit });
    }

    Ok(descriptor)
}

fn parse_paging_value(param: &'static str, value: &str) -> Result<u64, QueryError> {
    // u64 parsing rejects negatives and non-numeric input in one go.
    value
        .parse::<u64>()
        .map_err(|_| QueryError::Paging {
            param,
            value: value.to_string(),
        })
}

fn parse_sort(value: &str, schema: &ResourceSchema) -> Result<Vec<SortKey>, QueryError> {
    let mut keys = Vec::new();
    for token in value.split(',') {
        let (direction, attribute) = match token.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (
                SortDirection::Ascending,
                token.strip_prefix('+').unwrap_or(token),
            ),
        };
        if attribute.is_empty() {
            return Err(QueryError::FilterSyntax {
                param: "sort".to_string(),
                reason: format!("empty sort token in \"{value}\""),
            });
        }
        if !schema.has_attribute(attribute) {
            return Err(QueryError::UnknownAttribute {
                attribute: attribute.to_string(),
                resource: schema.name.clone(),
            });
        }
        keys.push(SortKey {
            attribute: attribute.to_string(),
            direction,
        });
    }
    Ok(keys)
}

fn parse_fields(value: &str, schema: &ResourceSchema) -> Result<Vec<FieldPath>, QueryError> {
    let mut fields = Vec::new();
    for token in value.split(',') {
        if token.is_empty() {
            return Err(QueryError::FilterSyntax {
                param: "fields".to_string(),
                reason: format!("empty field token in \"{value}\""),
            });
        }
        let mut parts = token.split('.');
        let root = parts.next().unwrap_or_default();
        let sub = parts.next();
        if parts.next().is_some() {
            // Selection stops at one level of the resource itself.
            return Err(QueryError::FieldDepth {
                field: token.to_string(),
            });
        }
        if !schema.has_attribute(root) {
            return Err(QueryError::UnknownAttribute {
                attribute: root.to_string(),
                resource: schema.name.clone(),
            });
        }
        fields.push(FieldPath {
            root: root.to_string(),
            sub: sub.map(String::from),
        });
    }
    Ok(fields)
}

/// Parse one `attribute<op>value[,value...]` pair.
///
/// The operator may straddle the key/value split of a naive `k=v` parse:
/// `amount<=500` arrives as key `amount<`, value `500`. Both that form and
/// an unsplit `amount<=500` key are accepted.
fn parse_filter(key: &str, value: &str, schema: &ResourceSchema) -> Result<Filter, QueryError> {
    let (attribute, op, raw_values) = split_operator(key, value)?;

    if attribute.is_empty() {
        return Err(QueryError::FilterSyntax {
            param: key.to_string(),
            reason: "missing attribute before operator".to_string(),
        });
    }
    if attribute.contains('<') || attribute.contains('>') || attribute.contains('=') {
        return Err(QueryError::FilterSyntax {
            param: key.to_string(),
            reason: "malformed comparison operator".to_string(),
        });
    }
    if raw_values.is_empty() {
        return Err(QueryError::FilterSyntax {
            param: key.to_string(),
            reason: "missing value".to_string(),
        });
    }
    if !schema.has_attribute(attribute) {
        return Err(QueryError::UnknownAttribute {
            attribute: attribute.to_string(),
            resource: schema.name.clone(),
        });
    }

    Ok(Filter {
        attribute: attribute.to_string(),
        op,
        values: raw_values.split(',').map(String::from).collect(),
    })
}

fn split_operator<'a>(
    key: &'a str,
    value: &'a str,
) -> Result<(&'a str, FilterOp, &'a str), QueryError> {
    if let Some(attr) = key.strip_suffix("<=").or_else(|| key.strip_suffix('<')) {
        return Ok((attr, FilterOp::Le, value));
    }
    if let Some(attr) = key.strip_suffix(">=").or_else(|| key.strip_suffix('>')) {
        return Ok((attr, FilterOp::Ge, value));
    }
    if let Some((attr, rhs)) = key.split_once("<=") {
        return unsplit(key, attr, FilterOp::Le, rhs, value);
    }
    if let Some((attr, rhs)) = key.split_once(">=") {
        return unsplit(key, attr, FilterOp::Ge, rhs, value);
    }
    Ok((key, FilterOp::Eq, value))
}

// Whole-expression form: the comparison never reached the value slot.
fn unsplit<'a>(
    key: &str,
    attr: &'a str,
    op: FilterOp,
    rhs: &'a str,
    value: &'a str,
) -> Result<(&'a str, FilterOp, &'a str), QueryError> {
    if value.is_empty() {
        Ok((attr, op, rhs))
    } else {
        Err(QueryError::FilterSyntax {
            param: key.to_string(),
            reason: "unexpected value after comparison expression".to_string(),
        })
    }
}

/// Render a descriptor back to its canonical query string.
///
/// Pagination links are built from this rendering, so offset, limit, sort,
/// and filters all round-trip.
pub fn render_query(descriptor: &QueryDescriptor) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(paging) = descriptor.paging {
        parts.push(format!("offset={}", paging.offset));
        parts.push(format!("limit={}", paging.limit));
    }
    if !descriptor.sort.is_empty() {
        parts.push(format!("sort={}", render_sort(&descriptor.sort)));
    }
    if !descriptor.fields.is_empty() {
        let joined: Vec<String> = descriptor.fields.iter().map(|f| f.to_string()).collect();
        parts.push(format!("fields={}", joined.join(",")));
    }
    for filter in descriptor.filters.iter().chain(&descriptor.search) {
        let op = match filter.op {
            FilterOp::Eq => "=",
            FilterOp::Le => "<=",
            FilterOp::Ge => ">=",
        };
        parts.push(format!("{}{}{}", filter.attribute, op, filter.values.join(",")));
    }

    parts.join("&")
}

/// Render sort keys: descending keys keep their `-` prefix, ascending keys
/// are bare (the `+` prefix is the default and is normalized away).
pub fn render_sort(keys: &[SortKey]) -> String {
    let tokens: Vec<String> = keys
        .iter()
        .map(|k| match k.direction {
            SortDirection::Ascending => k.attribute.clone(),
            SortDirection::Descending => format!("-{}", k.attribute),
        })
        .collect();
    tokens.join(",")
}
