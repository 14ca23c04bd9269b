//! URI grammar validation.
//!
//! Parses a request path into version, resource chain, and trailing
//! reserved word, enforcing the house URI rules:
//!
//! - the first segment is the API version, a single positive digit drawn
//!   from the supported set;
//! - resource segments are spinal-case nouns, never action verbs;
//! - identifier slots may instead carry a reserved word (`first`, `last`,
//!   `count`, `history`, `search`), which must close the path;
//! - the resource chain nests at most two levels.
//!
//! Parsing is pure: any failure is terminal for the request and maps to a
//! 400-class error.

use crate::error::GrammarError;
use crate::types::{
    ParsedPath, ReservedWord, ResourceRef, DISALLOWED_VERB_PREFIXES, MAX_NESTING,
};

/// Validate a path, segment by segment.
///
/// `supported_versions` is collaborator-supplied; the validator only
/// compares against it.
///
/// # Errors
///
/// Returns a [`GrammarError`] naming the first offending segment.
pub fn validate(
    segments: &[String],
    supported_versions: &[u8],
) -> Result<ParsedPath, GrammarError> {
    let Some(version_segment) = segments.first() else {
        return Err(GrammarError::Version {
            segment: String::new(),
        });
    };

    let version = parse_version(version_segment)?;
    if !supported_versions.contains(&version) {
        return Err(GrammarError::UnsupportedVersion {
            version,
            supported: supported_versions.to_vec(),
        });
    }

    let rest = &segments[1..];
    if rest.is_empty() {
        return Err(GrammarError::MissingResource);
    }

    let mut resources: Vec<ResourceRef> = Vec::new();
    let mut reserved: Option<ReservedWord> = None;

    for (i, segment) in rest.iter().enumerate() {
        let is_last = i == rest.len() - 1;

        if let Some(word) = ReservedWord::parse(segment) {
            if !is_last {
                return Err(GrammarError::MisplacedReservedWord {
                    word: segment.clone(),
                });
            }
            reserved = Some(word);
            continue;
        }

        if i % 2 == 0 {
            // Resource-name slot.
            check_resource_name(segment)?;
            resources.push(ResourceRef {
                name: segment.clone(),
                id: None,
            });
            if resources.len() > MAX_NESTING {
                return Err(GrammarError::ExcessiveNesting {
                    depth: resources.len(),
                });
            }
        } else {
            // Identifier slot.
            match resources.last_mut() {
                Some(leaf) => leaf.id = Some(segment.clone()),
                None => return Err(GrammarError::MissingResource),
            }
        }
    }

    if resources.is_empty() {
        return Err(GrammarError::MissingResource);
    }

    Ok(ParsedPath {
        version,
        resources,
        reserved,
    })
}

/// The version is "the highest level of the path": exactly one ASCII digit,
/// strictly positive.
fn parse_version(segment: &str) -> Result<u8, GrammarError> {
    let mut chars = segment.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_digit() && c != '0' => Ok(c as u8 - b'0'),
        _ => Err(GrammarError::Version {
            segment: segment.to_string(),
        }),
    }
}

fn check_resource_name(segment: &str) -> Result<(), GrammarError> {
    if !is_spinal_case(segment) {
        return Err(GrammarError::Segment {
            segment: segment.to_string(),
        });
    }
    if let Some(verb) = leading_verb(segment) {
        return Err(GrammarError::VerbInUri {
            segment: segment.to_string(),
            verb,
        });
    }
    Ok(())
}

/// Spinal-case: lowercase ASCII letters/digits, single hyphens between
/// non-empty tokens.
pub fn is_spinal_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Returns the disallowed verb a segment starts with, if any.
///
/// Only the leading hyphen-token is inspected, so `get-account` and
/// `getaccounts` are flagged while a noun that merely contains a verb
/// later in the name is not.
pub(crate) fn leading_verb(segment: &str) -> Option<&'static str> {
    let first_token = segment.split('-').next().unwrap_or(segment);
    DISALLOWED_VERB_PREFIXES
        .iter()
        .copied()
        .find(|verb| first_token.starts_with(verb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    const V1: &[u8] = &[1, 2, 3];

    #[test]
    fn plain_collection_parses() {
        let path = validate(&segs(&["1", "accounts"]), V1).unwrap();
        assert_eq!(path.version, 1);
        assert_eq!(path.resources.len(), 1);
        assert_eq!(path.resources[0].name, "accounts");
        assert_eq!(path.resources[0].id, None);
        assert_eq!(path.reserved, None);
    }

    #[test]
    fn identified_resource_parses() {
        let path = validate(&segs(&["1", "accounts", "007"]), V1).unwrap();
        assert_eq!(path.leaf().id.as_deref(), Some("007"));
        assert!(!path.is_collection());
    }

    #[test]
    fn nested_chain_parses() {
        let path = validate(&segs(&["2", "accounts", "007", "orders"]), V1).unwrap();
        assert_eq!(path.version, 2);
        assert_eq!(path.resources.len(), 2);
        assert_eq!(path.resources[1].name, "orders");
        assert!(path.is_collection());
    }

    #[test]
    fn spinal_case_names_accepted() {
        for name in ["specific-orders", "order-items2", "a", "x9"] {
            let path = validate(&segs(&["1", name]), V1).unwrap();
            assert_eq!(path.resources[0].name, name);
        }
    }

    #[test]
    fn non_spinal_names_rejected() {
        for name in ["Accounts", "my_orders", "-orders", "orders-", "or--ders", "ordérs"] {
            let err = validate(&segs(&["1", name]), V1).unwrap_err();
            assert!(matches!(err, GrammarError::Segment { .. }), "{name}");
        }
    }

    #[test]
    fn version_must_be_single_positive_digit() {
        for bad in ["0", "10", "v1", "", "x"] {
            let err = validate(&segs(&[bad, "accounts"]), V1).unwrap_err();
            assert!(matches!(err, GrammarError::Version { .. }), "{bad}");
        }
    }

    #[test]
    fn unsupported_version_rejected() {
        let err = validate(&segs(&["9", "accounts"]), V1).unwrap_err();
        assert!(matches!(
            err,
            GrammarError::UnsupportedVersion { version: 9, .. }
        ));
    }

    #[test]
    fn verbs_in_uri_rejected() {
        for name in ["get-account", "getaccounts", "create-order", "deleteall"] {
            let err = validate(&segs(&["1", name]), V1).unwrap_err();
            assert!(matches!(err, GrammarError::VerbInUri { .. }), "{name}");
        }
    }

    #[test]
    fn reserved_word_must_close_the_path() {
        let path = validate(&segs(&["1", "orders", "count"]), V1).unwrap();
        assert_eq!(path.reserved, Some(ReservedWord::Count));

        let err = validate(&segs(&["1", "orders", "first", "items"]), V1).unwrap_err();
        assert!(matches!(err, GrammarError::MisplacedReservedWord { .. }));
    }

    #[test]
    fn reserved_word_matches_case_insensitively() {
        let path = validate(&segs(&["1", "orders", "FIRST"]), V1).unwrap();
        assert_eq!(path.reserved, Some(ReservedWord::First));
    }

    #[test]
    fn history_after_identifier_parses() {
        let path = validate(&segs(&["1", "accounts", "007", "history"]), V1).unwrap();
        assert_eq!(path.reserved, Some(ReservedWord::History));
        assert_eq!(path.leaf().id.as_deref(), Some("007"));
    }

    #[test]
    fn nesting_beyond_two_rejected() {
        let err = validate(
            &segs(&["1", "accounts", "007", "orders", "12", "items"]),
            V1,
        )
        .unwrap_err();
        assert!(matches!(err, GrammarError::ExcessiveNesting { depth: 3 }));
    }

    #[test]
    fn version_alone_is_missing_resource() {
        let err = validate(&segs(&["1"]), V1).unwrap_err();
        assert!(matches!(err, GrammarError::MissingResource));
    }
}
