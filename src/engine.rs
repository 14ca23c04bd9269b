//! Conformance engine orchestration.
//!
//! One engine invocation processes one [`RequestDescriptor`] end-to-end:
//!
//! ```text
//! Received -> PathValidated -> QueryInterpreted -> SchemaResolved
//!          -> EnvelopeBuilt -> Done
//! ```
//!
//! The first component failure jumps straight to the absorbing `Errored`
//! state and becomes exactly one error envelope. No state is revisited and
//! nothing is retried; retries belong to the transport layer, as does
//! aborting idle connections. All work here is in-memory and bounded.
//!
//! Invocations share nothing mutable but the registry snapshot, so one
//! engine can serve any number of worker threads.

use std::sync::Arc;

use crate::envelope::{self, ResponseEnvelope};
use crate::error::ConformError;
use crate::query;
use crate::registry::SchemaRegistry;
use crate::types::{
    AuthDecision, EngineConfig, Method, ParsedPath, RequestDescriptor, ReservedWord, ResourceData,
    ResourceSchema,
};
use crate::uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Received,
    PathValidated,
    QueryInterpreted,
    SchemaResolved,
    EnvelopeBuilt,
    Done,
    Errored,
}

struct Progress {
    state: State,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: State::Received,
        }
    }

    fn advance(&mut self, to: State) {
        tracing::trace!(from = ?self.state, to = ?to, "engine transition");
        self.state = to;
    }
}

/// Validates requests and shapes responses against one configuration and
/// one schema registry.
pub struct ConformanceEngine {
    config: EngineConfig,
    registry: Arc<SchemaRegistry>,
}

impl ConformanceEngine {
    pub fn new(config: EngineConfig, registry: Arc<SchemaRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one request to exactly one envelope.
    ///
    /// `auth` is the external credential validator's outcome; `data` is the
    /// business data the storage collaborator holds for the addressed path.
    /// Failures never escape as errors: they come back as error envelopes.
    pub fn process(
        &self,
        request: &RequestDescriptor,
        auth: AuthDecision,
        data: &ResourceData,
    ) -> ResponseEnvelope {
        let mut progress = Progress::new();
        match self.run(request, auth, data, &mut progress) {
            Ok(envelope) => {
                progress.advance(State::Done);
                tracing::debug!(status = envelope.status(), "request conforms");
                envelope
            }
            Err(err) => {
                progress.advance(State::Errored);
                tracing::debug!(
                    status = err.status_code(),
                    kind = err.kind(),
                    "request rejected"
                );
                ResponseEnvelope::from_error(&err, &self.config)
            }
        }
    }

    fn run(
        &self,
        request: &RequestDescriptor,
        auth: AuthDecision,
        data: &ResourceData,
        progress: &mut Progress,
    ) -> Result<ResponseEnvelope, ConformError> {
        self.check_credentials(auth)?;
        negotiate_accept(request)?;
        negotiate_language(request, &self.config.languages)?;

        let parsed = uri::validate(&request.path, &self.config.supported_versions)?;
        progress.advance(State::PathValidated);

        check_method(request.method, &parsed)?;

        let schema = self.registry.lookup(&parsed.leaf().name)?;
        let descriptor = query::interpret(&request.query, &parsed, &schema)?;
        progress.advance(State::QueryInterpreted);

        check_reserved_support(&parsed, &schema)?;
        validate_body(request, &schema)?;
        progress.advance(State::SchemaResolved);

        let envelope = envelope::build(data, &parsed, &descriptor, &schema, request.method)?;
        progress.advance(State::EnvelopeBuilt);

        Ok(envelope)
    }

    fn check_credentials(&self, auth: AuthDecision) -> Result<(), ConformError> {
        match auth {
            AuthDecision::Denied => Err(ConformError::Forbidden),
            AuthDecision::MissingCredential if self.config.require_credentials => {
                Err(ConformError::MissingCredentials)
            }
            _ => Ok(()),
        }
    }
}

/// Which verbs are meaningful for which path shapes: POST creates into a
/// collection, PUT/DELETE address one resource, reserved-word routes are
/// read-only, GET goes anywhere.
fn check_method(method: Method, path: &ParsedPath) -> Result<(), ConformError> {
    let allowed = match method {
        Method::Get => true,
        Method::Post => path.reserved.is_none() && path.is_collection(),
        Method::Put | Method::Delete => path.reserved.is_none() && !path.is_collection(),
    };
    if allowed {
        Ok(())
    } else {
        Err(ConformError::MethodNotAllowed {
            method: method.to_string(),
        })
    }
}

/// `/history` and `/search` only exist where the schema declares them.
fn check_reserved_support(path: &ParsedPath, schema: &ResourceSchema) -> Result<(), ConformError> {
    let supported = match path.reserved {
        Some(ReservedWord::History) => schema.supports_history,
        Some(ReservedWord::Search) => schema.supports_search,
        _ => true,
    };
    if supported {
        Ok(())
    } else {
        Err(ConformError::NotFound {
            what: path.base_path(),
        })
    }
}

/// POST/PUT bodies must match the schema's embedded JSON Schema, when one
/// is declared.
fn validate_body(request: &RequestDescriptor, schema: &ResourceSchema) -> Result<(), ConformError> {
    if !matches!(request.method, Method::Post | Method::Put) {
        return Ok(());
    }
    let Some(body_schema) = &schema.body_schema else {
        return Ok(());
    };
    let Some(body) = &request.body else {
        return Err(ConformError::InvalidBody {
            errors: vec!["missing request body".to_string()],
        });
    };

    let validator = jsonschema::validator_for(body_schema).map_err(|e| {
        ConformError::InvalidBody {
            errors: vec![format!("unusable body schema: {e}")],
        }
    })?;

    let errors: Vec<String> = validator
        .iter_errors(body)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConformError::InvalidBody { errors })
    }
}

/// The engine produces JSON only; an `Accept` that cannot take JSON is a
/// 406 before any other work happens.
fn negotiate_accept(request: &RequestDescriptor) -> Result<(), ConformError> {
    let Some(accept) = request.header("accept") else {
        return Ok(());
    };
    let acceptable = accept
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or("").trim())
        .any(|mt| matches!(mt, "*/*" | "application/*" | "application/json"));
    if acceptable {
        Ok(())
    } else {
        Err(ConformError::NotAcceptable {
            detail: format!("cannot produce {accept}"),
        })
    }
}

fn negotiate_language(
    request: &RequestDescriptor,
    languages: &[String],
) -> Result<(), ConformError> {
    let Some(raw) = request.header("accept-language") else {
        return Ok(());
    };
    let acceptable = raw
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or("").trim())
        .any(|tag| {
            if tag == "*" {
                return true;
            }
            let primary = tag.split('-').next().unwrap_or(tag);
            languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(tag) || l.eq_ignore_ascii_case(primary))
        });
    if acceptable {
        Ok(())
    } else {
        Err(ConformError::NotAcceptable {
            detail: format!("no language in common with \"{raw}\""),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::new(vec![ResourceSchema {
            name: "orders".to_string(),
            attributes: vec!["id".to_string(), "state".to_string()],
            relations: Default::default(),
            supports_history: false,
            supports_search: false,
            body_schema: Some(json!({
                "type": "object",
                "properties": { "state": { "type": "string" } },
                "required": ["state"]
            })),
        }]))
    }

    fn engine() -> ConformanceEngine {
        ConformanceEngine::new(EngineConfig::new(vec![1, 2, 3]), registry())
    }

    fn parsed(raw: &str) -> ParsedPath {
        uri::validate(&crate::types::split_path(raw), &[1, 2, 3]).unwrap()
    }

    #[test]
    fn method_matrix() {
        let collection = parsed("/1/orders");
        let resource = parsed("/1/orders/12");
        let counted = parsed("/1/orders/count");

        assert!(check_method(Method::Get, &collection).is_ok());
        assert!(check_method(Method::Get, &resource).is_ok());
        assert!(check_method(Method::Get, &counted).is_ok());

        assert!(check_method(Method::Post, &collection).is_ok());
        assert!(check_method(Method::Post, &resource).is_err());
        assert!(check_method(Method::Post, &counted).is_err());

        assert!(check_method(Method::Put, &resource).is_ok());
        assert!(check_method(Method::Put, &collection).is_err());
        assert!(check_method(Method::Delete, &resource).is_ok());
        assert!(check_method(Method::Delete, &collection).is_err());
    }

    #[test]
    fn denied_credentials_are_forbidden() {
        let request = RequestDescriptor::new(Method::Get, "/1/orders");
        let env = engine().process(
            &request,
            AuthDecision::Denied,
            &ResourceData::Collection(vec![]),
        );
        assert_eq!(env.status(), 403);
    }

    #[test]
    fn missing_credentials_only_matter_when_required() {
        let request = RequestDescriptor::new(Method::Get, "/1/orders");
        let data = ResourceData::Collection(vec![]);

        let env = engine().process(&request, AuthDecision::MissingCredential, &data);
        assert_eq!(env.status(), 200);

        let strict = ConformanceEngine::new(
            EngineConfig::new(vec![1]).require_credentials(true),
            registry(),
        );
        let env = strict.process(&request, AuthDecision::MissingCredential, &data);
        assert_eq!(env.status(), 401);
    }

    #[test]
    fn unmatched_accept_is_406() {
        let request =
            RequestDescriptor::new(Method::Get, "/1/orders").with_header("Accept", "text/xml");
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Collection(vec![]),
        );
        assert_eq!(env.status(), 406);
        assert_eq!(env.to_json()["error"], json!("not_acceptable"));
    }

    #[test]
    fn language_negotiation_accepts_primary_subtag() {
        let request = RequestDescriptor::new(Method::Get, "/1/orders")
            .with_header("Accept-Language", "en-US,fr;q=0.8");
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Collection(vec![]),
        );
        assert_eq!(env.status(), 200);

        let request = RequestDescriptor::new(Method::Get, "/1/orders")
            .with_header("Accept-Language", "de-DE");
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Collection(vec![]),
        );
        assert_eq!(env.status(), 406);
    }

    #[test]
    fn history_without_support_is_404() {
        let request = RequestDescriptor::new(Method::Get, "/1/orders/12/history");
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Revisions {
                current: json!({}),
                history: vec![],
            },
        );
        assert_eq!(env.status(), 404);
    }

    #[test]
    fn post_body_is_validated_against_schema() {
        let request = RequestDescriptor::new(Method::Post, "/1/orders")
            .with_body(json!({ "state": "new" }));
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Resource(json!({ "id": "9", "state": "new" })),
        );
        assert_eq!(env.status(), 201);

        let request =
            RequestDescriptor::new(Method::Post, "/1/orders").with_body(json!({ "state": 7 }));
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Resource(json!({})),
        );
        assert_eq!(env.status(), 400);
        assert_eq!(env.to_json()["error"], json!("invalid_body"));
    }

    #[test]
    fn unknown_resource_is_404() {
        let request = RequestDescriptor::new(Method::Get, "/1/widgets");
        let env = engine().process(
            &request,
            AuthDecision::Granted,
            &ResourceData::Collection(vec![]),
        );
        assert_eq!(env.status(), 404);
        assert_eq!(env.to_json()["error"], json!("not_found"));
    }
}
