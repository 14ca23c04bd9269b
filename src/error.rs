//! Error types for conformance checking, with HTTP status mapping.
//!
//! Every failure a request can provoke maps to a snake_case kind token, an
//! HTTP status, and a numeric error code (`status * 100 + ordinal`). The
//! three together feed the standard error envelope
//! `{"error": ..., "error_code": ..., "error_uri": ...}`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::MAX_NESTING;

/// Failures of the URI grammar. All map to 400.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("version segment \"{segment}\" is not a single positive digit")]
    Version { segment: String },

    #[error("version {version} is outside the supported set {supported:?}")]
    UnsupportedVersion { version: u8, supported: Vec<u8> },

    #[error("path carries no resource segment")]
    MissingResource,

    #[error("segment \"{segment}\" is not spinal-case")]
    Segment { segment: String },

    #[error("segment \"{segment}\" starts with the action verb \"{verb}\"")]
    VerbInUri { segment: String, verb: &'static str },

    #[error("reserved word \"{word}\" is not the final path segment")]
    MisplacedReservedWord { word: String },

    #[error("resource chain is {depth} levels deep, maximum is {max}", max = MAX_NESTING)]
    ExcessiveNesting { depth: usize },
}

/// Failures of the query-string grammar. All map to 400.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("\"{param}\" must be a non-negative integer, got \"{value}\"")]
    Paging { param: &'static str, value: String },

    #[error("unknown attribute \"{attribute}\" for resource \"{resource}\"")]
    UnknownAttribute { attribute: String, resource: String },

    #[error("field \"{field}\" exceeds the one-level selection depth")]
    FieldDepth { field: String },

    #[error("malformed filter \"{param}\": {reason}")]
    FilterSyntax { param: String, reason: String },
}

/// Failure of a registry lookup: the resource type is not declared.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no schema registered for resource \"{resource}\"")]
    UnknownResource { resource: String },
}

/// Errors loading schema definitions from files, strings, or URLs.
///
/// These occur at process start, never on the request path, so they carry
/// no HTTP status.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schema definition: {message}")]
    InvalidDefinition { message: String },
}

impl LoadError {
    /// Returns the CLI exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. } | Self::Read { .. } => 3, // IO
            #[cfg(feature = "remote")]
            Self::Network { .. } => 3,
            _ => 2, // Definition error
        }
    }
}

/// Top-level failure of one conformance run.
///
/// The orchestrator halts on the first failure and renders exactly one
/// error envelope from it; nothing is retried.
#[derive(Debug, Error)]
pub enum ConformError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("nothing to return for \"{what}\"")]
    NotFound { what: String },

    #[error("method {method} is not meaningful for this path")]
    MethodNotAllowed { method: String },

    #[error("no acceptable representation: {detail}")]
    NotAcceptable { detail: String },

    #[error("request carries no credentials")]
    MissingCredentials,

    #[error("credentials were rejected")]
    Forbidden,

    #[error("request body failed validation with {} error(s)", errors.len())]
    InvalidBody { errors: Vec<String> },
}

impl ConformError {
    /// The HTTP status this failure maps to. Never 500: engine defects are
    /// not representable here.
    pub fn status_code(&self) -> u16 {
        match self {
            ConformError::Grammar(_) | ConformError::Query(_) | ConformError::InvalidBody { .. } => {
                400
            }
            ConformError::MissingCredentials => 401,
            ConformError::Forbidden => 403,
            ConformError::Registry(_) | ConformError::NotFound { .. } => 404,
            ConformError::MethodNotAllowed { .. } => 405,
            ConformError::NotAcceptable { .. } => 406,
        }
    }

    /// Machine-readable kind token, used as the `error` field of envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            ConformError::Grammar(e) => match e {
                GrammarError::Version { .. } => "version_malformed",
                GrammarError::UnsupportedVersion { .. } => "version_not_supported",
                GrammarError::MissingResource | GrammarError::Segment { .. } => "segment_grammar",
                GrammarError::VerbInUri { .. } => "verb_in_uri",
                GrammarError::MisplacedReservedWord { .. } => "misplaced_reserved_word",
                GrammarError::ExcessiveNesting { .. } => "excessive_nesting",
            },
            ConformError::Query(e) => match e {
                QueryError::Paging { .. } => "paging_invalid",
                QueryError::UnknownAttribute { .. } => "unknown_attribute",
                QueryError::FieldDepth { .. } => "field_depth",
                QueryError::FilterSyntax { .. } => "filter_syntax",
            },
            ConformError::InvalidBody { .. } => "invalid_body",
            ConformError::MissingCredentials => "missing_credentials",
            ConformError::Forbidden => "forbidden",
            ConformError::Registry(_) | ConformError::NotFound { .. } => "not_found",
            ConformError::MethodNotAllowed { .. } => "method_not_allowed",
            ConformError::NotAcceptable { .. } => "not_acceptable",
        }
    }

    /// Numeric error code: `status * 100 + ordinal` within the status class.
    pub fn error_code(&self) -> u32 {
        let ordinal: u32 = match self {
            ConformError::Grammar(e) => match e {
                GrammarError::Version { .. } => 1,
                GrammarError::UnsupportedVersion { .. } => 2,
                GrammarError::MissingResource | GrammarError::Segment { .. } => 3,
                GrammarError::VerbInUri { .. } => 4,
                GrammarError::MisplacedReservedWord { .. } => 5,
                GrammarError::ExcessiveNesting { .. } => 6,
            },
            ConformError::Query(e) => match e {
                QueryError::Paging { .. } => 7,
                QueryError::UnknownAttribute { .. } => 8,
                QueryError::FieldDepth { .. } => 9,
                QueryError::FilterSyntax { .. } => 10,
            },
            ConformError::InvalidBody { .. } => 11,
            _ => 1,
        };
        u32::from(self.status_code()) * 100 + ordinal
    }
}
