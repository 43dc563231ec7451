//! Error kinds for the ingestion core.
//!
//! The policy split: analyzer errors are retried once per chunk and then
//! surfaced; malformed candidates are dropped locally with a debug log;
//! anything that would corrupt the persisted graph is fatal and prevents
//! the snapshot from being written.

use crate::model::EntityType;
use ares_core::VfsError;

/// Fatal errors surfaced by `Pipeline::append_doc`.
#[derive(Debug)]
pub enum IngestError {
    /// The document id is already present in the graph. No state change.
    DuplicateDocument { doc_id: String },
    /// The analyzer was unreachable for every chunk. No state change.
    AnalyzerUnavailable { analyzer: String, detail: String },
    /// An EID or AID allocation would exceed its bit width.
    IdSpaceExhausted { registry: &'static str },
    /// A relation references an entity id missing from the snapshot, or a
    /// comparable internal inconsistency. The in-memory graph is discarded.
    InvariantViolation { detail: String },
    /// Persisting the snapshot or a registry failed.
    Storage(VfsError),
    /// The snapshot or a registry could not be serialized.
    Serialization(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::DuplicateDocument { doc_id } => {
                write!(f, "document '{}' already exists in the graph", doc_id)
            }
            IngestError::AnalyzerUnavailable { analyzer, detail } => {
                write!(f, "analyzer '{}' unavailable: {}", analyzer, detail)
            }
            IngestError::IdSpaceExhausted { registry } => {
                write!(f, "{} id space exhausted", registry)
            }
            IngestError::InvariantViolation { detail } => {
                write!(f, "graph invariant violated: {}", detail)
            }
            IngestError::Storage(e) => write!(f, "storage error: {}", e),
            IngestError::Serialization(s) => write!(f, "serialization error: {}", s),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<VfsError> for IngestError {
    fn from(e: VfsError) -> Self {
        IngestError::Storage(e)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Serialization(e.to_string())
    }
}

/// Errors from a single analyzer call.
#[derive(Debug)]
pub enum AnalyzerError {
    /// Transport-level failure (connection refused, DNS, ...).
    Network(String),
    /// Non-2xx response; body is a human-readable reason.
    Status { code: u16, body: String },
    /// The response body did not match the wire schema.
    Malformed(String),
    /// The per-chunk deadline elapsed.
    Timeout { millis: u64 },
}

impl std::fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyzerError::Network(s) => write!(f, "network error: {}", s),
            AnalyzerError::Status { code, body } => write!(f, "status {}: {}", code, body),
            AnalyzerError::Malformed(s) => write!(f, "malformed response: {}", s),
            AnalyzerError::Timeout { millis } => write!(f, "timed out after {}ms", millis),
        }
    }
}

impl std::error::Error for AnalyzerError {}

/// Why the canonical normalizer rejected a candidate surface form.
///
/// The reason is observable; callers log it at debug. This gate is the main
/// precision lever in the extractor, so silent rejection is not acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceReject {
    Empty,
    /// The surface is a pronoun or deictic ("he", "there", ...).
    Pronoun { token: String },
    /// The surface contains a finite verb from the closed list.
    FiniteVerb { token: String },
    /// A salvage-eligible type carried a lowercase token outside the
    /// connector/title whitelists.
    LowercaseToken {
        entity_type: EntityType,
        token: String,
    },
}

impl std::fmt::Display for SurfaceReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceReject::Empty => write!(f, "empty surface"),
            SurfaceReject::Pronoun { token } => write!(f, "pronoun/deictic '{}'", token),
            SurfaceReject::FiniteVerb { token } => write!(f, "finite verb '{}'", token),
            SurfaceReject::LowercaseToken { entity_type, token } => {
                write!(f, "lowercase token '{}' in {} surface", token, entity_type)
            }
        }
    }
}
