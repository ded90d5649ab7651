//! Error types for the document store client.
//!
//! # Design
//! Write operations have exactly one success status, so anything else is a
//! typed failure. A 409 gets its own `Conflict` variant because callers are
//! expected to react to it (re-fetch, then retry with the fresh revision).
//! Every other unexpected status lands in `Response` together with the verb
//! and path that produced it.
//!
//! Reads (`get`, GET-style views) never produce `Conflict` or `Response`:
//! a non-200 there is a soft miss and surfaces as `None`.

use thiserror::Error;

use crate::http::HttpMethod;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by `StoreClient` operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The server rejected a write because the supplied revision is stale (409).
    #[error("revision conflict on {method} {path}")]
    Conflict { method: HttpMethod, path: String },

    /// The server answered with a status other than the one the operation expects.
    #[error("unexpected status {status} from {method} {path}")]
    Response {
        status: u16,
        method: HttpMethod,
        path: String,
    },

    /// The transport could not complete the exchange; no status was obtained.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Status code carried by the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Conflict { .. } => Some(409),
            StoreError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}
