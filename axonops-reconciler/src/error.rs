//! Error types for the control-plane client and reconcilers.

use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::model::ResourceKind;

/// Errors that can occur while talking to the control plane or converging a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection settings are incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// Login exchange did not yield a usable session token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A named dashboard, chart, integration or host could not be resolved.
    #[error("{kind} '{name}' not found")]
    ReferenceNotFound { kind: &'static str, name: String },

    /// Connection, TLS or timeout failure.
    #[error("{method} {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response status outside the allow-list.
    #[error("{method} {url} returned {status}: {body}")]
    ApiStatus {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    /// A body or record that had to be read could not be decoded.
    #[error("cannot decode {context}: {reason}")]
    Decode { context: String, reason: String },

    /// Required property combination missing for a present resource.
    #[error("invalid {kind} '{key}': {reason}")]
    Validation {
        kind: ResourceKind,
        key: String,
        reason: String,
    },

    /// Integration name already used by an integration of another type.
    #[error("integration '{name}' already exists with type '{existing_type}', integration names must be unique")]
    NamingConflict { name: String, existing_type: String },

    /// Convergence of one resource failed.
    #[error("{kind} '{key}': {source}")]
    Convergence {
        kind: ResourceKind,
        key: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        Error::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::ReferenceNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Attach the resource kind and natural key to an error.
    pub fn in_resource(self, kind: ResourceKind, key: impl Into<String>) -> Self {
        match self {
            already @ Error::Convergence { .. } => already,
            other => Error::Convergence {
                kind,
                key: key.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying cause, unwrapping convergence context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Convergence { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for control-plane and reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
