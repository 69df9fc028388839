use std::fmt;

use thiserror::Error;

/// The external collaborator that failed during an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Embedder,
    Index,
    Store,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Upstream::Embedder => "embedder",
            Upstream::Index => "index",
            Upstream::Store => "chunk store",
        };
        f.write_str(name)
    }
}

/// Failure taxonomy for context assembly.
///
/// An empty candidate set is not an error; it is a successful, empty result.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Caller-correctable input problem. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A collaborator could not be reached or returned an error.
    #[error("{upstream} unavailable: {message}")]
    UpstreamUnavailable { upstream: Upstream, message: String },

    /// The request was superseded or abandoned before it completed.
    #[error("request cancelled")]
    Cancelled,
}

impl ContextError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ContextError::InvalidRequest(message.into())
    }

    pub fn upstream(upstream: Upstream, err: anyhow::Error) -> Self {
        ContextError::UpstreamUnavailable {
            upstream,
            message: format!("{:#}", err),
        }
    }

    /// Machine-readable code used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            ContextError::InvalidRequest(_) => "invalid_request",
            ContextError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ContextError::Cancelled => "superseded",
        }
    }
}
