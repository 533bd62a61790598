use thiserror::Error;

/// Errors surfaced by the Storm client layer, split along the taxonomy the
/// reconcilers dispatch on: transient errors are retried by [`crate::retry`]
/// internally, everything else is returned to the caller as-is.
#[derive(Debug, Error)]
pub enum Error {
    #[error("nimbus request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("nimbus returned malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("nimbus unreachable: {0}")]
    Transient(String),

    #[error("topology '{0}' is already active")]
    AlreadyAlive(String),

    #[error("topology '{0}' is not alive")]
    NotAlive(String),

    #[error("topology '{0}' not found")]
    NotFound(String),

    #[error("nimbus rejected credentials")]
    Unauthorized,

    #[error("circuit open for endpoint '{0}', not attempting request")]
    CircuitOpen(String),
}

impl Error {
    /// Whether [`backoff`] should retry this error. Mirrors the
    /// Transient/Permanent split from the error-handling design: network
    /// failures and 5xx responses are transient, everything Nimbus has an
    /// explicit opinion about (already-alive, not-found, unauthorized) is
    /// permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transient(_))
    }
}
