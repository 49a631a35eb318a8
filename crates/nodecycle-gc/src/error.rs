//! Garbage collection error types.

use nodecycle_state::StateError;
use thiserror::Error;

/// Errors from the infrastructure provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has no such resource. An expected outcome.
    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider request timed out")]
    Timeout,
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// Errors that fail a reconciliation; the caller retries later.
#[derive(Debug, Error)]
pub enum GcError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("garbage collection cancelled")]
    Cancelled,
}

pub type GcResult<T> = Result<T, GcError>;
