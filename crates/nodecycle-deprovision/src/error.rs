//! Deprovisioning error types.

use nodecycle_state::StateError;
use thiserror::Error;

/// Errors surfaced by the scheduling simulator.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The candidate's node started deleting while we were looking at it.
    /// Callers skip the candidate rather than fail.
    #[error("candidate node is deleting: {0}")]
    CandidateDeleting(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("simulation failed: {0}")]
    Failed(String),
}

/// Errors that abort a deprovisioning cycle.
#[derive(Debug, Error)]
pub enum DeprovisionError {
    #[error("filtering candidates: {0}")]
    Filter(#[source] StateError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("simulating scheduling: {0}")]
    Simulation(#[from] SimulationError),

    #[error("executing command: {0}")]
    Execute(#[source] anyhow::Error),

    #[error("deprovisioning cancelled")]
    Cancelled,
}

pub type DeprovisionResult<T> = Result<T, DeprovisionError>;
