//! Candidate filter: drops candidates whose node is already going away.

use nodecycle_metrics::Metrics;
use nodecycle_state::StateStore;
use tracing::debug;

use crate::candidate::Candidate;
use crate::deprovisioner::Reason;
use crate::error::{DeprovisionError, DeprovisionResult};

/// Re-read live state and keep only candidates whose node still exists,
/// is not terminating, and is not already waiting on replacements from an
/// earlier command. Survivors keep their input order.
///
/// A vanished, terminating or replacing node is an expected race: it is
/// logged and counted, never returned as an error. Only store failures
/// fail the call.
pub fn filter_candidates(
    state: &StateStore,
    metrics: &Metrics,
    reason: Reason,
    candidates: Vec<Candidate>,
) -> DeprovisionResult<Vec<Candidate>> {
    let replacing = state
        .nodes_awaiting_replacement()
        .map_err(DeprovisionError::Filter)?;

    let mut survivors = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let cause = match state.get_node(candidate.name()) {
            Ok(Some(node)) if node.is_terminating() => "terminating",
            Ok(Some(node)) if replacing.contains(&node.name) => "replacing",
            Ok(Some(_)) => {
                survivors.push(candidate);
                continue;
            }
            Ok(None) => "not_found",
            Err(e) if e.is_not_found() => "not_found",
            Err(e) => return Err(DeprovisionError::Filter(e)),
        };
        debug!(
            node = %candidate.name(),
            deprovisioner = %reason,
            cause,
            "filtered out deprovisioning candidate"
        );
        metrics.candidate_filtered(reason.as_str(), cause);
    }
    Ok(survivors)
}
