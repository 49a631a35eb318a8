//! Expiration: removes nodes that outlived their provisioner's TTL.

use std::sync::Arc;

use async_trait::async_trait;
use nodecycle_metrics::Metrics;
use nodecycle_state::{Clock, StateStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::candidate::Candidate;
use crate::command::Command;
use crate::deprovisioner::{Deprovisioner, Reason, first_feasible};
use crate::error::DeprovisionResult;
use crate::filter::filter_candidates;
use crate::settings::Settings;
use crate::simulate::SchedulingSimulator;

/// Expiration time for nodes without a TTL: 5000-01-01T00:00:00Z.
pub const NEVER_EXPIRES: u64 = 95_617_584_000;

/// Deprovisions expired nodes, most overdue first.
pub struct Expiration {
    clock: Arc<dyn Clock>,
    state: StateStore,
    simulator: Arc<dyn SchedulingSimulator>,
    metrics: Metrics,
}

impl Expiration {
    pub fn new(
        clock: Arc<dyn Clock>,
        state: StateStore,
        simulator: Arc<dyn SchedulingSimulator>,
        metrics: Metrics,
    ) -> Self {
        Self {
            clock,
            state,
            simulator,
            metrics,
        }
    }

    /// Filter out racing candidates, then order by expiration time,
    /// earliest first. Ties keep filter order.
    pub fn filter_and_sort_candidates(
        &self,
        candidates: Vec<Candidate>,
    ) -> DeprovisionResult<Vec<Candidate>> {
        let mut candidates =
            filter_candidates(&self.state, &self.metrics, self.reason(), candidates)?;
        candidates.sort_by_key(expiration_time);
        Ok(candidates)
    }
}

/// Node creation time plus the provisioner's TTL, or [`NEVER_EXPIRES`]
/// when there is no provisioner or it sets no TTL.
pub fn expiration_time(candidate: &Candidate) -> u64 {
    match candidate
        .provisioner()
        .and_then(|p| p.ttl_seconds_until_expired)
    {
        Some(ttl) => candidate.created_at().saturating_add(ttl).min(NEVER_EXPIRES),
        None => NEVER_EXPIRES,
    }
}

#[async_trait]
impl Deprovisioner for Expiration {
    fn should_deprovision(&self, _settings: &Settings, candidate: &Candidate) -> bool {
        self.clock.now() > expiration_time(candidate)
    }

    async fn compute_command(
        &self,
        cancel: &CancellationToken,
        candidates: Vec<Candidate>,
    ) -> DeprovisionResult<Command> {
        let candidates = self.filter_and_sort_candidates(candidates)?;
        let command = first_feasible(
            self.reason(),
            self.simulator.as_ref(),
            &self.metrics,
            cancel,
            candidates,
        )
        .await?;

        if let Some(candidate) = command.candidates().first() {
            let ttl = candidate
                .provisioner()
                .and_then(|p| p.ttl_seconds_until_expired)
                .unwrap_or_default();
            let delay = self.clock.now().saturating_sub(expiration_time(candidate));
            info!(
                node = %candidate.name(),
                ttl_secs = ttl,
                delay_secs = delay,
                "triggering termination for expired node after TTL"
            );
        }
        Ok(command)
    }

    fn reason(&self) -> Reason {
        Reason::Expiration
    }
}
