//! Drift: removes nodes the drift detector marked as diverged from their
//! provisioner's template.

use std::sync::Arc;

use async_trait::async_trait;
use nodecycle_metrics::Metrics;
use nodecycle_state::{StateStore, VOLUNTARY_DISRUPTION_ANNOTATION, VOLUNTARY_DISRUPTION_DRIFTED};
use tokio_util::sync::CancellationToken;

use crate::candidate::Candidate;
use crate::command::Command;
use crate::deprovisioner::{Deprovisioner, Reason, first_feasible};
use crate::error::DeprovisionResult;
use crate::filter::filter_candidates;
use crate::settings::Settings;
use crate::simulate::SchedulingSimulator;

/// Deprovisions drifted nodes, in the order the filter returns them.
pub struct Drift {
    state: StateStore,
    simulator: Arc<dyn SchedulingSimulator>,
    metrics: Metrics,
}

impl Drift {
    pub fn new(state: StateStore, simulator: Arc<dyn SchedulingSimulator>, metrics: Metrics) -> Self {
        Self {
            state,
            simulator,
            metrics,
        }
    }
}

#[async_trait]
impl Deprovisioner for Drift {
    fn should_deprovision(&self, settings: &Settings, candidate: &Candidate) -> bool {
        if !settings.drift_enabled {
            return false;
        }
        candidate
            .annotations()
            .get(VOLUNTARY_DISRUPTION_ANNOTATION)
            .is_some_and(|v| v == VOLUNTARY_DISRUPTION_DRIFTED)
    }

    async fn compute_command(
        &self,
        cancel: &CancellationToken,
        candidates: Vec<Candidate>,
    ) -> DeprovisionResult<Command> {
        let candidates = filter_candidates(&self.state, &self.metrics, self.reason(), candidates)?;
        first_feasible(
            self.reason(),
            self.simulator.as_ref(),
            &self.metrics,
            cancel,
            candidates,
        )
        .await
    }

    fn reason(&self) -> Reason {
        Reason::Drift
    }
}
