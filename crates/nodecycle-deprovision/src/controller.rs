//! Deprovisioning controller: one decision per cycle.
//!
//! Builds fresh candidates from the state store, offers them to each
//! registered deprovisioner in registration order, and executes the first
//! command that is not `DoNothing`. The actual provider and state mutations
//! are delegated to a [`CommandExecutor`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodecycle_metrics::Metrics;
use nodecycle_state::{Provisioner, StateStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::candidate::Candidate;
use crate::command::Command;
use crate::deprovisioner::{Deprovisioner, Reason};
use crate::error::{DeprovisionError, DeprovisionResult};
use crate::settings::Settings;

/// Carries out a command: launches replacements and removes the node.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &Command, reason: Reason) -> anyhow::Result<()>;
}

/// Drives registered deprovisioners against the state store.
pub struct DeprovisioningController {
    state: StateStore,
    deprovisioners: Vec<Box<dyn Deprovisioner>>,
    executor: Arc<dyn CommandExecutor>,
    metrics: Metrics,
}

impl DeprovisioningController {
    pub fn new(state: StateStore, executor: Arc<dyn CommandExecutor>, metrics: Metrics) -> Self {
        Self {
            state,
            deprovisioners: Vec::new(),
            executor,
            metrics,
        }
    }

    /// Register a deprovisioner. Earlier registrations are consulted first.
    pub fn with_deprovisioner(mut self, deprovisioner: impl Deprovisioner + 'static) -> Self {
        self.deprovisioners.push(Box::new(deprovisioner));
        self
    }

    /// Snapshot every live node launched by a provisioner.
    ///
    /// The provisioner is attached when it still exists; nodes whose
    /// provisioner was deleted are still candidates, without a policy.
    pub fn candidates(&self) -> DeprovisionResult<Vec<Candidate>> {
        let mut provisioners: HashMap<String, Option<Provisioner>> = HashMap::new();
        let mut candidates = Vec::new();
        for node in self.state.list_nodes()? {
            if node.is_terminating() {
                continue;
            }
            let Some(name) = node.provisioner_name().map(str::to_string) else {
                continue;
            };
            let provisioner = match provisioners.get(&name) {
                Some(p) => p.clone(),
                None => {
                    let p = self.state.get_provisioner(&name)?;
                    provisioners.insert(name, p.clone());
                    p
                }
            };
            candidates.push(Candidate::new(node, provisioner));
        }
        Ok(candidates)
    }

    /// Run one decision cycle. Returns the executed command, if any.
    pub async fn reconcile(
        &self,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> DeprovisionResult<Option<(Reason, Command)>> {
        let candidates = self.candidates()?;

        for deprovisioner in &self.deprovisioners {
            let reason = deprovisioner.reason();
            let eligible: Vec<Candidate> = candidates
                .iter()
                .filter(|c| deprovisioner.should_deprovision(settings, c))
                .cloned()
                .collect();
            if eligible.is_empty() {
                continue;
            }
            debug!(deprovisioner = %reason, eligible = eligible.len(), "computing command");

            let command = deprovisioner.compute_command(cancel, eligible).await?;
            if command.is_do_nothing() {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(DeprovisionError::Cancelled);
            }

            self.executor
                .execute(&command, reason)
                .await
                .map_err(DeprovisionError::Execute)?;

            for candidate in command.candidates() {
                self.metrics
                    .node_terminated(reason.as_str(), candidate.provisioner_name());
                info!(
                    node = %candidate.name(),
                    deprovisioner = %reason,
                    action = %command.action(),
                    replacements = command.replacements().len(),
                    "deprovisioning command issued"
                );
            }
            return Ok(Some((reason, command)));
        }

        debug!("no deprovisioning action this cycle");
        Ok(None)
    }

    /// Run the controller loop until `cancel` fires.
    pub async fn run(&self, settings: Settings, interval: Duration, cancel: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            drift_enabled = settings.drift_enabled,
            deprovisioners = self.deprovisioners.len(),
            "deprovisioning controller started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.reconcile(&settings, &cancel).await {
                        Ok(_) => {}
                        Err(DeprovisionError::Cancelled) => break,
                        Err(e) => error!(error = %e, "deprovisioning cycle failed"),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("deprovisioning controller shutting down");
    }
}
