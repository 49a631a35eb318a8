//! Garbage collector for machine records.

use std::sync::Arc;
use std::time::Duration;

use nodecycle_metrics::Metrics;
use nodecycle_state::{Machine, StateStore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::PresenceCache;
use crate::error::{GcError, GcResult};
use crate::provider::CloudProvider;

/// Termination reason recorded for collected records.
const GARBAGE_COLLECTED: &str = "garbage_collected";

/// What a single reconciliation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcOutcome {
    /// The record has not been launched yet.
    NotCreated,
    /// A node still represents the record.
    NodePresent,
    /// Recently confirmed at the provider; look again after `requeue_after`.
    CachedPresent { requeue_after: Duration },
    /// The provider confirmed the resource exists.
    Confirmed,
    /// The provider reported the resource gone and the record was deleted.
    Collected,
    /// The record was already deleted by someone else.
    AlreadyGone,
}

impl GcOutcome {
    /// Requeue hint for the caller, if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            GcOutcome::CachedPresent { requeue_after } => Some(*requeue_after),
            _ => None,
        }
    }
}

/// Reconciles machine records against the provider's ground truth.
pub struct GarbageCollector {
    state: StateStore,
    provider: Arc<dyn CloudProvider>,
    cache: PresenceCache,
    metrics: Metrics,
}

impl GarbageCollector {
    pub fn new(
        state: StateStore,
        provider: Arc<dyn CloudProvider>,
        cache: PresenceCache,
        metrics: Metrics,
    ) -> Self {
        Self {
            state,
            provider,
            cache,
            metrics,
        }
    }

    pub fn cache(&self) -> &PresenceCache {
        &self.cache
    }

    /// Reconcile one record. Only provider errors and store failures are
    /// errors; a record that vanished underneath us is not.
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        machine: &Machine,
    ) -> GcResult<GcOutcome> {
        if !machine.created {
            return Ok(GcOutcome::NotCreated);
        }

        let Some(provider_id) = machine.provider_id.as_deref() else {
            // Launched but never bound to a resource: nothing backs it.
            return self.collect(machine).await;
        };

        let nodes = self.state.nodes_for_provider_id(provider_id)?;
        if nodes.len() > 1 {
            warn!(
                machine = %machine.name,
                %provider_id,
                nodes = nodes.len(),
                "multiple nodes share a provider id"
            );
        }
        if !nodes.is_empty() {
            return Ok(GcOutcome::NodePresent);
        }

        if let Some(requeue_after) = self.cache.remaining(&machine.name).await {
            debug!(machine = %machine.name, requeue_secs = requeue_after.as_secs(), "presence cached");
            return Ok(GcOutcome::CachedPresent { requeue_after });
        }

        if cancel.is_cancelled() {
            return Err(GcError::Cancelled);
        }
        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GcError::Cancelled),
            r = self.provider.get(provider_id) => r,
        };

        match lookup {
            Ok(_) => {
                self.cache.insert(&machine.name).await;
                Ok(GcOutcome::Confirmed)
            }
            Err(e) if e.is_not_found() => self.collect(machine).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Reconcile a record by name, reading it fresh from the store.
    pub async fn reconcile_by_name(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> GcResult<GcOutcome> {
        match self.state.get_machine(name)? {
            Some(machine) => self.reconcile(cancel, &machine).await,
            None => Ok(GcOutcome::AlreadyGone),
        }
    }

    async fn collect(&self, machine: &Machine) -> GcResult<GcOutcome> {
        if !self.state.delete_machine(&machine.name)? {
            return Ok(GcOutcome::AlreadyGone);
        }
        let provisioner = machine.provisioner.as_deref().unwrap_or_default();
        self.metrics.machine_terminated(GARBAGE_COLLECTED, provisioner);
        info!(
            machine = %machine.name,
            provider_id = machine.provider_id.as_deref().unwrap_or_default(),
            %provisioner,
            "garbage collected machine"
        );
        Ok(GcOutcome::Collected)
    }

    /// One pass over every machine record, reconciled concurrently.
    pub async fn collect_once(self: &Arc<Self>, cancel: &CancellationToken) -> GcResult<usize> {
        let swept = self.cache.sweep().await;
        if swept > 0 {
            debug!(swept, "dropped expired presence entries");
        }

        let mut tasks = JoinSet::new();
        for machine in self.state.list_machines()? {
            let gc = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = gc.reconcile(&cancel, &machine).await;
                (machine.name, outcome)
            });
        }

        let mut collected = 0;
        while let Some(joined) = tasks.join_next().await {
            let (name, outcome) = match joined {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "garbage collection task panicked");
                    continue;
                }
            };
            match outcome {
                Ok(GcOutcome::Collected) => collected += 1,
                Ok(outcome) => {
                    if let Some(after) = outcome.requeue_after() {
                        debug!(machine = %name, requeue_secs = after.as_secs(), "requeue");
                    }
                }
                Err(GcError::Cancelled) => return Err(GcError::Cancelled),
                Err(e) => warn!(machine = %name, error = %e, "garbage collection failed"),
            }
        }
        Ok(collected)
    }

    /// Run collection passes every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            presence_ttl_secs = self.cache.ttl().as_secs(),
            "machine garbage collector started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.collect_once(&cancel).await {
                        Ok(0) => {}
                        Ok(n) => debug!(collected = n, "garbage collection pass complete"),
                        Err(GcError::Cancelled) => break,
                        Err(e) => error!(error = %e, "garbage collection pass failed"),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("machine garbage collector shutting down");
    }
}
