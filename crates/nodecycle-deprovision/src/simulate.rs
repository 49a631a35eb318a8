//! Scheduling simulation gate.
//!
//! Before a node is removed we ask: if this node disappeared, where would
//! its pods go, and what new capacity would have to be launched first?
//! [`SchedulingSimulator`] is that question. [`BinPackSimulator`] answers
//! it against the state store with first-fit-decreasing packing.

use std::collections::HashMap;

use async_trait::async_trait;
use nodecycle_state::{PodInfo, Resources, StateStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::Candidate;
use crate::error::SimulationError;

/// New capacity required before a candidate can be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementSpec {
    /// Provisioner to launch from.
    pub provisioner: Option<String>,
    pub capacity: Resources,
    /// `{namespace}/{name}` of the pods expected to land on it.
    pub pods: Vec<String>,
}

/// Outcome of simulating a candidate's removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationResult {
    /// Capacity to launch first; empty when existing nodes absorb everything.
    pub replacements: Vec<ReplacementSpec>,
    /// False when some pods fit nowhere, not even on a replacement.
    pub all_pods_scheduled: bool,
}

/// Answers "what happens to this node's workload if it is removed".
///
/// Implementations may race with the cluster: a candidate that starts
/// deleting mid-simulation must be reported as
/// [`SimulationError::CandidateDeleting`] so callers can move on.
#[async_trait]
pub trait SchedulingSimulator: Send + Sync {
    async fn simulate(&self, candidate: &Candidate) -> Result<SimulationResult, SimulationError>;
}

/// Simulates rescheduling against the nodes and pods in the state store.
///
/// Pods are placed largest first onto the first live node with room, in
/// node-name order. Whatever is left is packed onto replacement nodes
/// shaped like the candidate's provisioner template (or the candidate
/// itself when the provisioner has none).
#[derive(Clone)]
pub struct BinPackSimulator {
    state: StateStore,
}

impl BinPackSimulator {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }
}

#[async_trait]
impl SchedulingSimulator for BinPackSimulator {
    async fn simulate(&self, candidate: &Candidate) -> Result<SimulationResult, SimulationError> {
        match self.state.get_node(candidate.name())? {
            Some(node) if !node.is_terminating() => {}
            _ => return Err(SimulationError::CandidateDeleting(candidate.name().to_string())),
        }

        let pods = self.state.list_pods()?;
        let mut evicted: Vec<&PodInfo> = Vec::new();
        let mut used: HashMap<&str, Resources> = HashMap::new();
        for pod in &pods {
            match pod.node_name.as_deref() {
                Some(node) if node == candidate.name() => evicted.push(pod),
                Some(node) => {
                    let entry = used.entry(node).or_default();
                    *entry = entry.saturating_add(&pod.requests);
                }
                None => {}
            }
        }

        let nodes = self.state.list_nodes()?;
        let mut free: Vec<(String, Resources)> = nodes
            .iter()
            .filter(|n| n.name != candidate.name() && !n.is_terminating())
            .map(|n| {
                let in_use = used.get(n.name.as_str()).copied().unwrap_or_default();
                (n.name.clone(), n.capacity.saturating_sub(&in_use))
            })
            .collect();

        // Largest first; ties broken by key for determinism.
        evicted.sort_by(|a, b| {
            (b.requests.cpu_millis, b.requests.memory_bytes)
                .cmp(&(a.requests.cpu_millis, a.requests.memory_bytes))
                .then_with(|| a.table_key().cmp(&b.table_key()))
        });

        let template = candidate
            .provisioner()
            .and_then(|p| p.node_capacity)
            .unwrap_or_else(|| candidate.capacity());
        let provisioner = candidate.provisioner().map(|p| p.name.clone());

        let mut replacements: Vec<(Resources, ReplacementSpec)> = Vec::new();
        let mut all_pods_scheduled = true;

        for pod in evicted {
            if let Some((_, room)) = free.iter_mut().find(|(_, room)| room.fits(&pod.requests)) {
                *room = room.saturating_sub(&pod.requests);
                continue;
            }
            if let Some((room, spec)) = replacements
                .iter_mut()
                .find(|(room, _)| room.fits(&pod.requests))
            {
                *room = room.saturating_sub(&pod.requests);
                spec.pods.push(pod.table_key());
                continue;
            }
            if template.fits(&pod.requests) {
                replacements.push((
                    template.saturating_sub(&pod.requests),
                    ReplacementSpec {
                        provisioner: provisioner.clone(),
                        capacity: template,
                        pods: vec![pod.table_key()],
                    },
                ));
                continue;
            }
            debug!(
                node = %candidate.name(),
                pod = %pod.table_key(),
                "pod fits on no existing or replacement node"
            );
            all_pods_scheduled = false;
        }

        Ok(SimulationResult {
            replacements: replacements.into_iter().map(|(_, spec)| spec).collect(),
            all_pods_scheduled,
        })
    }
}
