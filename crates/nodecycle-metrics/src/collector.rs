//! Metrics collector: labelled counters for controller decisions.
//!
//! Each series is an `AtomicU64` behind a shared map, so increments from
//! concurrent reconciliations never lose updates. The map lock is only
//! taken for writing the first time a label combination is seen.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

/// Nodes removed by a deprovisioning command, by reason and provisioner.
pub const NODES_TERMINATED: &str = "nodecycle_nodes_terminated_total";

/// Machine records removed, by reason and provisioner.
pub const MACHINES_TERMINATED: &str = "nodecycle_machines_terminated_total";

/// Candidates dropped because their node was already going away.
pub const CANDIDATES_FILTERED: &str = "nodecycle_candidates_filtered_total";

/// Commands issued although simulation could not place every pod.
pub const UNSCHEDULABLE_PROCEEDING: &str = "nodecycle_simulation_unschedulable_total";

pub(crate) const DESCRIPTORS: &[(&str, &str)] = &[
    (NODES_TERMINATED, "Number of nodes terminated by the deprovisioning controller."),
    (MACHINES_TERMINATED, "Number of machine records terminated."),
    (CANDIDATES_FILTERED, "Number of deprovisioning candidates filtered out."),
    (
        UNSCHEDULABLE_PROCEEDING,
        "Number of commands issued after a simulation left pods unscheduled.",
    ),
];

/// A metric name plus its sorted label pairs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SeriesKey {
    pub name: &'static str,
    pub labels: Vec<(&'static str, String)>,
}

impl SeriesKey {
    fn new(name: &'static str, labels: &[(&'static str, &str)]) -> Self {
        let mut labels: Vec<_> = labels.iter().map(|(k, v)| (*k, v.to_string())).collect();
        labels.sort();
        Self { name, labels }
    }
}

/// Shared counter registry. Cloning shares the underlying series.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    series: Arc<RwLock<BTreeMap<SeriesKey, Arc<AtomicU64>>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A deprovisioning command removed a node.
    pub fn node_terminated(&self, reason: &str, provisioner: &str) {
        self.inc(
            NODES_TERMINATED,
            &[("reason", reason), ("provisioner", provisioner)],
        );
    }

    /// A machine record was deleted.
    pub fn machine_terminated(&self, reason: &str, provisioner: &str) {
        self.inc(
            MACHINES_TERMINATED,
            &[("reason", reason), ("provisioner", provisioner)],
        );
    }

    /// A candidate was dropped before simulation.
    pub fn candidate_filtered(&self, deprovisioner: &str, cause: &str) {
        self.inc(
            CANDIDATES_FILTERED,
            &[("deprovisioner", deprovisioner), ("cause", cause)],
        );
    }

    /// A command proceeds even though not every pod found a home.
    pub fn unschedulable_proceeding(&self, deprovisioner: &str) {
        self.inc(UNSCHEDULABLE_PROCEEDING, &[("deprovisioner", deprovisioner)]);
    }

    /// Current value of a series; zero if it was never incremented.
    pub fn get(&self, name: &'static str, labels: &[(&'static str, &str)]) -> u64 {
        let key = SeriesKey::new(name, labels);
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Copy out every series in key order.
    pub(crate) fn snapshot(&self) -> Vec<(SeriesKey, u64)> {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    fn inc(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        let key = SeriesKey::new(name, labels);
        {
            let series = self.series.read().unwrap_or_else(|e| e.into_inner());
            if let Some(counter) = series.get(&key) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        series
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(1, Ordering::Relaxed);
        trace!(metric = name, "new series registered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_label_set() {
        let metrics = Metrics::new();
        metrics.node_terminated("drift", "default");
        metrics.node_terminated("drift", "default");
        metrics.node_terminated("expired", "default");

        assert_eq!(
            metrics.get(NODES_TERMINATED, &[("reason", "drift"), ("provisioner", "default")]),
            2
        );
        assert_eq!(
            metrics.get(
                NODES_TERMINATED,
                &[("reason", "expired"), ("provisioner", "default")]
            ),
            1
        );
        assert_eq!(
            metrics.get(NODES_TERMINATED, &[("reason", "drift"), ("provisioner", "gpu")]),
            0
        );
    }

    #[test]
    fn label_order_does_not_matter() {
        let metrics = Metrics::new();
        metrics.machine_terminated("garbage_collected", "default");
        assert_eq!(
            metrics.get(
                MACHINES_TERMINATED,
                &[("provisioner", "default"), ("reason", "garbage_collected")]
            ),
            1
        );
    }

    #[test]
    fn clones_share_series() {
        let metrics = Metrics::new();
        let other = metrics.clone();
        other.unschedulable_proceeding("drift");
        assert_eq!(
            metrics.get(UNSCHEDULABLE_PROCEEDING, &[("deprovisioner", "drift")]),
            1
        );
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let metrics = Metrics::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.candidate_filtered("expired", "terminating");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(
            metrics.get(
                CANDIDATES_FILTERED,
                &[("deprovisioner", "expired"), ("cause", "terminating")]
            ),
            8000
        );
    }
}
