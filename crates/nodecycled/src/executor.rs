//! Store-backed command executor.
//!
//! `delete` marks the candidate node terminating straight away. `replace`
//! only records pending replacement machines tagged with the node they
//! replace; the node is left alone until every one of them has been
//! created, at which point [`StoreExecutor::complete_replacements`] hands
//! the node over for termination. Replacements that are not created within
//! the timeout are abandoned and the node stays in service.
//!
//! Launching the pending machines is the provisioning side's job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodecycle_deprovision::{Action, Command, CommandExecutor, Reason};
use nodecycle_state::{Clock, Machine, NodeName, StateResult, StateStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_REPLACEMENT_TIMEOUT: Duration = Duration::from_secs(600);

/// What one [`StoreExecutor::complete_replacements`] pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplacementProgress {
    /// Nodes whose replacements all exist and which are now terminating.
    pub handed_over: Vec<NodeName>,
    /// Nodes whose replacements timed out; they stay in service.
    pub abandoned: Vec<NodeName>,
    /// Nodes still waiting on at least one replacement.
    pub waiting: usize,
}

pub struct StoreExecutor {
    state: StateStore,
    clock: Arc<dyn Clock>,
    replacement_timeout: Duration,
}

impl StoreExecutor {
    pub fn new(state: StateStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            state,
            clock,
            replacement_timeout: DEFAULT_REPLACEMENT_TIMEOUT,
        }
    }

    pub fn with_replacement_timeout(mut self, timeout: Duration) -> Self {
        self.replacement_timeout = timeout;
        self
    }

    /// Hand over nodes whose replacements are all created; abandon the
    /// ones whose replacements did not appear in time.
    pub fn complete_replacements(&self) -> StateResult<ReplacementProgress> {
        let now = self.clock.now();
        let mut by_node: BTreeMap<NodeName, Vec<Machine>> = BTreeMap::new();
        for machine in self.state.list_machines()? {
            if let Some(node) = machine.replacing_for.clone() {
                by_node.entry(node).or_default().push(machine);
            }
        }

        let mut progress = ReplacementProgress::default();
        for (node, machines) in by_node {
            if machines.iter().all(|m| m.created) {
                match self.state.mark_node_terminating(&node, now) {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(%node, "replaced node already gone");
                    }
                    Err(e) => return Err(e),
                }
                for mut machine in machines {
                    machine.replacing_for = None;
                    self.state.put_machine(&machine)?;
                }
                info!(%node, "replacements created, node marked terminating");
                progress.handed_over.push(node);
                continue;
            }

            let requested_at = machines.iter().map(|m| m.created_at).min().unwrap_or(now);
            let waited = now.saturating_sub(requested_at);
            if waited < self.replacement_timeout.as_secs() {
                debug!(%node, waited_secs = waited, "waiting for replacements");
                progress.waiting += 1;
                continue;
            }

            for mut machine in machines {
                if machine.created {
                    machine.replacing_for = None;
                    self.state.put_machine(&machine)?;
                } else {
                    self.state.delete_machine(&machine.name)?;
                }
            }
            warn!(
                %node,
                waited_secs = waited,
                "replacements not created in time, keeping node in service"
            );
            progress.abandoned.push(node);
        }
        Ok(progress)
    }

    /// Run completion passes every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            timeout_secs = self.replacement_timeout.as_secs(),
            "replacement tracker started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.complete_replacements() {
                        error!(error = %e, "replacement pass failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("replacement tracker shutting down");
    }
}

#[async_trait]
impl CommandExecutor for StoreExecutor {
    async fn execute(&self, command: &Command, reason: Reason) -> anyhow::Result<()> {
        let now = self.clock.now();

        for candidate in command.candidates() {
            match command.action() {
                Action::Replace => {
                    for (i, spec) in command.replacements().iter().enumerate() {
                        let machine = Machine {
                            name: format!("{}-{reason}-{now}-{i}", candidate.name()),
                            provisioner: spec
                                .provisioner
                                .clone()
                                .or_else(|| Some(candidate.provisioner_name().to_string())),
                            provider_id: None,
                            created: false,
                            capacity: spec.capacity,
                            created_at: now,
                            replacing_for: Some(candidate.name().to_string()),
                        };
                        self.state.put_machine(&machine)?;
                        debug!(
                            machine = %machine.name,
                            node = %candidate.name(),
                            pods = spec.pods.len(),
                            "replacement machine recorded"
                        );
                    }
                    info!(
                        node = %candidate.name(),
                        %reason,
                        replacements = command.replacements().len(),
                        "node kept until replacements are created"
                    );
                }
                Action::Delete => {
                    self.state.mark_node_terminating(candidate.name(), now)?;
                    info!(node = %candidate.name(), %reason, "node marked terminating");
                }
                Action::DoNothing => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodecycle_deprovision::{Candidate, ReplacementSpec};
    use nodecycle_state::{
        ManualClock, NodeInfo, PROVISIONER_NAME_LABEL, Provisioner, Resources,
    };
    use std::collections::HashMap;

    fn node(name: &str) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            provider_id: Some(format!("fake:///{name}")),
            labels: HashMap::from([(PROVISIONER_NAME_LABEL.to_string(), "default".to_string())]),
            annotations: HashMap::new(),
            capacity: Resources::new(4000, 8192),
            created_at: 0,
            deletion_timestamp: None,
        }
    }

    fn candidate(state: &StateStore, name: &str) -> Candidate {
        let n = node(name);
        state.put_node(&n).unwrap();
        Candidate::new(
            n,
            Some(Provisioner {
                name: "default".to_string(),
                ttl_seconds_until_expired: Some(60),
                node_capacity: None,
                labels: HashMap::new(),
            }),
        )
    }

    fn spec() -> ReplacementSpec {
        ReplacementSpec {
            provisioner: None,
            capacity: Resources::new(2000, 4096),
            pods: vec!["default/web-0".to_string()],
        }
    }

    fn executor(state: &StateStore, clock: &ManualClock) -> StoreExecutor {
        StoreExecutor::new(state.clone(), Arc::new(clock.clone()))
            .with_replacement_timeout(Duration::from_secs(300))
    }

    fn launch_all(state: &StateStore) {
        for mut m in state.list_machines().unwrap() {
            m.created = true;
            m.provider_id = Some(format!("fake:///{}", m.name));
            state.put_machine(&m).unwrap();
        }
    }

    #[tokio::test]
    async fn delete_marks_terminating_only() {
        let state = StateStore::open_in_memory().unwrap();
        let clock = ManualClock::new(777);
        let c = candidate(&state, "n-1");

        executor(&state, &clock)
            .execute(&Command::delete(c), Reason::Drift)
            .await
            .unwrap();

        let node = state.get_node("n-1").unwrap().unwrap();
        assert_eq!(node.deletion_timestamp, Some(777));
        assert!(state.list_machines().unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_keeps_node_until_replacements_exist() {
        let state = StateStore::open_in_memory().unwrap();
        let clock = ManualClock::new(777);
        let c = candidate(&state, "n-1");
        let command = Command::for_candidate(c, vec![spec(), spec()]);

        executor(&state, &clock)
            .execute(&command, Reason::Expiration)
            .await
            .unwrap();

        let mut machines = state.list_machines().unwrap();
        machines.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(machines.len(), 2);
        assert_eq!(machines[0].name, "n-1-expired-777-0");
        assert!(!machines[0].created);
        assert_eq!(machines[0].replacing_for.as_deref(), Some("n-1"));
        assert_eq!(machines[0].provisioner.as_deref(), Some("default"));
        assert_eq!(machines[0].capacity, Resources::new(2000, 4096));
        assert!(!state.get_node("n-1").unwrap().unwrap().is_terminating());
    }

    #[tokio::test]
    async fn node_handed_over_once_every_replacement_is_created() {
        let state = StateStore::open_in_memory().unwrap();
        let clock = ManualClock::new(1000);
        let exec = executor(&state, &clock);
        let command = Command::for_candidate(candidate(&state, "n-1"), vec![spec(), spec()]);
        exec.execute(&command, Reason::Drift).await.unwrap();

        // One of two launched: still waiting.
        let mut first = state.get_machine("n-1-drift-1000-0").unwrap().unwrap();
        first.created = true;
        state.put_machine(&first).unwrap();
        clock.advance(10);
        let progress = exec.complete_replacements().unwrap();
        assert_eq!(progress.waiting, 1);
        assert!(!state.get_node("n-1").unwrap().unwrap().is_terminating());

        launch_all(&state);
        clock.advance(10);
        let progress = exec.complete_replacements().unwrap();
        assert_eq!(progress.handed_over, vec!["n-1".to_string()]);
        assert_eq!(
            state.get_node("n-1").unwrap().unwrap().deletion_timestamp,
            Some(1020)
        );
        assert!(state.nodes_awaiting_replacement().unwrap().is_empty());
        assert_eq!(state.list_machines().unwrap().len(), 2);

        // Nothing left to do.
        assert_eq!(exec.complete_replacements().unwrap(), ReplacementProgress::default());
    }

    #[tokio::test]
    async fn stalled_replacements_are_abandoned() {
        let state = StateStore::open_in_memory().unwrap();
        let clock = ManualClock::new(1000);
        let exec = executor(&state, &clock);
        let command = Command::for_candidate(candidate(&state, "n-1"), vec![spec()]);
        exec.execute(&command, Reason::Expiration).await.unwrap();

        clock.advance(299);
        assert_eq!(exec.complete_replacements().unwrap().waiting, 1);

        clock.advance(1);
        let progress = exec.complete_replacements().unwrap();
        assert_eq!(progress.abandoned, vec!["n-1".to_string()]);
        assert!(state.list_machines().unwrap().is_empty());
        assert!(!state.get_node("n-1").unwrap().unwrap().is_terminating());
        assert!(state.nodes_awaiting_replacement().unwrap().is_empty());
    }

    #[tokio::test]
    async fn replaced_node_that_vanished_is_not_an_error() {
        let state = StateStore::open_in_memory().unwrap();
        let clock = ManualClock::new(1000);
        let exec = executor(&state, &clock);
        let command = Command::for_candidate(candidate(&state, "n-1"), vec![spec()]);
        exec.execute(&command, Reason::Drift).await.unwrap();

        launch_all(&state);
        state.delete_node("n-1").unwrap();
        let progress = exec.complete_replacements().unwrap();
        assert_eq!(progress.handed_over, vec!["n-1".to_string()]);
    }

    #[tokio::test]
    async fn missing_node_fails_delete() {
        let state = StateStore::open_in_memory().unwrap();
        let clock = ManualClock::new(777);
        let c = candidate(&state, "n-1");
        state.delete_node("n-1").unwrap();

        let err = executor(&state, &clock)
            .execute(&Command::delete(c), Reason::Drift)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("n-1"));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let state = StateStore::open_in_memory().unwrap();
        let exec = Arc::new(executor(&state, &ManualClock::new(0)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), exec.run(Duration::from_secs(60), cancel))
            .await
            .unwrap();
    }
}
