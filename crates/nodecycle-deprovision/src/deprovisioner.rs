//! The deprovisioner interface and the decision loop shared by every policy.

use std::fmt;

use async_trait::async_trait;
use nodecycle_metrics::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::candidate::Candidate;
use crate::command::Command;
use crate::error::{DeprovisionError, DeprovisionResult, SimulationError};
use crate::settings::Settings;
use crate::simulate::SchedulingSimulator;

/// Why a node (or machine record) was removed. Used as the metric label
/// and as the deprovisioner's display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Drift,
    Expiration,
    GarbageCollected,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Drift => "drift",
            Reason::Expiration => "expired",
            Reason::GarbageCollected => "garbage_collected",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node removal policy.
#[async_trait]
pub trait Deprovisioner: Send + Sync {
    /// Whether `candidate` is eligible under this policy. Pure: no I/O,
    /// no side effects.
    fn should_deprovision(&self, settings: &Settings, candidate: &Candidate) -> bool;

    /// Pick at most one of `candidates` (already accepted by
    /// [`should_deprovision`](Self::should_deprovision)) and decide how to
    /// remove it.
    async fn compute_command(
        &self,
        cancel: &CancellationToken,
        candidates: Vec<Candidate>,
    ) -> DeprovisionResult<Command>;

    fn reason(&self) -> Reason;
}

/// Walk `candidates` in order and build a command for the first one the
/// simulator can answer for.
///
/// Candidates that started deleting are skipped. Any other simulation error
/// aborts the walk. Unschedulable pods do not block removal; they are
/// reported and the command still goes out. Cancellation is checked around
/// every simulation and never produces a partial command.
pub(crate) async fn first_feasible(
    reason: Reason,
    simulator: &dyn SchedulingSimulator,
    metrics: &Metrics,
    cancel: &CancellationToken,
    candidates: Vec<Candidate>,
) -> DeprovisionResult<Command> {
    for candidate in candidates {
        if cancel.is_cancelled() {
            return Err(DeprovisionError::Cancelled);
        }
        let simulated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeprovisionError::Cancelled),
            result = simulator.simulate(&candidate) => result,
        };
        let result = match simulated {
            Ok(result) => result,
            Err(SimulationError::CandidateDeleting(node)) => {
                debug!(%node, deprovisioner = %reason, "candidate started deleting, trying next");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if !result.all_pods_scheduled {
            warn!(
                node = %candidate.name(),
                deprovisioner = %reason,
                "continuing to deprovision node after scheduling simulation failed to schedule all pods"
            );
            metrics.unschedulable_proceeding(reason.as_str());
        }
        return Ok(Command::for_candidate(candidate, result.replacements));
    }
    Ok(Command::do_nothing())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::simulate::{ReplacementSpec, SimulationResult};
    use nodecycle_state::Resources;

    /// Scripted outcome for one candidate.
    #[derive(Clone)]
    pub enum Outcome {
        Deleting,
        Fail,
        Fits { replacements: usize, all_pods: bool },
        /// Never returns; only cancellation ends the call.
        Hang,
    }

    /// Simulator that answers from a script and records what it was asked.
    #[derive(Default)]
    pub struct ScriptedSimulator {
        script: HashMap<String, Outcome>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedSimulator {
        pub fn new(script: &[(&str, Outcome)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(n, o)| (n.to_string(), o.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchedulingSimulator for ScriptedSimulator {
        async fn simulate(
            &self,
            candidate: &Candidate,
        ) -> Result<SimulationResult, SimulationError> {
            self.calls.lock().unwrap().push(candidate.name().to_string());
            let outcome = self
                .script
                .get(candidate.name())
                .cloned()
                .unwrap_or(Outcome::Fits { replacements: 0, all_pods: true });
            match outcome {
                Outcome::Deleting => Err(SimulationError::CandidateDeleting(
                    candidate.name().to_string(),
                )),
                Outcome::Fail => Err(SimulationError::Failed("boom".to_string())),
                Outcome::Fits { replacements, all_pods } => Ok(SimulationResult {
                    replacements: (0..replacements)
                        .map(|i| ReplacementSpec {
                            provisioner: Some("default".to_string()),
                            capacity: Resources::new(1000, 1024),
                            pods: vec![format!("default/pod-{i}")],
                        })
                        .collect(),
                    all_pods_scheduled: all_pods,
                }),
                Outcome::Hang => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::candidate::test_support::candidate;
    use crate::command::Action;
    use nodecycle_metrics::UNSCHEDULABLE_PROCEEDING;

    fn abc() -> Vec<Candidate> {
        vec![
            candidate("a", 0, None),
            candidate("b", 0, None),
            candidate("c", 0, None),
        ]
    }

    #[tokio::test]
    async fn first_feasible_wins_and_stops() {
        let sim = ScriptedSimulator::new(&[
            ("a", Outcome::Deleting),
            ("b", Outcome::Fits { replacements: 1, all_pods: true }),
        ]);
        let cmd = first_feasible(
            Reason::Drift,
            &sim,
            &Metrics::new(),
            &CancellationToken::new(),
            abc(),
        )
        .await
        .unwrap();

        assert_eq!(cmd.action(), Action::Replace);
        assert_eq!(cmd.candidates().len(), 1);
        assert_eq!(cmd.candidates()[0].name(), "b");
        assert_eq!(cmd.replacements().len(), 1);
        assert_eq!(sim.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn all_deleting_is_do_nothing() {
        let sim = ScriptedSimulator::new(&[
            ("a", Outcome::Deleting),
            ("b", Outcome::Deleting),
            ("c", Outcome::Deleting),
        ]);
        let cmd = first_feasible(
            Reason::Expiration,
            &sim,
            &Metrics::new(),
            &CancellationToken::new(),
            abc(),
        )
        .await
        .unwrap();
        assert!(cmd.is_do_nothing());
        assert_eq!(sim.calls().len(), 3);
    }

    #[tokio::test]
    async fn empty_list_is_do_nothing() {
        let sim = ScriptedSimulator::default();
        let cmd = first_feasible(
            Reason::Drift,
            &sim,
            &Metrics::new(),
            &CancellationToken::new(),
            Vec::new(),
        )
        .await
        .unwrap();
        assert!(cmd.is_do_nothing());
    }

    #[tokio::test]
    async fn hard_error_aborts() {
        let sim = ScriptedSimulator::new(&[("a", Outcome::Fail)]);
        let err = first_feasible(
            Reason::Drift,
            &sim,
            &Metrics::new(),
            &CancellationToken::new(),
            abc(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DeprovisionError::Simulation(SimulationError::Failed(_))
        ));
        assert_eq!(sim.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn unschedulable_still_proceeds() {
        let sim = ScriptedSimulator::new(&[("a", Outcome::Fits { replacements: 0, all_pods: false })]);
        let metrics = Metrics::new();
        let cmd = first_feasible(
            Reason::Drift,
            &sim,
            &metrics,
            &CancellationToken::new(),
            abc(),
        )
        .await
        .unwrap();
        assert_eq!(cmd.action(), Action::Delete);
        assert_eq!(cmd.candidates()[0].name(), "a");
        assert_eq!(
            metrics.get(UNSCHEDULABLE_PROCEEDING, &[("deprovisioner", "drift")]),
            1
        );
    }

    #[tokio::test]
    async fn cancellation_mid_simulation_is_an_error() {
        let sim = ScriptedSimulator::new(&[("a", Outcome::Hang)]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = first_feasible(Reason::Drift, &sim, &Metrics::new(), &cancel, abc())
            .await
            .unwrap_err();
        assert!(matches!(err, DeprovisionError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_simulates_nothing() {
        let sim = ScriptedSimulator::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = first_feasible(Reason::Drift, &sim, &Metrics::new(), &cancel, abc())
            .await
            .unwrap_err();
        assert!(matches!(err, DeprovisionError::Cancelled));
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn reason_labels() {
        assert_eq!(Reason::Drift.to_string(), "drift");
        assert_eq!(Reason::Expiration.to_string(), "expired");
        assert_eq!(Reason::GarbageCollected.to_string(), "garbage_collected");
    }
}
