//! nodecycle-metrics: observability for the node lifecycle controller.
//!
//! Counts the decisions the controllers make (terminations by reason and
//! provisioner, candidates filtered out, unschedulable simulations that
//! still proceed) and renders them in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! Metrics (Clone, shared)
//!   ├── node_terminated() / machine_terminated() ← controllers
//!   ├── candidate_filtered() / unschedulable_proceeding()
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{
    CANDIDATES_FILTERED, MACHINES_TERMINATED, Metrics, NODES_TERMINATED,
    UNSCHEDULABLE_PROCEEDING,
};
pub use prometheus::render_prometheus;
