//! nodecycle-deprovision: decides which node to remove next, and how.
//!
//! Each cycle the controller snapshots candidate nodes from the state store
//! and hands them to the registered deprovisioners in order. A deprovisioner
//! keeps the candidates its predicate accepts, drops the ones that are
//! already going away, and walks the rest in a fixed order asking the
//! scheduling simulator whether the node's pods can land elsewhere. The
//! first candidate the simulator can answer for wins.
//!
//! # Decision loop
//!
//! ```text
//! for candidate in filter(candidates) (sorted for expiration):
//!     match simulate(candidate):
//!         CandidateDeleting   => continue        // raced with a deletion
//!         Err(e)              => return Err(e)   // next cycle retries
//!         Ok(r) if r.replacements.is_empty()
//!                             => return Delete(candidate)
//!         Ok(r)               => return Replace(candidate, r.replacements)
//! return DoNothing
//! ```
//!
//! At most one command is executed per cycle so that the cluster settles
//! before the next removal is considered.

pub mod candidate;
pub mod command;
pub mod controller;
pub mod deprovisioner;
pub mod drift;
pub mod error;
pub mod expiration;
pub mod filter;
pub mod settings;
pub mod simulate;

pub use candidate::Candidate;
pub use command::{Action, Command};
pub use controller::{CommandExecutor, DeprovisioningController};
pub use deprovisioner::{Deprovisioner, Reason};
pub use drift::Drift;
pub use error::{DeprovisionError, DeprovisionResult, SimulationError};
pub use expiration::{Expiration, NEVER_EXPIRES};
pub use filter::filter_candidates;
pub use settings::Settings;
pub use simulate::{BinPackSimulator, ReplacementSpec, SchedulingSimulator, SimulationResult};
