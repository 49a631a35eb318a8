//! nodecycle-state: cluster state store for the node lifecycle controller.
//!
//! Backed by [redb](https://docs.rs/redb), holds the latest observed view of
//! nodes, provisioners (the policy objects that produce nodes), machines (the
//! lifecycle records tracking a node's backing resource) and pods.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Pods are keyed by `{namespace}/{name}`; everything else by name.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Reads reflect the latest committed
//! write, not a globally consistent snapshot across tables.

pub mod clock;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
