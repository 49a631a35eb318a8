//! nodecycle-gc: garbage collection of orphaned machine records.
//!
//! A machine record whose provider resource is gone, and which no node
//! refers to, is deleted. Provider lookups are throttled by a short-lived
//! presence cache so the provider sees at most one query per record per
//! cache window, however often reconciliation runs.
//!
//! # Per-record state machine
//!
//! ```text
//! not created ──────────────────────────────► no-op
//! node present ─────────────────────────────► no-op
//! cache hit (until T) ──────────────────────► no-op, requeue at T
//! cache miss ─► provider.get()
//!                 ├── not found ─► delete record, count garbage_collected
//!                 ├── found ─────► cache until now + ttl
//!                 └── error ─────► surface, caller retries
//! ```

pub mod cache;
pub mod collector;
pub mod error;
pub mod provider;

pub use cache::PresenceCache;
pub use collector::{GarbageCollector, GcOutcome};
pub use error::{GcError, GcResult, ProviderError};
pub use provider::{CloudProvider, HttpProvider, ProviderInstance};
