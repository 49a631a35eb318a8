//! nodecycled: wiring for the node lifecycle daemon.
//!
//! The binary in `main.rs` assembles these pieces; they live in a library
//! so integration tests can drive the same wiring without a process.

pub mod config;
pub mod executor;
pub mod http;

pub use config::Config;
pub use executor::{ReplacementProgress, StoreExecutor};
pub use http::build_router;
