//! redb table definitions for the nodecycle state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Every table shares the same key/value layout.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Nodes keyed by node name.
pub const NODES: JsonTable = TableDefinition::new("nodes");

/// Provisioners keyed by name.
pub const PROVISIONERS: JsonTable = TableDefinition::new("provisioners");

/// Machines (lifecycle records) keyed by name.
pub const MACHINES: JsonTable = TableDefinition::new("machines");

/// Pods keyed by `{namespace}/{name}`.
pub const PODS: JsonTable = TableDefinition::new("pods");
