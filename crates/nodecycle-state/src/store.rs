//! StateStore: redb-backed cluster state for the node lifecycle controller.
//!
//! Provides typed CRUD operations over nodes, provisioners, machines and
//! pods. All values are JSON-serialized into redb's `&[u8]` value columns.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [NODES, PROVISIONERS, MACHINES, PODS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON access ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    fn remove(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn put_node(&self, node: &NodeInfo) -> StateResult<()> {
        self.put_json(NODES, &node.name, node)?;
        debug!(node = %node.name, "node stored");
        Ok(())
    }

    /// Get a node by name.
    pub fn get_node(&self, name: &str) -> StateResult<Option<NodeInfo>> {
        self.get_json(NODES, name)
    }

    /// List all nodes.
    pub fn list_nodes(&self) -> StateResult<Vec<NodeInfo>> {
        self.list_json(NODES)
    }

    /// Delete a node by name. Returns true if it existed.
    pub fn delete_node(&self, name: &str) -> StateResult<bool> {
        self.remove(NODES, name)
    }

    /// Names of nodes whose deletion has begun.
    pub fn list_terminating_nodes(&self) -> StateResult<Vec<NodeName>> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .filter(NodeInfo::is_terminating)
            .map(|n| n.name)
            .collect())
    }

    /// Nodes whose provider id matches. More than one means a duplicate
    /// registration, which callers decide how to treat.
    pub fn nodes_for_provider_id(&self, provider_id: &str) -> StateResult<Vec<NodeInfo>> {
        Ok(self
            .list_nodes()?
            .into_iter()
            .filter(|n| n.provider_id.as_deref() == Some(provider_id))
            .collect())
    }

    /// Stamp a node's deletion timestamp. A node already terminating keeps
    /// its original timestamp.
    pub fn mark_node_terminating(&self, name: &str, at: u64) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let existing = table
                .get(name)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());
            let Some(bytes) = existing else {
                return Err(StateError::NotFound(format!("node {name}")));
            };
            let mut node: NodeInfo =
                serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
            if node.deletion_timestamp.is_none() {
                node.deletion_timestamp = Some(at);
                let value = serde_json::to_vec(&node).map_err(map_err!(Serialize))?;
                table
                    .insert(name, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %name, "node marked terminating");
        Ok(())
    }

    // ── Provisioners ───────────────────────────────────────────────

    /// Insert or update a provisioner.
    pub fn put_provisioner(&self, provisioner: &Provisioner) -> StateResult<()> {
        self.put_json(PROVISIONERS, &provisioner.name, provisioner)
    }

    /// Get a provisioner by name.
    pub fn get_provisioner(&self, name: &str) -> StateResult<Option<Provisioner>> {
        self.get_json(PROVISIONERS, name)
    }

    /// List all provisioners.
    pub fn list_provisioners(&self) -> StateResult<Vec<Provisioner>> {
        self.list_json(PROVISIONERS)
    }

    /// Delete a provisioner by name. Returns true if it existed.
    pub fn delete_provisioner(&self, name: &str) -> StateResult<bool> {
        self.remove(PROVISIONERS, name)
    }

    // ── Machines ───────────────────────────────────────────────────

    /// Insert or update a machine record.
    pub fn put_machine(&self, machine: &Machine) -> StateResult<()> {
        self.put_json(MACHINES, &machine.name, machine)?;
        debug!(machine = %machine.name, "machine stored");
        Ok(())
    }

    /// Get a machine by name.
    pub fn get_machine(&self, name: &str) -> StateResult<Option<Machine>> {
        self.get_json(MACHINES, name)
    }

    /// List all machines.
    pub fn list_machines(&self) -> StateResult<Vec<Machine>> {
        self.list_json(MACHINES)
    }

    /// Names of nodes with at least one replacement machine recorded
    /// against them.
    pub fn nodes_awaiting_replacement(&self) -> StateResult<HashSet<NodeName>> {
        Ok(self
            .list_machines()?
            .into_iter()
            .filter_map(|m| m.replacing_for)
            .collect())
    }

    /// Delete a machine by name. Returns true if it existed.
    pub fn delete_machine(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove(MACHINES, name)?;
        debug!(machine = %name, existed, "machine deleted");
        Ok(existed)
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Insert or update a pod.
    pub fn put_pod(&self, pod: &PodInfo) -> StateResult<()> {
        self.put_json(PODS, &pod.table_key(), pod)
    }

    /// List all pods.
    pub fn list_pods(&self) -> StateResult<Vec<PodInfo>> {
        self.list_json(PODS)
    }

    /// List pods bound to the given node.
    pub fn list_pods_on_node(&self, node: &str) -> StateResult<Vec<PodInfo>> {
        Ok(self
            .list_pods()?
            .into_iter()
            .filter(|p| p.node_name.as_deref() == Some(node))
            .collect())
    }

    /// Delete a pod by `{namespace}/{name}` key. Returns true if it existed.
    pub fn delete_pod(&self, key: &str) -> StateResult<bool> {
        self.remove(PODS, key)
    }
}
