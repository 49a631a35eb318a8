//! Domain types for the nodecycle state store.
//!
//! These types represent the observed state of nodes, the provisioners that
//! launched them, the machine records that track each node's backing
//! resource, and the pods bound to nodes. All types are serializable
//! to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique name of a node in the cluster.
pub type NodeName = String;

/// Identifier of a resource at the infrastructure provider.
pub type ProviderId = String;

/// Label carrying the name of the provisioner that launched a node.
pub const PROVISIONER_NAME_LABEL: &str = "nodecycle.io/provisioner-name";

/// Annotation set by the drift detector when a node may be voluntarily disrupted.
pub const VOLUNTARY_DISRUPTION_ANNOTATION: &str = "nodecycle.io/voluntary-disruption";

/// Value of [`VOLUNTARY_DISRUPTION_ANNOTATION`] marking a drifted node.
pub const VOLUNTARY_DISRUPTION_DRIFTED: &str = "drifted";

// ── Resources ─────────────────────────────────────────────────────

/// Schedulable resources: node capacity or pod requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    pub cpu_millis: u64,
    pub memory_bytes: u64,
}

impl Resources {
    pub fn new(cpu_millis: u64, memory_bytes: u64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
        }
    }

    /// Whether `request` fits inside `self`.
    pub fn fits(&self, request: &Resources) -> bool {
        request.cpu_millis <= self.cpu_millis && request.memory_bytes <= self.memory_bytes
    }

    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
        }
    }

    pub fn saturating_add(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// Observed state of a node in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub name: NodeName,
    /// Backing resource at the provider, once known.
    pub provider_id: Option<ProviderId>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Allocatable capacity.
    pub capacity: Resources,
    /// Unix timestamp (seconds) when the node object was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when deletion began; `None` while live.
    pub deletion_timestamp: Option<u64>,
}

impl NodeInfo {
    /// Name of the provisioner that launched this node, if any.
    pub fn provisioner_name(&self) -> Option<&str> {
        self.labels.get(PROVISIONER_NAME_LABEL).map(String::as_str)
    }

    pub fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

// ── Provisioner ───────────────────────────────────────────────────

/// A provisioning policy: the template nodes are launched from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provisioner {
    pub name: String,
    /// Seconds after creation at which nodes from this provisioner expire.
    pub ttl_seconds_until_expired: Option<u64>,
    /// Capacity of a node launched from this template.
    pub node_capacity: Option<Resources>,
    /// Labels applied to every launched node.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

// ── Machine ───────────────────────────────────────────────────────

/// Lifecycle record for one node's backing resource at the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub name: String,
    /// Provisioner that requested this machine.
    pub provisioner: Option<String>,
    /// Backing resource at the provider, set once launched.
    pub provider_id: Option<ProviderId>,
    /// Whether the provider acknowledged creation of the backing resource.
    pub created: bool,
    /// Requested capacity.
    pub capacity: Resources,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: u64,
    /// Node this machine was requested to replace. Cleared once that node
    /// has been handed over for termination.
    #[serde(default)]
    pub replacing_for: Option<NodeName>,
}

// ── Pod ───────────────────────────────────────────────────────────

/// A workload bound (or waiting to be bound) to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<NodeName>,
    pub requests: Resources,
}

impl PodInfo {
    /// Build the composite key for the pods table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
