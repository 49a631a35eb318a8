//! Candidate: a point-in-time snapshot of a node that may be removed.

use std::collections::HashMap;
use std::sync::Arc;

use nodecycle_state::{NodeInfo, Provisioner, Resources};

/// A node considered for removal, together with the provisioner that
/// launched it.
///
/// Candidates are immutable: re-evaluating a node means building a new
/// candidate from fresh state. Clones share the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    node: Arc<NodeInfo>,
    provisioner: Option<Arc<Provisioner>>,
}

impl Candidate {
    pub fn new(node: NodeInfo, provisioner: Option<Provisioner>) -> Self {
        Self {
            node: Arc::new(node),
            provisioner: provisioner.map(Arc::new),
        }
    }

    /// Node name; the candidate's identity.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.node.annotations
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.node.labels
    }

    /// Unix seconds at which the node was created.
    pub fn created_at(&self) -> u64 {
        self.node.created_at
    }

    pub fn capacity(&self) -> Resources {
        self.node.capacity
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    /// The originating provisioner, if it still exists.
    pub fn provisioner(&self) -> Option<&Provisioner> {
        self.provisioner.as_deref()
    }

    /// Provisioner name for labelling, taken from the node when the
    /// provisioner object is gone.
    pub fn provisioner_name(&self) -> &str {
        self.provisioner
            .as_deref()
            .map(|p| p.name.as_str())
            .or_else(|| self.node.provisioner_name())
            .unwrap_or("")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use nodecycle_state::PROVISIONER_NAME_LABEL;

    pub fn node(name: &str, created_at: u64) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            provider_id: Some(format!("fake:///{name}")),
            labels: HashMap::from([(PROVISIONER_NAME_LABEL.to_string(), "default".to_string())]),
            annotations: HashMap::new(),
            capacity: Resources::new(4000, 8192),
            created_at,
            deletion_timestamp: None,
        }
    }

    pub fn provisioner(ttl: Option<u64>) -> Provisioner {
        Provisioner {
            name: "default".to_string(),
            ttl_seconds_until_expired: ttl,
            node_capacity: Some(Resources::new(4000, 8192)),
            labels: HashMap::new(),
        }
    }

    pub fn candidate(name: &str, created_at: u64, ttl: Option<u64>) -> Candidate {
        Candidate::new(node(name, created_at), Some(provisioner(ttl)))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn accessors_read_snapshot() {
        let c = candidate("node-a", 1000, Some(60));
        assert_eq!(c.name(), "node-a");
        assert_eq!(c.created_at(), 1000);
        assert_eq!(c.provisioner_name(), "default");
        assert_eq!(c.provisioner().and_then(|p| p.ttl_seconds_until_expired), Some(60));
    }

    #[test]
    fn provisioner_name_falls_back_to_node_label() {
        let c = Candidate::new(node("node-a", 0), None);
        assert!(c.provisioner().is_none());
        assert_eq!(c.provisioner_name(), "default");
    }

    #[test]
    fn clones_share_the_snapshot() {
        let c = candidate("node-a", 1000, None);
        let d = c.clone();
        assert!(std::ptr::eq(c.node(), d.node()));
    }
}
