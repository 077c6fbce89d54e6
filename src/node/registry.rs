use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{DistrunError, Result};
use crate::node::state::{Node, NodeSnapshot};

/// Receives validated nodes from a loader.
pub trait NodeSink {
    /// Take ownership of `node`. Fails when its name is already registered.
    fn add_node(&mut self, node: Node) -> Result<()>;
}

/// Every node known to this process, keyed by name.
///
/// Populated once during startup through [`NodeSink`], then shared as
/// `Arc<NodeRegistry>` for concurrent lookups. Nodes themselves are behind `Arc` so
/// dispatches can outlive the caller that started them.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Arc<Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.get(name).cloned()
    }

    /// Look up a node or fail with [`DistrunError::NodeNotFound`].
    pub fn require(&self, name: &str) -> Result<Arc<Node>> {
        self.get(name)
            .ok_or_else(|| DistrunError::NodeNotFound(name.to_string()))
    }

    /// All nodes sorted by name.
    pub fn all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.values().cloned().collect()
    }

    /// Nodes carrying every role in `roles`.
    pub fn nodes_with_roles(&self, roles: &[String]) -> Vec<Arc<Node>> {
        self.nodes
            .values()
            .filter(|n| n.has_roles(roles))
            .cloned()
            .collect()
    }

    pub async fn snapshots(&self) -> Vec<NodeSnapshot> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.values() {
            out.push(node.snapshot().await);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NodeSink for NodeRegistry {
    fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(node.name()) {
            return Err(DistrunError::Duplicate(node.name().to_string()));
        }
        tracing::info!(node = %node.name(), connection = %node.connection().kind(), "Node registered");
        self.nodes.insert(node.name().to_string(), Arc::new(node));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Connection;
    use crate::transport::TransportFactory;

    fn node(name: &str, roles: &[&str]) -> Node {
        let connection = Connection::local();
        let transport = TransportFactory::default().bind(&connection);
        Node::new(
            name,
            roles.iter().map(|r| r.to_string()).collect(),
            connection,
            transport,
        )
        .unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.add_node(node("web1", &["web"])).unwrap();
        registry.add_node(node("db1", &["db"])).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("web1").unwrap().name(), "web1");
        assert!(registry.get("web2").is_none());
        assert!(matches!(
            registry.require("web2"),
            Err(DistrunError::NodeNotFound(name)) if name == "web2"
        ));

        let names: Vec<String> = registry
            .all_nodes()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["db1", "web1"]);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = NodeRegistry::new();
        registry.add_node(node("web1", &["web"])).unwrap();
        let err = registry.add_node(node("web1", &["cron"])).unwrap_err();
        assert!(matches!(err, DistrunError::Duplicate(name) if name == "web1"));
        assert_eq!(registry.get("web1").unwrap().roles(), ["web".to_string()]);
    }

    #[test]
    fn test_filter_by_roles() {
        let mut registry = NodeRegistry::new();
        registry.add_node(node("web1", &["web", "cron"])).unwrap();
        registry.add_node(node("web2", &["web"])).unwrap();

        let cron = registry.nodes_with_roles(&["cron".to_string()]);
        assert_eq!(cron.len(), 1);
        assert_eq!(cron[0].name(), "web1");
        assert_eq!(registry.nodes_with_roles(&[]).len(), 2);
    }
}
