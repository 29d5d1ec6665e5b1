//! Node registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::node::{Node, NodeId};

/// Maps node identifiers to their implementations.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register a node under its `id()`, replacing any previous one.
    pub fn register(&mut self, node: Arc<dyn Node>) {
        let id = node.id();
        debug!("Registering node: {}", id);
        self.nodes.insert(id, node);
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<dyn Node>> {
        self.nodes.get(&id).cloned()
    }

    /// Get a node, returning an error if it is not registered.
    pub fn get_required(&self, id: NodeId) -> CoreResult<Arc<dyn Node>> {
        self.get(id)
            .ok_or_else(|| CoreError::NodeNotFound(id.display_name().to_string()))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Registered identifiers in pipeline order.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.ids())
            .finish()
    }
}
