//! Co-occurrence graph types.

use serde::{Deserialize, Serialize};

use super::entity::EntityId;

/// One node per live entity with a non-zero mention count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: EntityId,
    /// Denormalized canonical display name.
    pub name: String,
    /// Weighted degree: sum of incident edge weights.
    pub score: u64,
    /// Number of distinct neighbours.
    pub degree: u64,
}

/// Undirected edge stored once per unordered pair with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub a: EntityId,
    pub b: EntityId,
    /// Number of distinct co-occurrence records.
    pub weight: u64,
}

impl GraphEdge {
    /// The endpoint opposite `id`, if `id` is one of this edge's endpoints.
    #[must_use]
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Weighted undirected co-occurrence graph. Nodes are sorted by id, edges by
/// `(a, b)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    #[must_use]
    pub fn node(&self, id: EntityId) -> Option<&GraphNode> {
        self.nodes
            .binary_search_by(|n| n.id.cmp(&id))
            .ok()
            .map(|idx| &self.nodes[idx])
    }

    /// Weight of the edge between `x` and `y` in either order; 0 when absent.
    #[must_use]
    pub fn weight(&self, x: EntityId, y: EntityId) -> u64 {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        self.edges
            .binary_search_by(|e| (e.a, e.b).cmp(&(a, b)))
            .map_or(0, |idx| self.edges[idx].weight)
    }

    /// Neighbours of `id` with edge weights, unordered.
    pub fn neighbors(&self, id: EntityId) -> impl Iterator<Item = (EntityId, u64)> + '_ {
        self.edges
            .iter()
            .filter_map(move |e| e.other(id).map(|n| (n, e.weight)))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
