//! Weighted-degree centrality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, Graph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScore {
    /// Sum of incident edge weights.
    pub score: u64,
    /// Distinct neighbours.
    pub degree: u64,
}

/// Per-node centrality, keyed by entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Centrality {
    scores: BTreeMap<EntityId, NodeScore>,
}

impl Centrality {
    #[must_use]
    pub fn get(&self, id: EntityId) -> NodeScore {
        self.scores.get(&id).copied().unwrap_or_default()
    }

    /// Nodes ordered by score descending, then id ascending.
    #[must_use]
    pub fn ranked(&self) -> Vec<(EntityId, NodeScore)> {
        let mut out: Vec<(EntityId, NodeScore)> =
            self.scores.iter().map(|(id, s)| (*id, *s)).collect();
        out.sort_by(|a, b| b.1.score.cmp(&a.1.score).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Write scores into the graph's nodes.
    pub fn annotate(&self, graph: &mut Graph) {
        for node in &mut graph.nodes {
            let s = self.get(node.id);
            node.score = s.score;
            node.degree = s.degree;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Weighted degree of every node. Isolated nodes score zero.
#[must_use]
pub fn compute_centrality(graph: &Graph) -> Centrality {
    let mut scores: BTreeMap<EntityId, NodeScore> = graph
        .nodes
        .iter()
        .map(|n| (n.id, NodeScore::default()))
        .collect();
    for edge in &graph.edges {
        for id in [edge.a, edge.b] {
            let entry = scores.entry(id).or_default();
            entry.score += edge.weight;
            entry.degree += 1;
        }
    }
    Centrality { scores }
}
