//! Co-occurrence graph builder.
//!
//! The graph is a pure function of the committed store and the stored
//! co-occurrence groups and is rebuilt in full at every commit. Pairwise
//! expansion is O(n²) per group; groups are passenger lists and short
//! documents, so this stays small.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CanonError, Result};
use crate::resolve::Disambiguator;
use crate::store::EntityStore;
use crate::text::normalize;
use crate::types::{CoOccurrenceGroup, EntityId, Graph, GraphEdge, GraphNode};

/// Canonical member sets for stored groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGroups {
    /// One member set per record id.
    pub groups: Vec<(String, BTreeSet<EntityId>)>,
    /// Members that matched no alias.
    pub unresolved: u64,
    /// Members skipped as placeholders.
    pub placeholders: u64,
}

/// Map each group's raw member names to canonical ids through exact alias
/// lookup. Members never ingested as mentions stay unresolved and are left
/// out of the graph.
#[must_use]
pub fn resolve_groups<'a, I>(groups: I, store: &EntityStore, resolver: &Disambiguator) -> ResolvedGroups
where
    I: IntoIterator<Item = &'a CoOccurrenceGroup>,
{
    let mut out = ResolvedGroups::default();
    for group in groups {
        let mut members = BTreeSet::new();
        for raw in &group.member_raw_names {
            let Ok(name) = normalize(raw) else {
                out.unresolved += 1;
                continue;
            };
            if resolver.is_placeholder(&name) {
                out.placeholders += 1;
                continue;
            }
            match store.lookup(name.key()) {
                Some(id) => {
                    members.insert(id);
                }
                None => {
                    tracing::debug!(
                        target: "canon::graph",
                        record = %group.record_id,
                        member = %raw,
                        "group member has no alias"
                    );
                    out.unresolved += 1;
                }
            }
        }
        out.groups.push((group.record_id.clone(), members));
    }
    out
}

/// Build the weighted co-occurrence graph.
///
/// Member ids may be stale; they are canonicalized through tombstones, so
/// two members merged into one entity collapse and never form a self loop.
/// An id that resolves to nothing raises [`CanonError::GraphConsistency`].
/// Node scores are left at zero for [`crate::rank`] to fill in.
pub fn build_graph<'a, I>(groups: I, store: &EntityStore) -> Result<Graph>
where
    I: IntoIterator<Item = &'a BTreeSet<EntityId>>,
{
    let mut weights: BTreeMap<(EntityId, EntityId), u64> = BTreeMap::new();
    let mut group_count = 0usize;
    for group in groups {
        group_count += 1;
        let mut canonical = BTreeSet::new();
        for id in group {
            let live = store.resolve_id(*id).map_err(|err| CanonError::GraphConsistency {
                entity: *id,
                context: err.to_string(),
            })?;
            canonical.insert(live);
        }
        let members: Vec<EntityId> = canonical.into_iter().collect();
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                *weights.entry((*a, *b)).or_insert(0) += 1;
            }
        }
    }

    let endpoints: BTreeSet<EntityId> = weights.keys().flat_map(|(a, b)| [*a, *b]).collect();
    let mut nodes = Vec::new();
    for entity in store.entities() {
        if entity.mention_count > 0 || endpoints.contains(&entity.id) {
            nodes.push(GraphNode {
                id: entity.id,
                name: entity.canonical_name.clone(),
                score: 0,
                degree: 0,
            });
        }
    }
    for id in &endpoints {
        if store.live(*id).is_none() {
            return Err(CanonError::GraphConsistency {
                entity: *id,
                context: "edge endpoint is not a live entity".into(),
            });
        }
    }

    let edges: Vec<GraphEdge> = weights
        .into_iter()
        .map(|((a, b), weight)| GraphEdge { a, b, weight })
        .collect();
    tracing::info!(
        target: "canon::graph",
        groups = group_count,
        nodes = nodes.len(),
        edges = edges.len(),
        "graph rebuilt"
    );
    Ok(Graph { nodes, edges })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(store: &mut EntityStore, raw: &str, record: &str) -> EntityId {
        store
            .create_entity(&normalize(raw).expect("normalize"), "manifest", record, None)
            .expect("create")
    }

    #[test]
    fn weights_count_distinct_groups() {
        let mut store = EntityStore::new();
        let a = create(&mut store, "Alpha One", "f1");
        let b = create(&mut store, "Bravo Two", "f1");
        let c = create(&mut store, "Charlie Three", "f1");

        let groups = vec![BTreeSet::from([a, b, c]), BTreeSet::from([a, b])];
        let graph = build_graph(&groups, &store).expect("graph");
        assert_eq!(graph.weight(a, b), 2);
        assert_eq!(graph.weight(a, c), 1);
        assert_eq!(graph.weight(c, b), 1);
        assert_eq!(graph.node_count(), 3);
        for edge in &graph.edges {
            assert!(edge.a < edge.b);
            assert_eq!(graph.weight(edge.a, edge.b), graph.weight(edge.b, edge.a));
        }
    }

    #[test]
    fn merged_members_collapse_without_self_loops() {
        let mut store = EntityStore::new();
        let a = create(&mut store, "Alpha One", "f1");
        let b = create(&mut store, "Bravo Two", "f1");
        let c = create(&mut store, "Charlie Three", "f1");
        store.merge_entities(a, b, None).expect("merge");

        let groups = vec![BTreeSet::from([a, b, c])];
        let graph = build_graph(&groups, &store).expect("graph");
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.weight(a, c), 1);
        assert!(graph.edges.iter().all(|e| e.a != e.b));
        assert!(graph.node(b).is_none());
    }

    #[test]
    fn unknown_member_aborts_the_rebuild() {
        let mut store = EntityStore::new();
        let a = create(&mut store, "Alpha One", "f1");
        let ghost = EntityId::from_raw(42);
        let groups = vec![BTreeSet::from([a, ghost])];
        let err = build_graph(&groups, &store).expect_err("stale id");
        assert!(matches!(err, CanonError::GraphConsistency { entity, .. } if entity == ghost));
    }
}
