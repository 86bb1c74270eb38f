//! Read-only query facade over one committed snapshot.
//!
//! Every lookup accepts either a raw alias string or a (possibly stale)
//! entity id and follows tombstones, so ids kept in old external references
//! keep resolving after merges.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CanonError, Result};
use crate::io::snapshot::Snapshot;
use crate::text::normalize;
use crate::types::{Entity, EntityId};

/// An entity plus its graph standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: Entity,
    pub score: u64,
    pub degree: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: EntityId,
    pub name: String,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: EntityRecord,
    /// 1.0 for a whole-key prefix, 0.9 for a token prefix, otherwise the
    /// Jaro-Winkler similarity.
    pub similarity: f64,
    /// Alias key that produced the hit.
    pub matched: String,
}

const KEY_PREFIX_SIMILARITY: f64 = 1.0;
const TOKEN_PREFIX_SIMILARITY: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct QueryService {
    snapshot: Arc<Snapshot>,
}

impl QueryService {
    #[must_use]
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Resolve a raw alias or an entity id to its canonical entity.
    ///
    /// Tries, in order: entity id (following tombstones), exact alias key,
    /// and an order-insensitive token match.
    pub fn canonicalize(&self, raw_or_id: &str) -> Result<EntityRecord> {
        let id = self.resolve(raw_or_id)?;
        self.entity(id)
    }

    pub fn entity(&self, id: EntityId) -> Result<EntityRecord> {
        let entity = self.snapshot.store.get_entity(id)?;
        let score = self.snapshot.centrality.get(entity.id);
        Ok(EntityRecord {
            entity: entity.clone(),
            score: score.score,
            degree: score.degree,
        })
    }

    /// Co-occurring entities ordered by edge weight descending, then id.
    pub fn neighbors(&self, raw_or_id: &str, limit: usize) -> Result<Vec<Neighbor>> {
        let id = self.resolve(raw_or_id)?;
        let graph = &self.snapshot.graph;
        let mut out: Vec<Neighbor> = graph
            .neighbors(id)
            .map(|(other, weight)| Neighbor {
                id: other,
                name: graph
                    .node(other)
                    .map(|n| n.name.clone())
                    .unwrap_or_default(),
                weight,
            })
            .collect();
        out.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.id.cmp(&b.id)));
        out.truncate(limit);
        Ok(out)
    }

    /// Prefix and fuzzy search over alias keys.
    ///
    /// Prefix hits rank first; fuzzy hits need a Jaro-Winkler similarity of
    /// at least `fuzzy_search_threshold`. Ties go to the entity with more
    /// mentions, then the lower id.
    #[must_use]
    pub fn search(&self, term: &str, limit: usize) -> Vec<SearchHit> {
        let Ok(name) = normalize(term) else {
            return Vec::new();
        };
        let needle = name.key();
        let threshold = self.snapshot.options.fuzzy_search_threshold;
        let store = &self.snapshot.store;

        let mut best: BTreeMap<EntityId, (f64, String)> = BTreeMap::new();
        for mapping in store.registry().iter() {
            let similarity = if mapping.key.starts_with(needle) {
                KEY_PREFIX_SIMILARITY
            } else if mapping
                .key
                .split(',')
                .flat_map(str::split_whitespace)
                .any(|token| token.starts_with(needle))
            {
                TOKEN_PREFIX_SIMILARITY
            } else {
                let similarity = strsim::jaro_winkler(needle, &mapping.key);
                if similarity < threshold {
                    continue;
                }
                similarity
            };
            let entry = best
                .entry(mapping.entity)
                .or_insert((f64::MIN, String::new()));
            if similarity > entry.0 {
                *entry = (similarity, mapping.key.clone());
            }
        }

        let mut hits: Vec<SearchHit> = best
            .into_iter()
            .filter_map(|(id, (similarity, matched))| {
                self.entity(id).ok().map(|record| SearchHit {
                    record,
                    similarity,
                    matched,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.record.entity.mention_count.cmp(&a.record.entity.mention_count))
                .then_with(|| a.record.entity.id.cmp(&b.record.entity.id))
        });
        hits.truncate(limit);
        hits
    }

    /// Highest weighted-degree entities.
    #[must_use]
    pub fn most_connected(&self, limit: usize) -> Vec<EntityRecord> {
        self.snapshot
            .centrality
            .ranked()
            .into_iter()
            .take(limit)
            .filter_map(|(id, _)| self.entity(id).ok())
            .collect()
    }

    fn resolve(&self, raw_or_id: &str) -> Result<EntityId> {
        let store = &self.snapshot.store;
        let trimmed = raw_or_id.trim();
        if trimmed.len() == 16 {
            if let Ok(id) = trimmed.parse::<EntityId>() {
                if let Ok(live) = store.resolve_id(id) {
                    return Ok(live);
                }
            }
        }
        let not_found = || CanonError::NotFound {
            query: raw_or_id.to_string(),
        };
        let name = normalize(trimmed).map_err(|_| not_found())?;
        if let Some(id) = store.lookup(name.key()) {
            return Ok(id);
        }
        let signature = name.token_signature();
        store
            .registry()
            .iter()
            .filter(|m| token_signature(&m.key) == signature)
            .map(|m| m.entity)
            .min()
            .ok_or_else(not_found)
    }
}

fn token_signature(key: &str) -> String {
    let mut tokens: Vec<&str> = key.split(',').flat_map(str::split_whitespace).collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::graph::build_graph;
    use crate::rank::compute_centrality;
    use crate::types::ResolverOptions;

    fn snapshot() -> (Arc<Snapshot>, [EntityId; 3]) {
        let mut snap = Snapshot::empty(ResolverOptions::default());
        let store = &mut snap.store;
        let mut create = |raw: &str| {
            store
                .create_entity(&normalize(raw).expect("n"), "manifest", "f1", None)
                .expect("create")
        };
        let maxwell = create("Maxwell, Ghislaine");
        let kellen = create("Sarah Kellen");
        let marcinkova = create("Nadia Marcinkova");
        let old = create("Maxwell, G");
        snap.store
            .merge_entities(maxwell, old, None)
            .expect("merge");

        let groups = vec![
            BTreeSet::from([maxwell, kellen, marcinkova]),
            BTreeSet::from([maxwell, kellen]),
        ];
        let mut graph = build_graph(&groups, &snap.store).expect("graph");
        let centrality = compute_centrality(&graph);
        centrality.annotate(&mut graph);
        snap.graph = graph;
        snap.centrality = centrality;
        (Arc::new(snap), [maxwell, kellen, marcinkova])
    }

    #[test]
    fn canonicalize_accepts_aliases_ids_and_tombstones() {
        let (snap, [maxwell, ..]) = snapshot();
        let old = EntityId::derive("maxwell, g", 0);
        let query = QueryService::new(snap);

        assert_eq!(query.canonicalize("maxwell,ghislaine").expect("alias").entity.id, maxwell);
        assert_eq!(query.canonicalize("Ghislaine Maxwell").expect("swap").entity.id, maxwell);
        assert_eq!(query.canonicalize(&maxwell.to_string()).expect("id").entity.id, maxwell);
        assert_eq!(query.canonicalize(&old.to_string()).expect("stale").entity.id, maxwell);
        assert!(matches!(
            query.canonicalize("Nobody Here").expect_err("missing"),
            CanonError::NotFound { .. }
        ));
    }

    #[test]
    fn neighbors_are_ordered_by_weight() {
        let (snap, [maxwell, kellen, marcinkova]) = snapshot();
        let query = QueryService::new(snap);
        let neighbors = query.neighbors(&maxwell.to_string(), 10).expect("neighbors");
        let ids: Vec<EntityId> = neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![kellen, marcinkova]);
        assert_eq!(neighbors[0].weight, 2);
        assert_eq!(query.neighbors("Sarah Kellen", 1).expect("neighbors").len(), 1);
    }

    #[test]
    fn search_ranks_prefix_before_fuzzy() {
        let (snap, [maxwell, kellen, _]) = snapshot();
        let query = QueryService::new(snap);
        let hits = query.search("max", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.entity.id, maxwell);

        let hits = query.search("sarah kelen", 5);
        assert_eq!(hits.first().map(|h| h.record.entity.id), Some(kellen));
        assert!(hits[0].similarity < 1.0);
        assert!(query.search("   ", 5).is_empty());
    }

    #[test]
    fn most_connected_uses_weighted_degree() {
        let (snap, [maxwell, kellen, marcinkova]) = snapshot();
        let query = QueryService::new(snap);
        let top: Vec<EntityId> = query.most_connected(3).iter().map(|r| r.entity.id).collect();
        let mut tied = vec![maxwell, kellen];
        tied.sort();
        assert_eq!(&top[..2], tied.as_slice());
        assert_eq!(top[2], marcinkova);
        assert_eq!(query.entity(maxwell).expect("entity").score, 3);
    }
}
