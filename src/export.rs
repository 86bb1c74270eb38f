//! JSON artifacts for downstream consumers.
//!
//! Four files are written next to each other, each replaced atomically:
//! `entities.json`, `aliases.json`, `graph.json` and `review.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::constants::{ALIASES_ARTIFACT, ENTITIES_ARTIFACT, GRAPH_ARTIFACT, REVIEW_ARTIFACT};
use crate::error::Result;
use crate::io::{snapshot::Snapshot, write_atomic};
use crate::types::{EntityId, EntityKind, MergeRecord, ReviewFlag};

#[derive(Serialize)]
struct EntityRow<'a> {
    id: EntityId,
    canonical_name: &'a str,
    aliases: &'a BTreeSet<String>,
    entity_kind: EntityKind,
    mention_count: u64,
    sources: &'a BTreeSet<String>,
}

#[derive(Serialize)]
struct NodeRow<'a> {
    id: EntityId,
    name: &'a str,
    score: u64,
}

#[derive(Serialize)]
struct EdgeRow {
    a: EntityId,
    b: EntityId,
    weight: u64,
}

#[derive(Serialize)]
struct GraphDoc<'a> {
    generation: u64,
    nodes: Vec<NodeRow<'a>>,
    edges: Vec<EdgeRow>,
}

#[derive(Serialize)]
struct ReviewDoc<'a> {
    generation: u64,
    open: Vec<&'a ReviewFlag>,
    merges: &'a [MergeRecord],
}

/// Write every artifact for `snapshot` into `dir`, creating it if needed.
pub fn write_artifacts(snapshot: &Snapshot, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let store = &snapshot.store;

    let entities: Vec<EntityRow<'_>> = store
        .entities()
        .map(|e| EntityRow {
            id: e.id,
            canonical_name: &e.canonical_name,
            aliases: &e.aliases,
            entity_kind: e.kind,
            mention_count: e.mention_count,
            sources: &e.sources,
        })
        .collect();
    write_json(&dir.join(ENTITIES_ARTIFACT), &entities)?;

    let mut aliases: BTreeMap<&str, EntityId> = BTreeMap::new();
    for mapping in store.registry().iter() {
        aliases.insert(&mapping.key, mapping.entity);
        aliases.insert(&mapping.display, mapping.entity);
    }
    write_json(&dir.join(ALIASES_ARTIFACT), &aliases)?;

    let graph = GraphDoc {
        generation: snapshot.generation,
        nodes: snapshot
            .graph
            .nodes
            .iter()
            .map(|n| NodeRow {
                id: n.id,
                name: &n.name,
                score: n.score,
            })
            .collect(),
        edges: snapshot
            .graph
            .edges
            .iter()
            .map(|e| EdgeRow {
                a: e.a,
                b: e.b,
                weight: e.weight,
            })
            .collect(),
    };
    write_json(&dir.join(GRAPH_ARTIFACT), &graph)?;

    let review = ReviewDoc {
        generation: snapshot.generation,
        open: store.open_reviews().collect(),
        merges: store.merges(),
    };
    write_json(&dir.join(REVIEW_ARTIFACT), &review)?;

    tracing::info!(
        target: "canon::export",
        dir = %dir.display(),
        generation = snapshot.generation,
        entities = entities.len(),
        aliases = aliases.len(),
        edges = snapshot.graph.edges.len(),
        "artifacts written"
    );
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}
