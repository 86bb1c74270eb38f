//! End-to-end ingestion scenarios: sources in, canonical store and graph out.

use std::collections::BTreeMap;
use std::path::Path;

use canon_core::{
    Canon, CommitReport, EntityId, ReaderHint, ReaderRegistry, ResolverOptions, SourceFormat,
    normalize,
};

const CONTACTS: &str = "\
name,phone
\"Epstein, Jeffrey\",555-0100
Je           Je Epstein,
Je Je Epstein,
\"Maxwell,Ghislaine\",555-0101
";

const MANIFEST: &str = "\
FLIGHT 1 DATE 1997-01-01 TEB-PBI
Jeffrey Epstein; Ghislaine Maxwell; Sarah Kellen; Female (1)

FLIGHT 2 DATE 1997-01-02 PBI-TEB
Jeffrey Epstein | Sarah Kellen
";

fn run(path: &Path) -> (Canon, CommitReport) {
    let readers = ReaderRegistry::default();
    let mut canon = Canon::create(path, ResolverOptions::default()).expect("create");
    let mut batch = canon.begin_batch().expect("batch");
    batch
        .ingest_source(
            &readers,
            CONTACTS.as_bytes(),
            &ReaderHint::new("contacts", Some(SourceFormat::ContactList)),
        )
        .expect("contacts");
    batch
        .ingest_source(
            &readers,
            MANIFEST.as_bytes(),
            &ReaderHint::new("flights", None).with_uri(Some("flights-1997.manifest")),
        )
        .expect("manifest");
    let report = batch.commit().expect("commit");
    (canon, report)
}

fn id_of(canon: &Canon, raw: &str) -> EntityId {
    canon.query().canonicalize(raw).expect(raw).entity.id
}

#[test]
fn ocr_variants_collapse_into_one_entity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (canon, _) = run(&dir.path().join("people.cnx"));

    let epstein = id_of(&canon, "Epstein, Jeffrey");
    assert_eq!(id_of(&canon, "Je           Je Epstein"), epstein);
    assert_eq!(id_of(&canon, "Je Je Epstein"), epstein);
    assert_eq!(id_of(&canon, "Jeffrey Epstein"), epstein);

    let record = canon.query().entity(epstein).expect("entity");
    assert_eq!(record.entity.canonical_name, "Epstein, Jeffrey");
    assert!(record.entity.aliases.len() >= 2);
    assert_eq!(record.entity.mention_count, 5);
}

#[test]
fn order_swapped_names_resolve_together() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (canon, _) = run(&dir.path().join("people.cnx"));
    assert_eq!(
        id_of(&canon, "Maxwell, Ghislaine"),
        id_of(&canon, "Ghislaine Maxwell")
    );
}

#[test]
fn co_occurrence_weights_count_distinct_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (canon, report) = run(&dir.path().join("people.cnx"));
    let a = id_of(&canon, "Jeffrey Epstein");
    let b = id_of(&canon, "Sarah Kellen");
    let c = id_of(&canon, "Ghislaine Maxwell");

    let snapshot = canon.snapshot();
    let graph = &snapshot.graph;
    assert_eq!(graph.weight(a, b), 2);
    assert_eq!(graph.weight(a, c), 1);
    assert_eq!(graph.weight(b, c), 1);
    assert_eq!(report.edges, 3);

    let top = canon.query().most_connected(2);
    let mut leaders: Vec<EntityId> = top.iter().map(|r| r.entity.id).collect();
    leaders.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(leaders, expected);
    assert_eq!(top[0].score, 3);
}

#[test]
fn placeholders_stay_out_of_store_and_graph() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (canon, report) = run(&dir.path().join("people.cnx"));
    assert_eq!(report.batch.discarded.get("female (1)"), Some(&1));

    let snapshot = canon.snapshot();
    assert!(snapshot.store.lookup("female (1)").is_none());
    assert!(snapshot.store.entities().all(|e| !e.canonical_name.contains("Female")));
    assert!(snapshot.graph.nodes.iter().all(|n| !n.name.contains("Female")));
    assert_eq!(snapshot.graph.node_count(), 3);
}

#[test]
fn identical_input_gives_identical_state() {
    let first_dir = tempfile::tempdir().expect("tempdir");
    let second_dir = tempfile::tempdir().expect("tempdir");
    let (first, _) = run(&first_dir.path().join("people.cnx"));
    let (second, _) = run(&second_dir.path().join("people.cnx"));
    let (a, b) = (first.snapshot(), second.snapshot());

    let entities = |s: &canon_core::Snapshot| s.store.entities().cloned().collect::<Vec<_>>();
    let aliases = |s: &canon_core::Snapshot| s.store.registry().iter().cloned().collect::<Vec<_>>();
    assert_eq!(entities(&a), entities(&b));
    assert_eq!(aliases(&a), aliases(&b));
    assert_eq!(a.graph, b.graph);
    assert_eq!(a.centrality, b.centrality);
}

#[test]
fn aliases_are_unique_and_graph_is_symmetric() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (canon, _) = run(&dir.path().join("people.cnx"));
    let snapshot = canon.snapshot();
    let store = &snapshot.store;

    let mut owners: BTreeMap<String, EntityId> = BTreeMap::new();
    for entity in store.entities() {
        for alias in &entity.aliases {
            let key = normalize(alias).expect("alias").key().to_string();
            assert_eq!(store.lookup(&key), Some(entity.id), "{alias}");
            if let Some(previous) = owners.insert(key.clone(), entity.id) {
                assert_eq!(previous, entity.id, "{key} owned twice");
            }
        }
    }

    let graph = &snapshot.graph;
    let mut weighted_degree: BTreeMap<EntityId, u64> = BTreeMap::new();
    for edge in &graph.edges {
        assert!(edge.a < edge.b, "edges are stored once with a < b");
        assert_eq!(graph.weight(edge.a, edge.b), graph.weight(edge.b, edge.a));
        *weighted_degree.entry(edge.a).or_default() += edge.weight;
        *weighted_degree.entry(edge.b).or_default() += edge.weight;
    }
    for node in &graph.nodes {
        assert_eq!(node.score, weighted_degree.get(&node.id).copied().unwrap_or(0));
    }
}

#[test]
fn artifacts_reflect_the_committed_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (canon, _) = run(&dir.path().join("people.cnx"));
    let out = dir.path().join("out");
    canon.export_artifacts(&out).expect("export");

    let graph: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join("graph.json")).expect("graph"))
            .expect("json");
    assert_eq!(graph["nodes"].as_array().map(Vec::len), Some(3));
    assert_eq!(graph["edges"].as_array().map(Vec::len), Some(3));

    let aliases: BTreeMap<String, String> =
        serde_json::from_slice(&std::fs::read(out.join("aliases.json")).expect("aliases"))
            .expect("json");
    let epstein = id_of(&canon, "Epstein, Jeffrey").to_string();
    assert_eq!(aliases.get("je epstein"), Some(&epstein));
    assert_eq!(aliases.get("Jeffrey Epstein"), Some(&epstein));

    let entities: Vec<serde_json::Value> =
        serde_json::from_slice(&std::fs::read(out.join("entities.json")).expect("entities"))
            .expect("json");
    assert_eq!(entities.len(), 3);
}

#[test]
fn every_passenger_on_a_flight_is_a_node() {
    let dir = tempfile::tempdir().expect("tempdir");
    let readers = ReaderRegistry::default();
    let mut canon =
        Canon::create(dir.path().join("people.cnx"), ResolverOptions::default()).expect("create");
    let mut batch = canon.begin_batch().expect("batch");
    batch
        .ingest_source(
            &readers,
            b"FLIGHT 3 DATE 1998-05-05\nMary Smith | Mark Smith | Sarah Kellen | Sarah Jones\n",
            &ReaderHint::new("flights", Some(SourceFormat::FlightManifest)),
        )
        .expect("manifest");
    let report = batch.commit().expect("commit");

    assert_eq!(report.entities, 4);
    assert_eq!(report.nodes, 4);
    assert_eq!(report.edges, 6);
    assert_eq!(report.batch.auto_merged, 0);
    assert_eq!(report.batch.provisional, 0);
    assert_eq!(report.open_reviews, 0);
}
