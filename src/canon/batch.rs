//! Single-writer ingestion batch with all-or-nothing commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Canon;
use crate::error::{CanonError, Result};
use crate::graph::{build_graph, resolve_groups};
use crate::io::snapshot::{Snapshot, SnapshotCodec};
use crate::rank::compute_centrality;
use crate::reader::{ReaderDiagnostics, ReaderHint, ReaderRegistry};
use crate::resolve::{Disambiguator, Outcome, Resolution};
use crate::store::EntityStore;
use crate::types::{
    BatchReport, CoOccurrenceGroup, CommitReport, Decision, EntityId, Mention, MergeRecord,
};

impl Canon {
    /// Start a write batch over a private copy of the committed state.
    ///
    /// The batch borrows the handle mutably, so at most one batch exists per
    /// handle; the file lock extends that to other processes.
    pub fn begin_batch(&mut self) -> Result<Batch<'_>> {
        if self.is_read_only() {
            return Err(CanonError::ReadOnly);
        }
        let base = self.cell.load();
        tracing::debug!(
            target: "canon::batch",
            generation = base.generation,
            "batch started"
        );
        Ok(Batch {
            store: base.store.clone(),
            groups: base.groups.clone(),
            resolver: Disambiguator::new(base.options.clone()),
            report: BatchReport::default(),
            base,
            canon: self,
            finished: false,
        })
    }
}

/// Pending changes against one committed snapshot.
///
/// Nothing becomes visible to readers or reaches disk until
/// [`Batch::commit`] succeeds. Dropping the batch discards it.
pub struct Batch<'a> {
    canon: &'a mut Canon,
    base: Arc<Snapshot>,
    store: EntityStore,
    groups: BTreeMap<String, CoOccurrenceGroup>,
    resolver: Disambiguator,
    report: BatchReport,
    finished: bool,
}

impl Batch<'_> {
    /// Working store including uncommitted changes.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    #[must_use]
    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// Resolve one mention into the working store.
    ///
    /// Malformed mentions and alias conflicts are counted and skipped
    /// (`Ok(None)`), as are placeholders. Any other error is returned and
    /// should be followed by [`Batch::abort`].
    pub fn ingest_mention(&mut self, mention: &Mention) -> Result<Option<Resolution>> {
        self.report.mentions_seen += 1;
        match self.resolver.resolve(&mut self.store, mention) {
            Ok(Outcome::Resolved(resolution)) => {
                match resolution.decision {
                    Decision::ExactAlias => self.report.resolved_exact += 1,
                    Decision::AutoMerge => self.report.auto_merged += 1,
                    Decision::ProvisionalMerge => self.report.provisional += 1,
                    Decision::NewEntity => self.report.new_entities += 1,
                }
                self.report
                    .decisions
                    .push(resolution.to_record(&mention.raw_name));
                Ok(Some(resolution))
            }
            Ok(Outcome::Discarded { key }) => {
                *self.report.discarded.entry(key).or_insert(0) += 1;
                Ok(None)
            }
            Err(err @ CanonError::MalformedMention { .. }) => {
                tracing::debug!(
                    target: "canon::batch",
                    source = %mention.source_id,
                    record = %mention.record_id,
                    %err,
                    "mention skipped"
                );
                self.report.malformed += 1;
                Ok(None)
            }
            Err(CanonError::AliasConflict {
                alias,
                existing,
                attempted,
            }) => {
                tracing::warn!(
                    target: "canon::batch",
                    %alias,
                    %existing,
                    %attempted,
                    "alias conflict rejected"
                );
                self.report.alias_conflicts += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn ingest_mentions<'m, I>(&mut self, mentions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'m Mention>,
    {
        for mention in mentions {
            self.ingest_mention(mention)?;
        }
        Ok(())
    }

    /// Store a co-occurrence group. A group with an already stored record id
    /// replaces it.
    pub fn add_group(&mut self, group: CoOccurrenceGroup) {
        self.report.groups_added += 1;
        if let Some(previous) = self.groups.insert(group.record_id.clone(), group) {
            tracing::debug!(
                target: "canon::batch",
                record = %previous.record_id,
                "co-occurrence group replaced"
            );
        }
    }

    /// Run `bytes` through the matching reader, then ingest its mentions
    /// before storing its groups.
    pub fn ingest_source(
        &mut self,
        readers: &ReaderRegistry,
        bytes: &[u8],
        hint: &ReaderHint<'_>,
    ) -> Result<ReaderDiagnostics> {
        let output = readers.extract(bytes, hint)?;
        self.ingest_mentions(&output.mentions)?;
        for group in output.groups {
            self.add_group(group);
        }
        for warning in &output.diagnostics.warnings {
            tracing::warn!(
                target: "canon::batch",
                reader = %output.reader_name,
                source = hint.source_id,
                %warning,
                "reader warning"
            );
        }
        Ok(output.diagnostics)
    }

    pub fn merge_entities(
        &mut self,
        survivor: EntityId,
        absorbed: EntityId,
        note: Option<String>,
    ) -> Result<MergeRecord> {
        self.store.merge_entities(survivor, absorbed, note)
    }

    pub fn unmerge(&mut self, seq: u64) -> Result<EntityId> {
        self.store.unmerge(seq)
    }

    pub fn split_alias(&mut self, key: &str) -> Result<EntityId> {
        self.store.split_alias(key)
    }

    pub fn accept_review(&mut self, id: u64) -> Result<()> {
        self.store.accept_review(id)
    }

    pub fn reject_review(&mut self, id: u64) -> Result<EntityId> {
        self.store.reject_review(id)
    }

    /// Verify the working store, rebuild graph and ranking, persist the new
    /// snapshot atomically, then publish it to readers.
    ///
    /// On error nothing is written or published; the previous snapshot keeps
    /// serving.
    pub fn commit(mut self) -> Result<CommitReport> {
        self.finished = true;
        let store = std::mem::take(&mut self.store);
        let groups = std::mem::take(&mut self.groups);
        let report = std::mem::take(&mut self.report);

        let (snapshot, unresolved_members) =
            match assemble(&self.base, &self.resolver, store, groups) {
                Ok(built) => built,
                Err(err) => {
                    tracing::error!(target: "canon::batch", %err, "commit aborted");
                    return Err(err);
                }
            };
        if let Err(err) = SnapshotCodec::write(&self.canon.path, &snapshot) {
            tracing::error!(target: "canon::batch", %err, "snapshot write failed");
            return Err(err);
        }

        let commit = CommitReport {
            generation: snapshot.generation,
            entities: snapshot.store.len(),
            aliases: snapshot.store.registry().len(),
            nodes: snapshot.graph.node_count(),
            edges: snapshot.graph.edge_count(),
            open_reviews: snapshot.store.open_reviews().count(),
            unresolved_members,
            batch: report,
        };
        self.canon.cell.publish(Arc::new(snapshot));
        tracing::info!(
            target: "canon::batch",
            generation = commit.generation,
            entities = commit.entities,
            edges = commit.edges,
            open_reviews = commit.open_reviews,
            mentions = commit.batch.mentions_seen,
            discarded = commit.batch.discarded_total(),
            "batch committed"
        );
        Ok(commit)
    }

    /// Discard every pending change.
    pub fn abort(mut self) {
        self.finished = true;
        tracing::debug!(
            target: "canon::batch",
            mentions = self.report.mentions_seen,
            "batch aborted"
        );
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                target: "canon::batch",
                mentions = self.report.mentions_seen,
                "uncommitted batch dropped"
            );
        }
    }
}

fn assemble(
    base: &Snapshot,
    resolver: &Disambiguator,
    store: EntityStore,
    groups: BTreeMap<String, CoOccurrenceGroup>,
) -> Result<(Snapshot, u64)> {
    store.verify()?;
    let resolved = resolve_groups(groups.values(), &store, resolver);
    let mut graph = build_graph(resolved.groups.iter().map(|(_, members)| members), &store)?;
    let centrality = compute_centrality(&graph);
    centrality.annotate(&mut graph);
    if resolved.placeholders > 0 {
        tracing::debug!(
            target: "canon::batch",
            placeholders = resolved.placeholders,
            "placeholder group members left out of the graph"
        );
    }
    let snapshot = Snapshot {
        generation: base.generation + 1,
        options: base.options.clone(),
        store,
        groups,
        graph,
        centrality,
    };
    Ok((snapshot, resolved.unresolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolverOptions;

    fn canon(dir: &tempfile::TempDir) -> Canon {
        Canon::create(dir.path().join("people.cnx"), ResolverOptions::default()).expect("create")
    }

    #[test]
    fn report_counts_every_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut canon = canon(&dir);
        let mut batch = canon.begin_batch().expect("batch");
        let mentions = [
            Mention::new("Epstein, Jeffrey", "contacts", "c-1"),
            Mention::new("Epstein, Jeffrey", "contacts", "c-2"),
            Mention::new("Female (1)", "manifest", "f-1"),
            Mention::new(" ,, ", "manifest", "f-1"),
        ];
        batch.ingest_mentions(&mentions).expect("ingest");
        let report = batch.report().clone();
        assert_eq!(report.mentions_seen, 4);
        assert_eq!(report.new_entities, 1);
        assert_eq!(report.resolved_exact, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.discarded_total(), 1);
        assert_eq!(report.decisions.len(), 2);

        let commit = batch.commit().expect("commit");
        assert_eq!(commit.generation, 1);
        assert_eq!(commit.entities, 1);
        assert_eq!(canon.generation(), 1);
    }

    #[test]
    fn groups_replace_by_record_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut canon = canon(&dir);
        let mut batch = canon.begin_batch().expect("batch");
        for raw in ["Sarah Kellen", "Nadia Marcinkova", "Lesley Groff"] {
            batch
                .ingest_mention(&Mention::new(raw, "manifest", "f-9"))
                .expect("ingest");
        }
        batch.add_group(CoOccurrenceGroup::new("f-9", ["Sarah Kellen", "Nadia Marcinkova"]));
        batch.add_group(CoOccurrenceGroup::new("f-9", ["Sarah Kellen", "Lesley Groff", "Nobody"]));
        let commit = batch.commit().expect("commit");
        assert_eq!(commit.edges, 1);
        assert_eq!(commit.unresolved_members, 1);

        let query = canon.query();
        let neighbors = query.neighbors("Sarah Kellen", 5).expect("neighbors");
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].name, "Lesley Groff");
    }

    #[test]
    fn read_only_handles_refuse_batches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = canon(&dir);
        let mut reader = Canon::open_read_only(writer.path()).expect("reader");
        assert!(matches!(
            reader.begin_batch().err().expect("read-only"),
            CanonError::ReadOnly
        ));
    }
}
