//! Commit atomicity, locking, corruption detection and reversible decisions.

use std::fs;
use std::path::Path;

use canon_core::{
    Canon, CanonError, CoOccurrenceGroup, Decision, LockSettings, Mention, ResolverOptions,
};

fn quick_lock() -> LockSettings {
    LockSettings {
        timeout_ms: 30,
        retry_ms: 5,
    }
}

fn seeded(path: &Path) -> Canon {
    let mut canon = Canon::create(path, ResolverOptions::default()).expect("create");
    let mut batch = canon.begin_batch().expect("batch");
    batch
        .ingest_mention(&Mention::new("Maxwell, Ghislaine", "court", "d-1"))
        .expect("ingest");
    batch.commit().expect("commit");
    canon
}

#[test]
fn aborted_and_dropped_batches_leave_no_trace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people.cnx");
    let mut canon = seeded(&path);
    let before = fs::read(&path).expect("read");

    let mut batch = canon.begin_batch().expect("batch");
    batch
        .ingest_mention(&Mention::new("Sarah Kellen", "court", "d-2"))
        .expect("ingest");
    assert_eq!(batch.store().len(), 2);
    batch.abort();

    {
        let mut batch = canon.begin_batch().expect("batch");
        batch
            .ingest_mention(&Mention::new("Nadia Marcinkova", "court", "d-3"))
            .expect("ingest");
    }

    assert_eq!(fs::read(&path).expect("read"), before);
    assert_eq!(canon.generation(), 1);
    assert_eq!(canon.snapshot().store.len(), 1);
    assert!(canon.query().canonicalize("Sarah Kellen").is_err());
}

#[test]
fn readers_see_only_completed_commits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people.cnx");
    let mut canon = seeded(&path);
    let cell = canon.cell();
    let pinned = canon.query();
    let outside = Canon::open_read_only(&path).expect("reader");

    let mut batch = canon.begin_batch().expect("batch");
    batch
        .ingest_mention(&Mention::new("Sarah Kellen", "court", "d-2"))
        .expect("ingest");
    assert_eq!(cell.load().generation, 1);
    batch.commit().expect("commit");

    assert_eq!(cell.load().generation, 2);
    assert!(cell.query().canonicalize("Sarah Kellen").is_ok());
    assert_eq!(pinned.generation(), 1);

    assert_eq!(outside.generation(), 1);
    assert!(outside.reload().expect("reload"));
    assert_eq!(outside.generation(), 2);
}

#[test]
fn second_writer_is_locked_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people.cnx");
    let canon = seeded(&path);

    let err = Canon::open_with(&path, quick_lock()).err().expect("locked");
    assert!(matches!(err, CanonError::Lock(_)));

    drop(canon);
    let reopened = Canon::open_with(&path, quick_lock()).expect("reopen");
    assert_eq!(reopened.generation(), 1);
    assert!(reopened.query().canonicalize("Ghislaine Maxwell").is_ok());
}

#[test]
fn corrupted_snapshot_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people.cnx");
    drop(seeded(&path));

    let mut bytes = fs::read(&path).expect("read");
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    fs::write(&path, &bytes).expect("write");

    assert!(matches!(
        Canon::open(&path).err().expect("corrupt"),
        CanonError::ChecksumMismatch { .. }
    ));
    assert!(matches!(
        Canon::open_read_only(&path).err().expect("corrupt"),
        CanonError::ChecksumMismatch { .. }
    ));
}

#[test]
fn manual_merge_then_unmerge_restores_the_graph() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people.cnx");
    let mut canon = Canon::create(&path, ResolverOptions::default()).expect("create");

    let mut batch = canon.begin_batch().expect("batch");
    let kellen = batch
        .ingest_mention(&Mention::new("Sarah Kellen", "manifest", "f-1"))
        .expect("ingest")
        .expect("resolved");
    let vickers = batch
        .ingest_mention(&Mention::new("Sarah Vickers", "registry", "r-7"))
        .expect("ingest")
        .expect("resolved");
    assert!(vickers.is_new_entity);
    batch.add_group(CoOccurrenceGroup::new("f-1", ["Sarah Kellen", "Sarah Vickers"]));
    let record = batch
        .merge_entities(kellen.entity_id, vickers.entity_id, Some("married name".into()))
        .expect("merge");
    let merged = batch.commit().expect("commit");
    assert_eq!(merged.edges, 0);
    assert_eq!(
        canon.query().canonicalize("Sarah Vickers").expect("alias").entity.id,
        kellen.entity_id
    );
    // The stale id keeps resolving through the tombstone.
    assert_eq!(
        canon.query().entity(vickers.entity_id).expect("stale").entity.id,
        kellen.entity_id
    );

    let mut batch = canon.begin_batch().expect("batch");
    let restored = batch.unmerge(record.seq).expect("unmerge");
    assert_eq!(restored, vickers.entity_id);
    let reverted = batch.commit().expect("commit");
    assert_eq!(reverted.edges, 1);

    let query = canon.query();
    assert_eq!(
        query.canonicalize("Sarah Vickers").expect("alias").entity.id,
        vickers.entity_id
    );
    assert!(canon.snapshot().store.merges()[0].reverted);
}

#[test]
fn rejected_review_splits_the_alias_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people.cnx");
    let mut canon = Canon::create(&path, ResolverOptions::default()).expect("create");

    let mut batch = canon.begin_batch().expect("batch");
    let anchor = batch
        .ingest_mention(&Mention::new("Epstein, Jeffrey", "contacts", "c-1"))
        .expect("ingest")
        .expect("resolved");
    let guess = batch
        .ingest_mention(&Mention::new("Je Epstein", "manifest", "f-9"))
        .expect("ingest")
        .expect("resolved");
    assert_eq!(guess.decision, Decision::ProvisionalMerge);
    let commit = batch.commit().expect("commit");
    assert_eq!(commit.open_reviews, 1);
    assert_eq!(commit.batch.provisional, 1);

    let flag = guess.review.expect("flag");
    let mut batch = canon.begin_batch().expect("batch");
    let split = batch.reject_review(flag).expect("reject");
    assert_ne!(split, anchor.entity_id);
    let commit = batch.commit().expect("commit");
    assert_eq!(commit.open_reviews, 0);

    let query = canon.query();
    assert_eq!(query.canonicalize("Je Epstein").expect("alias").entity.id, split);
    let epstein = query.entity(anchor.entity_id).expect("anchor");
    assert!(!epstein.entity.aliases.contains("Je Epstein"));
    assert!(matches!(
        canon.begin_batch().expect("batch").reject_review(flag).expect_err("closed"),
        CanonError::ReviewNotFound { .. }
    ));
}
