//! Audit records: merge log, review queue, resolver decisions and batch reports.
//!
//! Every non-trivial resolution is recorded here so merges can be inspected and
//! reversed instead of trusted silently.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::alias::AliasMapping;
use super::entity::{Entity, EntityId};

/// A first-class, reversible merge decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub seq: u64,
    pub survivor: EntityId,
    pub absorbed: EntityId,
    /// Free-form operator note.
    pub note: Option<String>,
    /// Alias mappings of `absorbed` as they were before being redirected.
    pub moved_aliases: Vec<AliasMapping>,
    /// The absorbed entity exactly as it was before the merge.
    pub absorbed_snapshot: Entity,
    pub survivor_sources_before: BTreeSet<String>,
    pub survivor_records_before: BTreeSet<String>,
    pub reverted: bool,
}

/// Kind of condition that put a resolution on the review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Score landed in the manual-review band; the mention was provisionally
    /// attached to the best candidate.
    AmbiguousMerge,
    /// Exact alias hit on a person seen far away in time with no source
    /// overlap; possibly a different person sharing the name.
    PossibleHomonym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Open,
    Accepted,
    Rejected,
}

/// A provisional resolution awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub id: u64,
    pub kind: ReviewKind,
    pub raw_name: String,
    pub alias_key: String,
    pub entity: EntityId,
    pub runner_up: Option<EntityId>,
    pub score: f32,
    pub features: Vec<String>,
    pub source_id: String,
    pub record_id: String,
    pub observed_at: Option<i64>,
    /// The entity's observed range before this mention was attached.
    pub prior_first_seen: Option<i64>,
    pub prior_last_seen: Option<i64>,
    pub status: ReviewStatus,
}

/// Outcome category of a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    ExactAlias,
    AutoMerge,
    ProvisionalMerge,
    NewEntity,
}

/// Logged record of a resolver decision and the features that drove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub raw_name: String,
    pub key: String,
    pub entity: EntityId,
    pub decision: Decision,
    pub score: Option<f32>,
    pub features: Vec<String>,
    pub runner_up: Option<EntityId>,
}

/// Counters accumulated while a batch ingests mentions and groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub mentions_seen: u64,
    pub resolved_exact: u64,
    pub auto_merged: u64,
    pub provisional: u64,
    pub new_entities: u64,
    pub malformed: u64,
    pub alias_conflicts: u64,
    /// Placeholder mentions routed to the discard bucket, keyed by folded text.
    pub discarded: BTreeMap<String, u64>,
    pub groups_added: u64,
    pub decisions: Vec<DecisionRecord>,
}

impl BatchReport {
    #[must_use]
    pub fn discarded_total(&self) -> u64 {
        self.discarded.values().sum()
    }
}

/// Summary returned by a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReport {
    pub generation: u64,
    pub entities: usize,
    pub aliases: usize,
    pub nodes: usize,
    pub edges: usize,
    pub open_reviews: usize,
    /// Group members that did not resolve to any entity and were left out
    /// of the graph.
    pub unresolved_members: u64,
    pub batch: BatchReport,
}
