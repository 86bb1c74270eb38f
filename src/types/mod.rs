//! Core data types shared across the resolution pipeline.

mod alias;
mod audit;
mod entity;
mod graph;
mod mention;
pub mod options;

pub use alias::{AliasMapping, AliasProvenance};
pub use audit::{
    BatchReport, CommitReport, Decision, DecisionRecord, MergeRecord, ReviewFlag, ReviewKind,
    ReviewStatus,
};
pub use entity::{Entity, EntityId, EntityKind};
pub use graph::{Graph, GraphEdge, GraphNode};
pub use mention::{CoOccurrenceGroup, Mention};
pub use options::{ResolverOptions, ResolverOptionsBuilder, ScoreWeights};
