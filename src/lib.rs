#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public APIs
// still carry docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Casts are bounded by alias lengths and record counts.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
// survivor/absorbed, first/last, key/keys
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::format_push_string)]
#![allow(clippy::case_sensitive_file_extension_comparisons)]
#![allow(clippy::implicit_hasher)]

/// The version of canon-core being used.
pub const CANON_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod canon;
mod classify;
pub mod constants;
pub mod error;
pub mod export;
pub mod graph;
pub mod io;
mod lock;
pub mod query;
pub mod rank;
pub mod reader;
mod registry;
pub mod resolve;
pub mod store;
pub mod text;
pub mod types;

pub use canon::{Batch, Canon, SnapshotCell};
pub use classify::classify;
pub use error::{CanonError, Result};
pub use export::write_artifacts;
pub use graph::{ResolvedGroups, build_graph, resolve_groups};
pub use io::snapshot::{Snapshot, SnapshotCodec};
pub use lock::{FileLock, LockSettings};
pub use query::{EntityRecord, Neighbor, QueryService, SearchHit};
pub use rank::{Centrality, NodeScore, compute_centrality};
pub use reader::{
    ContactListReader, FlightManifestReader, JsonlReader, ReaderDiagnostics, ReaderHint,
    ReaderOutput, ReaderRegistry, SourceFormat, SourceReader,
};
pub use registry::AliasRegistry;
pub use resolve::{Candidate, Disambiguator, Outcome, PlaceholderFilter, Resolution};
pub use store::EntityStore;
pub use text::{NameParts, NormalizedKey, fold, normalize};
pub use types::{
    AliasMapping, AliasProvenance, BatchReport, CoOccurrenceGroup, CommitReport, Decision,
    DecisionRecord, Entity, EntityId, EntityKind, Graph, GraphEdge, GraphNode, MergeRecord,
    Mention, ResolverOptions, ResolverOptionsBuilder, ReviewFlag, ReviewKind, ReviewStatus,
    ScoreWeights,
};
