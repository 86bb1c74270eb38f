//! Snapshot layout and resolver defaults.

/// Magic bytes at the start of every snapshot file.
pub const MAGIC: [u8; 4] = *b"CNX1";
/// Snapshot payload format version.
pub const SNAPSHOT_VERSION: u16 = 0x0103;
/// magic (4) + version (2) + reserved (2) + generation (8) + payload len (8) + blake3 (32)
pub const SNAPSHOT_HEADER_SIZE: usize = 56;
/// Upper bound on a snapshot payload we are willing to decode.
pub const MAX_SNAPSHOT_BYTES: u64 = 512 * 1024 * 1024;

pub const DEFAULT_AUTO_MERGE_THRESHOLD: f32 = 0.80;
pub const DEFAULT_REVIEW_THRESHOLD: f32 = 0.55;
pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;
pub const DEFAULT_MIN_PREFIX_LEN: usize = 2;
pub const DEFAULT_HOMONYM_WINDOW_DAYS: i64 = 3_650;
pub const DEFAULT_FUZZY_SEARCH_THRESHOLD: f64 = 0.88;

/// Tolerance applied when comparing summed f32 scores against thresholds.
pub const SCORE_EPSILON: f32 = 1e-4;

/// Guard against corrupted tombstone chains.
pub const MAX_TOMBSTONE_HOPS: usize = 64;

pub const ENTITIES_ARTIFACT: &str = "entities.json";
pub const ALIASES_ARTIFACT: &str = "aliases.json";
pub const GRAPH_ARTIFACT: &str = "graph.json";
pub const REVIEW_ARTIFACT: &str = "review.json";
