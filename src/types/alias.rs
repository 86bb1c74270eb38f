//! Alias mapping records owned by the alias registry.

use serde::{Deserialize, Serialize};

use super::entity::EntityId;

/// Why an alias was attached to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasProvenance {
    /// First variant of a freshly created entity.
    Observed,
    /// OCR-garbled variant repaired by edit distance or prefix match.
    OcrRepair,
    /// `Lastname, Firstname` versus `Firstname Lastname`.
    NameOrderSwap,
    /// Variant differing only by punctuation or casing.
    Punctuation,
    /// Generic fuzzy attachment (single-token containment and similar).
    FuzzyMatch,
    /// Moved over when two entities were merged.
    Merge,
    /// Attached by an explicit operator action.
    Manual,
    /// Split out into its own entity after a rejected review.
    ReviewSplit,
}

/// A normalized key → entity association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMapping {
    /// Case-folded comparison key.
    pub key: String,
    /// First display form observed for this key.
    pub display: String,
    pub entity: EntityId,
    pub provenance: AliasProvenance,
    pub confidence: f32,
    /// Mentions resolved through this alias.
    pub mentions: u64,
}
