//! Ingestion input records.

use serde::{Deserialize, Serialize};

/// A single observed occurrence of a name in one source record.
///
/// Mentions are consumed during resolution; only aggregated counters survive
/// on the [`Entity`](super::Entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub raw_name: String,
    pub source_id: String,
    pub record_id: String,
    /// Observation time in unix seconds, when the source carries one.
    #[serde(default)]
    pub observed_at: Option<i64>,
}

impl Mention {
    pub fn new(
        raw_name: impl Into<String>,
        source_id: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            raw_name: raw_name.into(),
            source_id: source_id.into(),
            record_id: record_id.into(),
            observed_at: None,
        }
    }

    #[must_use]
    pub fn observed_at(mut self, ts: i64) -> Self {
        self.observed_at = Some(ts);
        self
    }
}

/// Raw names jointly referenced by one source record, e.g. the passenger list
/// of one flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrenceGroup {
    pub record_id: String,
    pub member_raw_names: Vec<String>,
}

impl CoOccurrenceGroup {
    pub fn new<I, S>(record_id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            record_id: record_id.into(),
            member_raw_names: members.into_iter().map(Into::into).collect(),
        }
    }
}
