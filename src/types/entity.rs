//! Canonical entity identity and record types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Content-derived entity identifier.
///
/// Derived from the BLAKE3 hash of the normalized canonical key, so repeated
/// runs over identical input reproduce identical ids. Rendered as 16 lowercase
/// hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    /// Derive the id for a normalized key. `salt` is zero for the first
    /// attempt and increments only when an earlier id is already taken.
    #[must_use]
    pub fn derive(key: &str, salt: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(key.as_bytes());
        if salt > 0 {
            hasher.update(format!("#{salt}").as_bytes());
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

impl FromStr for EntityId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = EntityId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 16 character hex entity id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EntityId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

/// Best-effort entity classification. Not authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Person,
    Organization,
    Location,
}

impl EntityKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
        }
    }
}

/// A canonical, deduplicated entity.
///
/// `aliases` is a read-only view of the display variants the
/// [`AliasRegistry`](crate::AliasRegistry) maps to this entity; it is kept in
/// sync by the store and always contains `canonical_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub canonical_name: String,
    /// Normalized key the id was derived from. Never changes after creation.
    pub canonical_key: String,
    pub kind: EntityKind,
    pub aliases: BTreeSet<String>,
    pub mention_count: u64,
    pub sources: BTreeSet<String>,
    pub records: BTreeSet<String>,
    pub first_seen: Option<i64>,
    pub last_seen: Option<i64>,
}

impl Entity {
    pub(crate) fn observe(&mut self, source_id: &str, record_id: &str, observed_at: Option<i64>) {
        self.mention_count += 1;
        if !source_id.is_empty() {
            self.sources.insert(source_id.to_string());
        }
        if !record_id.is_empty() {
            self.records.insert(record_id.to_string());
        }
        if let Some(ts) = observed_at {
            self.first_seen = Some(self.first_seen.map_or(ts, |cur| cur.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |cur| cur.max(ts)));
        }
    }

    /// Distance in seconds from `ts` to this entity's observed range, or
    /// `None` when the entity has never been observed with a timestamp.
    #[must_use]
    pub fn distance_from_seen(&self, ts: i64) -> Option<i64> {
        let first = self.first_seen?;
        let last = self.last_seen.unwrap_or(first);
        if ts < first {
            Some(first - ts)
        } else if ts > last {
            Some(ts - last)
        } else {
            Some(0)
        }
    }
}
