//! Canonical entity store.
//!
//! Owns live entities, tombstones for merged-away ids, the alias registry, the
//! merge log and the review queue. Entities are never physically deleted: a
//! merge leaves a tombstone that every lookup follows.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::classify;
use crate::constants::MAX_TOMBSTONE_HOPS;
use crate::error::{CanonError, Result};
use crate::registry::AliasRegistry;
use crate::text::{NormalizedKey, normalize};
use crate::types::{
    AliasProvenance, Entity, EntityId, Mention, MergeRecord, ReviewFlag, ReviewKind, ReviewStatus,
};

/// A mention being attached to an existing entity.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Attachment<'a> {
    pub entity: EntityId,
    pub name: &'a NormalizedKey,
    pub provenance: AliasProvenance,
    pub confidence: f32,
    /// Provisional attachments never upgrade the canonical name.
    pub provisional: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    tombstones: BTreeMap<EntityId, EntityId>,
    registry: AliasRegistry,
    merges: Vec<MergeRecord>,
    reviews: Vec<ReviewFlag>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn registry(&self) -> &AliasRegistry {
        &self.registry
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live entities ordered by id.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// `(absorbed, survivor)` redirects, ordered by absorbed id.
    pub fn tombstones(&self) -> impl Iterator<Item = (EntityId, EntityId)> + '_ {
        self.tombstones.iter().map(|(a, s)| (*a, *s))
    }

    #[must_use]
    pub fn merges(&self) -> &[MergeRecord] {
        &self.merges
    }

    #[must_use]
    pub fn reviews(&self) -> &[ReviewFlag] {
        &self.reviews
    }

    pub fn open_reviews(&self) -> impl Iterator<Item = &ReviewFlag> + '_ {
        self.reviews
            .iter()
            .filter(|flag| flag.status == ReviewStatus::Open)
    }

    #[must_use]
    pub fn review(&self, id: u64) -> Option<&ReviewFlag> {
        self.reviews.iter().find(|flag| flag.id == id)
    }

    /// Exact alias lookup by normalized key.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<EntityId> {
        self.registry.resolve(key)
    }

    /// Live entity by id, without following tombstones.
    #[must_use]
    pub fn live(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Follow the tombstone chain from `id` to a live entity.
    pub fn resolve_id(&self, id: EntityId) -> Result<EntityId> {
        let mut current = id;
        for _ in 0..=MAX_TOMBSTONE_HOPS {
            if self.entities.contains_key(&current) {
                return Ok(current);
            }
            match self.tombstones.get(&current) {
                Some(next) => current = *next,
                None => {
                    return Err(CanonError::EntityNotFound { id: id.to_string() });
                }
            }
        }
        Err(CanonError::InvariantViolation {
            reason: format!("tombstone chain from {id} exceeds {MAX_TOMBSTONE_HOPS} hops"),
        })
    }

    /// Entity by id, transparently following tombstones.
    pub fn get_entity(&self, id: EntityId) -> Result<&Entity> {
        let live = self.resolve_id(id)?;
        self.entities
            .get(&live)
            .ok_or_else(|| CanonError::EntityNotFound { id: id.to_string() })
    }

    /// Create an entity whose first alias is `name`.
    ///
    /// The id is derived from the normalized key; on the rare collision with
    /// an existing or tombstoned id it is re-derived with an increasing salt.
    pub fn create_entity(
        &mut self,
        name: &NormalizedKey,
        source_id: &str,
        record_id: &str,
        observed_at: Option<i64>,
    ) -> Result<EntityId> {
        let id = self.fresh_id(name.key());
        if let Some(existing) = self.registry.resolve(name.key()) {
            return Err(CanonError::AliasConflict {
                alias: name.key().to_string(),
                existing,
                attempted: id,
            });
        }
        self.registry
            .register(name.key(), name.display(), id, AliasProvenance::Observed, 1.0)?;

        let mut entity = Entity {
            id,
            canonical_name: name.display().to_string(),
            canonical_key: name.key().to_string(),
            kind: classify(name.key()),
            aliases: BTreeSet::from([name.display().to_string()]),
            mention_count: 0,
            sources: BTreeSet::new(),
            records: BTreeSet::new(),
            first_seen: None,
            last_seen: None,
        };
        entity.observe(source_id, record_id, observed_at);
        tracing::debug!(
            target: "canon::store",
            entity = %id,
            name = %entity.canonical_name,
            kind = entity.kind.label(),
            "entity created"
        );
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Attach one mention to a live entity through `attachment.name`.
    pub(crate) fn attach(&mut self, attachment: Attachment<'_>, mention: &Mention) -> Result<()> {
        let id = attachment.entity;
        if !self.entities.contains_key(&id) {
            return Err(CanonError::EntityNotFound { id: id.to_string() });
        }
        let key = attachment.name.key();
        self.registry.register(
            key,
            attachment.name.display(),
            id,
            attachment.provenance,
            attachment.confidence,
        )?;
        let alias_display = self
            .registry
            .mapping(key)
            .map_or_else(|| attachment.name.display().to_string(), |m| m.display.clone());

        let Some(entity) = self.entities.get_mut(&id) else {
            return Err(CanonError::EntityNotFound { id: id.to_string() });
        };
        entity.observe(&mention.source_id, &mention.record_id, mention.observed_at);
        entity.aliases.insert(alias_display.clone());
        if !attachment.provisional
            && completeness(&alias_display) > completeness(&entity.canonical_name)
        {
            let previous = std::mem::replace(&mut entity.canonical_name, alias_display);
            tracing::debug!(
                target: "canon::store",
                entity = %id,
                from = %previous,
                to = %entity.canonical_name,
                "canonical name upgraded"
            );
        }
        Ok(())
    }

    /// Merge `absorbed` into `survivor`.
    ///
    /// Redirects every alias, unions counters, sources, records and the seen
    /// range, and writes a tombstone `absorbed -> survivor`. Both ids may be
    /// stale; they are resolved through tombstones first.
    pub fn merge_entities(
        &mut self,
        survivor: EntityId,
        absorbed: EntityId,
        note: Option<String>,
    ) -> Result<MergeRecord> {
        let survivor = self.resolve_id(survivor)?;
        let absorbed = self.resolve_id(absorbed)?;
        if survivor == absorbed {
            return Err(CanonError::InvalidMerge {
                reason: format!("{survivor} is already the same entity"),
            });
        }
        let snapshot = self.get_entity(absorbed)?.clone();
        let target = self.get_entity(survivor)?;
        let sources_before = target.sources.clone();
        let records_before = target.records.clone();

        let mut moved = Vec::new();
        for key in self.registry.aliases_of(absorbed) {
            if let Some(before) = self.registry.reassign(&key, survivor, AliasProvenance::Merge) {
                moved.push(before);
            }
        }
        self.entities.remove(&absorbed);
        if let Some(target) = self.entities.get_mut(&survivor) {
            target.mention_count += snapshot.mention_count;
            target.sources.extend(snapshot.sources.iter().cloned());
            target.records.extend(snapshot.records.iter().cloned());
            target.aliases.extend(snapshot.aliases.iter().cloned());
            target.first_seen = min_opt(target.first_seen, snapshot.first_seen);
            target.last_seen = max_opt(target.last_seen, snapshot.last_seen);
        }
        self.tombstones.insert(absorbed, survivor);

        let record = MergeRecord {
            seq: self.merges.len() as u64 + 1,
            survivor,
            absorbed,
            note,
            moved_aliases: moved,
            absorbed_snapshot: snapshot,
            survivor_sources_before: sources_before,
            survivor_records_before: records_before,
            reverted: false,
        };
        tracing::info!(
            target: "canon::store",
            seq = record.seq,
            survivor = %survivor,
            absorbed = %absorbed,
            aliases = record.moved_aliases.len(),
            "entities merged"
        );
        self.merges.push(record.clone());
        Ok(record)
    }

    /// Reverse merge `seq`.
    ///
    /// The absorbed entity comes back with its aliases (those still owned by
    /// the survivor), plus any mentions that arrived through them since. The
    /// survivor must still be live and the tombstone must still point at it.
    pub fn unmerge(&mut self, seq: u64) -> Result<EntityId> {
        let idx = self
            .merges
            .iter()
            .position(|m| m.seq == seq)
            .ok_or(CanonError::MergeNotFound { seq })?;
        let record = self.merges[idx].clone();
        if record.reverted {
            return Err(CanonError::InvalidMerge {
                reason: format!("merge #{seq} was already reverted"),
            });
        }
        if !self.entities.contains_key(&record.survivor) {
            return Err(CanonError::InvalidMerge {
                reason: format!(
                    "survivor {} of merge #{seq} was merged away since; reverse that merge first",
                    record.survivor
                ),
            });
        }
        if self.tombstones.get(&record.absorbed) != Some(&record.survivor) {
            return Err(CanonError::InvalidMerge {
                reason: format!("tombstone of {} no longer points at {}", record.absorbed, record.survivor),
            });
        }

        let mut restored = record.absorbed_snapshot.clone();
        let mut arrived_since = 0u64;
        for mapping in &record.moved_aliases {
            let Some(current) = self.registry.mapping(&mapping.key) else {
                continue;
            };
            if current.entity != record.survivor {
                continue;
            }
            arrived_since += current.mentions.saturating_sub(mapping.mentions);
            self.registry.restore(mapping.clone());
        }
        restored.mention_count += arrived_since;
        self.tombstones.remove(&record.absorbed);

        let absorbed_only_sources: BTreeSet<String> = restored
            .sources
            .difference(&record.survivor_sources_before)
            .cloned()
            .collect();
        let absorbed_only_records: BTreeSet<String> = restored
            .records
            .difference(&record.survivor_records_before)
            .cloned()
            .collect();
        if let Some(survivor) = self.entities.get_mut(&record.survivor) {
            survivor.mention_count = survivor.mention_count.saturating_sub(restored.mention_count);
            survivor.sources.retain(|s| !absorbed_only_sources.contains(s));
            survivor.records.retain(|r| !absorbed_only_records.contains(r));
        }
        self.entities.insert(record.absorbed, restored);
        self.sync_aliases(record.survivor);
        self.sync_aliases(record.absorbed);
        self.merges[idx].reverted = true;

        tracing::info!(
            target: "canon::store",
            seq,
            survivor = %record.survivor,
            restored = %record.absorbed,
            "merge reverted"
        );
        Ok(record.absorbed)
    }

    /// Move alias `key` out of its entity into a fresh entity of its own.
    ///
    /// The mentions counted through the alias move with it. An entity's
    /// canonical key cannot be split off.
    pub fn split_alias(&mut self, key: &str) -> Result<EntityId> {
        let mapping = self
            .registry
            .mapping(key)
            .cloned()
            .ok_or_else(|| CanonError::NotFound { query: key.to_string() })?;
        let owner = self.get_entity(mapping.entity)?;
        if owner.canonical_key == key {
            return Err(CanonError::InvalidMerge {
                reason: format!("{key:?} is the canonical alias of {}", owner.id),
            });
        }
        let owner_id = owner.id;
        let id = self.fresh_id(key);
        self.registry
            .reassign(key, id, AliasProvenance::ReviewSplit);
        self.entities.insert(
            id,
            Entity {
                id,
                canonical_name: mapping.display.clone(),
                canonical_key: key.to_string(),
                kind: classify(key),
                aliases: BTreeSet::from([mapping.display.clone()]),
                mention_count: mapping.mentions,
                sources: BTreeSet::new(),
                records: BTreeSet::new(),
                first_seen: None,
                last_seen: None,
            },
        );
        if let Some(owner) = self.entities.get_mut(&owner_id) {
            owner.mention_count = owner.mention_count.saturating_sub(mapping.mentions);
        }
        self.sync_aliases(owner_id);
        tracing::info!(
            target: "canon::store",
            alias = %key,
            from = %owner_id,
            to = %id,
            "alias split into new entity"
        );
        Ok(id)
    }

    /// Queue a review flag, returning its id. An identical open flag is
    /// reused rather than duplicated.
    pub(crate) fn raise_review(&mut self, mut flag: ReviewFlag) -> u64 {
        if let Some(existing) = self.reviews.iter().find(|f| {
            f.status == ReviewStatus::Open
                && f.kind == flag.kind
                && f.alias_key == flag.alias_key
                && f.entity == flag.entity
        }) {
            return existing.id;
        }
        flag.id = self.reviews.len() as u64 + 1;
        flag.status = ReviewStatus::Open;
        let id = flag.id;
        self.reviews.push(flag);
        id
    }

    /// Confirm a provisional attachment or a homonym hit.
    pub fn accept_review(&mut self, id: u64) -> Result<()> {
        let idx = self.open_review_index(id)?;
        let flag = self.reviews[idx].clone();
        let owner = self.resolve_id(flag.entity)?;
        if flag.kind == ReviewKind::AmbiguousMerge
            && self.registry.resolve(&flag.alias_key) == Some(owner)
        {
            self.registry.confirm(&flag.alias_key, 1.0);
            let display = self.registry.mapping(&flag.alias_key).map(|m| m.display.clone());
            if let (Some(display), Some(entity)) = (display, self.entities.get_mut(&owner)) {
                if completeness(&display) > completeness(&entity.canonical_name) {
                    entity.canonical_name = display;
                }
            }
        }
        self.reviews[idx].status = ReviewStatus::Accepted;
        tracing::info!(target: "canon::store", review = id, entity = %owner, "review accepted");
        Ok(())
    }

    /// Reject a flagged resolution and give the flagged observation an
    /// entity of its own. Returns the new entity's id.
    ///
    /// An ambiguous merge splits the provisional alias out. A homonym keeps
    /// the shared name with its owner; the observation moves to a new entity
    /// registered under the name qualified by its source.
    pub fn reject_review(&mut self, id: u64) -> Result<EntityId> {
        let idx = self.open_review_index(id)?;
        let flag = self.reviews[idx].clone();
        let split = match flag.kind {
            ReviewKind::AmbiguousMerge => {
                let split = self.split_alias(&flag.alias_key)?;
                if let Some(entity) = self.entities.get_mut(&split) {
                    if !flag.source_id.is_empty() {
                        entity.sources.insert(flag.source_id.clone());
                    }
                    if !flag.record_id.is_empty() {
                        entity.records.insert(flag.record_id.clone());
                    }
                    if let Some(ts) = flag.observed_at {
                        entity.first_seen = Some(ts);
                        entity.last_seen = Some(ts);
                    }
                }
                split
            }
            ReviewKind::PossibleHomonym => self.split_homonym(&flag)?,
        };
        self.reviews[idx].status = ReviewStatus::Rejected;
        tracing::info!(target: "canon::store", review = id, entity = %split, "review rejected");
        Ok(split)
    }

    fn split_homonym(&mut self, flag: &ReviewFlag) -> Result<EntityId> {
        let owner_id = self.resolve_id(flag.entity)?;
        let qualifier = [flag.source_id.as_str(), flag.record_id.as_str()]
            .into_iter()
            .find(|q| !q.is_empty())
            .unwrap_or("split");
        let mut name = normalize(&format!("{} ({qualifier})", flag.raw_name))?;
        let mut n = 1;
        while self.registry.resolve(name.key()).is_some() {
            n += 1;
            name = normalize(&format!("{} ({qualifier} {n})", flag.raw_name))?;
        }

        let id = self.fresh_id(&flag.alias_key);
        self.registry
            .register(name.key(), name.display(), id, AliasProvenance::ReviewSplit, 1.0)?;
        let mut entity = Entity {
            id,
            canonical_name: name.display().to_string(),
            canonical_key: name.key().to_string(),
            kind: classify(&flag.alias_key),
            aliases: BTreeSet::from([name.display().to_string()]),
            mention_count: 0,
            sources: BTreeSet::new(),
            records: BTreeSet::new(),
            first_seen: None,
            last_seen: None,
        };
        entity.observe(&flag.source_id, &flag.record_id, flag.observed_at);
        self.entities.insert(id, entity);

        self.registry.unobserve(&flag.alias_key);
        if let Some(owner) = self.entities.get_mut(&owner_id) {
            owner.mention_count = owner.mention_count.saturating_sub(1);
            owner.sources.remove(&flag.source_id);
            owner.records.remove(&flag.record_id);
            if flag.observed_at.is_some() {
                if owner.first_seen == flag.observed_at {
                    owner.first_seen = flag.prior_first_seen;
                }
                if owner.last_seen == flag.observed_at {
                    owner.last_seen = flag.prior_last_seen;
                }
            }
        }
        tracing::info!(
            target: "canon::store",
            alias = %flag.alias_key,
            from = %owner_id,
            to = %id,
            qualified = %name.key(),
            "homonym split into new entity"
        );
        Ok(id)
    }

    /// Check store-wide invariants.
    pub fn verify(&self) -> Result<()> {
        let violation = |reason: String| Err(CanonError::InvariantViolation { reason });

        for mapping in self.registry.iter() {
            if !self.entities.contains_key(&mapping.entity) {
                return violation(format!(
                    "alias {:?} points at non-live entity {}",
                    mapping.key, mapping.entity
                ));
            }
        }
        for entity in self.entities.values() {
            if self.registry.resolve(&entity.canonical_key) != Some(entity.id) {
                return violation(format!(
                    "canonical key {:?} is not owned by {}",
                    entity.canonical_key, entity.id
                ));
            }
            if !entity.aliases.contains(&entity.canonical_name) {
                return violation(format!(
                    "canonical name {:?} missing from aliases of {}",
                    entity.canonical_name, entity.id
                ));
            }
            let displays: BTreeSet<&str> = self
                .registry
                .mappings_of(entity.id)
                .map(|m| m.display.as_str())
                .collect();
            if entity.aliases.iter().any(|a| !displays.contains(a.as_str())) {
                return violation(format!("alias view of {} is out of sync", entity.id));
            }
        }
        for (absorbed, _) in self.tombstones() {
            if self.entities.contains_key(&absorbed) {
                return violation(format!("{absorbed} is both live and tombstoned"));
            }
            self.resolve_id(absorbed)?;
        }
        Ok(())
    }

    /// Rebuild derived indexes after decoding.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.registry.rebuild_indexes();
    }

    fn open_review_index(&self, id: u64) -> Result<usize> {
        self.reviews
            .iter()
            .position(|f| f.id == id && f.status == ReviewStatus::Open)
            .ok_or(CanonError::ReviewNotFound { id })
    }

    fn fresh_id(&self, key: &str) -> EntityId {
        let mut salt = 0u32;
        loop {
            let id = EntityId::derive(key, salt);
            if !self.entities.contains_key(&id) && !self.tombstones.contains_key(&id) {
                return id;
            }
            salt += 1;
        }
    }

    /// Re-derive an entity's alias view from the registry and fall back to the
    /// canonical key's display when the canonical name left with an alias.
    fn sync_aliases(&mut self, id: EntityId) {
        let displays: BTreeSet<String> = self
            .registry
            .mappings_of(id)
            .map(|m| m.display.clone())
            .collect();
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if !displays.contains(&entity.canonical_name) {
            if let Some(mapping) = self.registry.mapping(&entity.canonical_key) {
                entity.canonical_name = mapping.display.clone();
            }
        }
        entity.aliases = displays;
    }
}

/// How complete a display name is: full-length tokens first, then letters.
fn completeness(display: &str) -> (usize, usize) {
    let full = display
        .split([' ', ','])
        .filter(|t| t.trim_matches('.').chars().count() >= 3)
        .count();
    let letters = display.chars().filter(|c| c.is_alphanumeric()).count();
    (full, letters)
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}
