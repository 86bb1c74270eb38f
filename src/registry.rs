//! Alias registry: normalized key → canonical entity.
//!
//! The registry is the only owner of alias ownership. Public registration
//! refuses to move a key between entities; the store reassigns keys through
//! crate-private methods when it merges, unmerges or splits.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CanonError, Result};
use crate::types::{AliasMapping, AliasProvenance, EntityId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasRegistry {
    mappings: BTreeMap<String, AliasMapping>,
    #[serde(skip)]
    by_entity: HashMap<EntityId, BTreeSet<String>>,
    #[serde(skip)]
    by_token: HashMap<String, BTreeSet<EntityId>>,
}

impl AliasRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact lookup by normalized key.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<EntityId> {
        self.mappings.get(key).map(|m| m.entity)
    }

    #[must_use]
    pub fn mapping(&self, key: &str) -> Option<&AliasMapping> {
        self.mappings.get(key)
    }

    /// Record that `key` was observed for `entity`.
    ///
    /// A new key is created with one mention; a key already owned by `entity`
    /// has its mention counter bumped. A key owned by any other entity is an
    /// [`CanonError::AliasConflict`] and leaves the registry untouched.
    pub fn register(
        &mut self,
        key: &str,
        display: &str,
        entity: EntityId,
        provenance: AliasProvenance,
        confidence: f32,
    ) -> Result<()> {
        if let Some(existing) = self.mappings.get_mut(key) {
            if existing.entity != entity {
                return Err(CanonError::AliasConflict {
                    alias: key.to_string(),
                    existing: existing.entity,
                    attempted: entity,
                });
            }
            existing.mentions += 1;
            return Ok(());
        }
        self.insert(AliasMapping {
            key: key.to_string(),
            display: display.to_string(),
            entity,
            provenance,
            confidence,
            mentions: 1,
        });
        Ok(())
    }

    /// Normalized keys owned by `entity`.
    #[must_use]
    pub fn aliases_of(&self, entity: EntityId) -> BTreeSet<String> {
        self.by_entity.get(&entity).cloned().unwrap_or_default()
    }

    /// Mappings owned by `entity`, ordered by key.
    pub fn mappings_of(&self, entity: EntityId) -> impl Iterator<Item = &AliasMapping> + '_ {
        self.by_entity
            .get(&entity)
            .into_iter()
            .flatten()
            .filter_map(|key| self.mappings.get(key))
    }

    /// Entities owning at least one alias that contains `token`.
    pub fn entities_with_token(&self, token: &str) -> impl Iterator<Item = EntityId> + '_ {
        self.by_token.get(token).into_iter().flatten().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasMapping> + '_ {
        self.mappings.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Move `key` to `entity`, returning the mapping as it was before.
    pub(crate) fn reassign(
        &mut self,
        key: &str,
        entity: EntityId,
        provenance: AliasProvenance,
    ) -> Option<AliasMapping> {
        let mut mapping = self.remove(key)?;
        let before = mapping.clone();
        mapping.entity = entity;
        mapping.provenance = provenance;
        self.insert(mapping);
        Some(before)
    }

    /// Put a previously captured mapping back, keeping the current mention
    /// counter when the key still exists.
    pub(crate) fn restore(&mut self, mut mapping: AliasMapping) {
        if let Some(current) = self.remove(&mapping.key) {
            mapping.mentions = current.mentions;
        }
        self.insert(mapping);
    }

    /// Take one observation back off `key`.
    pub(crate) fn unobserve(&mut self, key: &str) {
        if let Some(mapping) = self.mappings.get_mut(key) {
            mapping.mentions = mapping.mentions.saturating_sub(1);
        }
    }

    pub(crate) fn confirm(&mut self, key: &str, confidence: f32) {
        if let Some(mapping) = self.mappings.get_mut(key) {
            mapping.confidence = confidence;
        }
    }

    /// Rebuild the derived indexes after deserialization.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.by_entity.clear();
        self.by_token.clear();
        let mappings: Vec<(String, EntityId)> = self
            .mappings
            .values()
            .map(|m| (m.key.clone(), m.entity))
            .collect();
        for (key, entity) in mappings {
            self.index(&key, entity);
        }
    }

    fn insert(&mut self, mapping: AliasMapping) {
        self.index(&mapping.key, mapping.entity);
        self.mappings.insert(mapping.key.clone(), mapping);
    }

    fn remove(&mut self, key: &str) -> Option<AliasMapping> {
        let mapping = self.mappings.remove(key)?;
        if let Some(keys) = self.by_entity.get_mut(&mapping.entity) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_entity.remove(&mapping.entity);
            }
        }
        let still_owned: BTreeSet<&str> = self
            .by_entity
            .get(&mapping.entity)
            .into_iter()
            .flatten()
            .flat_map(|k| key_tokens(k))
            .collect();
        for token in key_tokens(key) {
            if still_owned.contains(token) {
                continue;
            }
            if let Some(ids) = self.by_token.get_mut(token) {
                ids.remove(&mapping.entity);
                if ids.is_empty() {
                    self.by_token.remove(token);
                }
            }
        }
        Some(mapping)
    }

    fn index(&mut self, key: &str, entity: EntityId) {
        self.by_entity
            .entry(entity)
            .or_default()
            .insert(key.to_string());
        for token in key_tokens(key) {
            self.by_token
                .entry(token.to_string())
                .or_default()
                .insert(entity);
        }
    }
}

fn key_tokens(key: &str) -> impl Iterator<Item = &str> {
    key.split(',').flat_map(str::split_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> EntityId {
        EntityId::from_raw(n)
    }

    #[test]
    fn register_bumps_same_owner_and_rejects_other() {
        let mut registry = AliasRegistry::new();
        registry
            .register("epstein, jeffrey", "Epstein, Jeffrey", id(1), AliasProvenance::Observed, 1.0)
            .expect("register");
        registry
            .register("epstein, jeffrey", "EPSTEIN, JEFFREY", id(1), AliasProvenance::Observed, 1.0)
            .expect("same owner");
        let mapping = registry.mapping("epstein, jeffrey").expect("mapping");
        assert_eq!(mapping.mentions, 2);
        assert_eq!(mapping.display, "Epstein, Jeffrey");

        let err = registry
            .register("epstein, jeffrey", "Epstein, Jeffrey", id(2), AliasProvenance::Manual, 1.0)
            .expect_err("conflict");
        match err {
            CanonError::AliasConflict { existing, attempted, .. } => {
                assert_eq!(existing, id(1));
                assert_eq!(attempted, id(2));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(registry.resolve("epstein, jeffrey"), Some(id(1)));
    }

    #[test]
    fn reverse_and_token_lookup_follow_reassignment() {
        let mut registry = AliasRegistry::new();
        registry
            .register("ghislaine maxwell", "Ghislaine Maxwell", id(1), AliasProvenance::Observed, 1.0)
            .expect("register");
        registry
            .register("maxwell, g", "Maxwell, G", id(2), AliasProvenance::Observed, 1.0)
            .expect("register");

        let holders: BTreeSet<EntityId> = registry.entities_with_token("maxwell").collect();
        assert_eq!(holders, BTreeSet::from([id(1), id(2)]));

        registry.reassign("maxwell, g", id(1), AliasProvenance::Merge);
        assert_eq!(registry.aliases_of(id(1)).len(), 2);
        assert!(registry.aliases_of(id(2)).is_empty());
        let holders: BTreeSet<EntityId> = registry.entities_with_token("maxwell").collect();
        assert_eq!(holders, BTreeSet::from([id(1)]));
        assert_eq!(registry.entities_with_token("g").collect::<Vec<_>>(), vec![id(1)]);
    }

    #[test]
    fn indexes_rebuild_after_decode() {
        let mut registry = AliasRegistry::new();
        registry
            .register("sarah kellen", "Sarah Kellen", id(7), AliasProvenance::Observed, 1.0)
            .expect("register");
        let json = serde_json::to_string(&registry).expect("encode");
        let mut decoded: AliasRegistry = serde_json::from_str(&json).expect("decode");
        assert!(decoded.aliases_of(id(7)).is_empty());
        decoded.rebuild_indexes();
        assert_eq!(decoded.aliases_of(id(7)).len(), 1);
        assert_eq!(decoded.entities_with_token("kellen").collect::<Vec<_>>(), vec![id(7)]);
    }
}
