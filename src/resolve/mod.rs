//! Disambiguator: maps one mention to a canonical entity.
//!
//! Order of evaluation: normalize, placeholder check, exact alias hit,
//! scored candidates, new entity. Every non-exact decision is logged with the
//! features that drove it.

pub mod candidates;
mod placeholder;

pub use candidates::Candidate;
pub use placeholder::PlaceholderFilter;

use crate::constants::SCORE_EPSILON;
use crate::error::Result;
use crate::store::{Attachment, EntityStore};
use crate::text::{NormalizedKey, normalize};
use crate::types::{
    AliasProvenance, Decision, DecisionRecord, EntityId, EntityKind, Mention, ResolverOptions,
    ReviewFlag, ReviewKind, ReviewStatus,
};

/// Result of resolving one mention to an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entity_id: EntityId,
    pub is_new_entity: bool,
    /// Existing entity the mention was fuzzily attached to, for auto and
    /// provisional merges.
    pub merged_with: Option<EntityId>,
    pub decision: Decision,
    pub key: String,
    pub score: Option<f32>,
    pub features: Vec<String>,
    pub runner_up: Option<EntityId>,
    /// Review flag raised by this resolution, if any.
    pub review: Option<u64>,
}

impl Resolution {
    #[must_use]
    pub fn to_record(&self, raw_name: &str) -> DecisionRecord {
        DecisionRecord {
            raw_name: raw_name.to_string(),
            key: self.key.clone(),
            entity: self.entity_id,
            decision: self.decision,
            score: self.score,
            features: self.features.clone(),
            runner_up: self.runner_up,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Resolved(Resolution),
    /// Placeholder routed to the discard bucket; carries the folded key.
    Discarded { key: String },
}

#[derive(Debug, Clone)]
pub struct Disambiguator {
    options: ResolverOptions,
    placeholders: PlaceholderFilter,
}

impl Default for Disambiguator {
    fn default() -> Self {
        Self::new(ResolverOptions::default())
    }
}

impl Disambiguator {
    #[must_use]
    pub fn new(options: ResolverOptions) -> Self {
        let placeholders = PlaceholderFilter::new(&options.placeholder_terms);
        Self {
            options,
            placeholders,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    #[must_use]
    pub fn is_placeholder(&self, name: &NormalizedKey) -> bool {
        self.placeholders.is_placeholder(name.key())
    }

    /// Resolve `mention` against `store`, mutating it.
    ///
    /// Fails with `MalformedMention` when the raw name normalizes to nothing;
    /// the store is untouched in that case.
    pub fn resolve(&self, store: &mut EntityStore, mention: &Mention) -> Result<Outcome> {
        let name = normalize(&mention.raw_name)?;
        if self.is_placeholder(&name) {
            tracing::debug!(
                target: "canon::resolve",
                raw = %mention.raw_name,
                key = %name.key(),
                "placeholder discarded"
            );
            return Ok(Outcome::Discarded {
                key: name.key().to_string(),
            });
        }

        if let Some(entity_id) = store.lookup(name.key()) {
            return self.resolve_exact(store, &name, mention, entity_id).map(Outcome::Resolved);
        }

        let candidates = candidates::generate(store, &name, mention, &self.options);
        let auto = self.options.auto_merge_threshold;
        let review = self.options.review_threshold;

        let mut clearing: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.score + SCORE_EPSILON >= auto)
            .collect();
        clearing.sort_by(|a, b| candidates::by_establishment(a, b));

        if let Some(winner) = clearing.first().copied() {
            let runner_up = clearing
                .get(1)
                .map(|c| c.entity)
                .or_else(|| candidates.iter().find(|c| c.entity != winner.entity).map(|c| c.entity));
            store.attach(
                Attachment {
                    entity: winner.entity,
                    name: &name,
                    provenance: winner.provenance,
                    confidence: winner.score,
                    provisional: false,
                },
                mention,
            )?;
            tracing::info!(
                target: "canon::resolve",
                raw = %mention.raw_name,
                entity = %winner.entity,
                score = winner.score,
                features = ?winner.features,
                runner_up = ?runner_up,
                "auto-merged mention"
            );
            return Ok(Outcome::Resolved(Resolution {
                entity_id: winner.entity,
                is_new_entity: false,
                merged_with: Some(winner.entity),
                decision: Decision::AutoMerge,
                key: name.key().to_string(),
                score: Some(winner.score),
                features: winner.features.clone(),
                runner_up,
                review: None,
            }));
        }

        if let Some(best) = candidates.first().filter(|c| c.score + SCORE_EPSILON >= review) {
            let runner_up = candidates.get(1).map(|c| c.entity);
            let prior = seen_range(store, best.entity)?;
            store.attach(
                Attachment {
                    entity: best.entity,
                    name: &name,
                    provenance: best.provenance,
                    confidence: best.score,
                    provisional: true,
                },
                mention,
            )?;
            let flag_id = store.raise_review(ReviewFlag {
                id: 0,
                kind: ReviewKind::AmbiguousMerge,
                raw_name: mention.raw_name.clone(),
                alias_key: name.key().to_string(),
                entity: best.entity,
                runner_up,
                score: best.score,
                features: best.features.clone(),
                source_id: mention.source_id.clone(),
                record_id: mention.record_id.clone(),
                observed_at: mention.observed_at,
                prior_first_seen: prior.0,
                prior_last_seen: prior.1,
                status: ReviewStatus::Open,
            });
            tracing::warn!(
                target: "canon::resolve",
                raw = %mention.raw_name,
                entity = %best.entity,
                score = best.score,
                features = ?best.features,
                review = flag_id,
                "ambiguous merge attached provisionally"
            );
            return Ok(Outcome::Resolved(Resolution {
                entity_id: best.entity,
                is_new_entity: false,
                merged_with: Some(best.entity),
                decision: Decision::ProvisionalMerge,
                key: name.key().to_string(),
                score: Some(best.score),
                features: best.features.clone(),
                runner_up,
                review: Some(flag_id),
            }));
        }

        let entity_id = store.create_entity(
            &name,
            &mention.source_id,
            &mention.record_id,
            mention.observed_at,
        )?;
        let closest = candidates.first();
        tracing::debug!(
            target: "canon::resolve",
            raw = %mention.raw_name,
            entity = %entity_id,
            closest = ?closest.map(|c| c.entity),
            closest_score = ?closest.map(|c| c.score),
            "created entity"
        );
        Ok(Outcome::Resolved(Resolution {
            entity_id,
            is_new_entity: true,
            merged_with: None,
            decision: Decision::NewEntity,
            key: name.key().to_string(),
            score: closest.map(|c| c.score),
            features: closest.map(|c| c.features.clone()).unwrap_or_default(),
            runner_up: closest.map(|c| c.entity),
            review: None,
        }))
    }

    fn resolve_exact(
        &self,
        store: &mut EntityStore,
        name: &NormalizedKey,
        mention: &Mention,
        entity_id: EntityId,
    ) -> Result<Resolution> {
        let homonym = self.homonym_distance(store, mention, entity_id)?;
        let prior = seen_range(store, entity_id)?;
        store.attach(
            Attachment {
                entity: entity_id,
                name,
                provenance: AliasProvenance::Observed,
                confidence: 1.0,
                provisional: false,
            },
            mention,
        )?;

        let mut review = None;
        let mut features = Vec::new();
        if let Some(distance) = homonym {
            features.push(format!("seen_distance_days={}", distance / 86_400));
            let flag_id = store.raise_review(ReviewFlag {
                id: 0,
                kind: ReviewKind::PossibleHomonym,
                raw_name: mention.raw_name.clone(),
                alias_key: name.key().to_string(),
                entity: entity_id,
                runner_up: None,
                score: 1.0,
                features: features.clone(),
                source_id: mention.source_id.clone(),
                record_id: mention.record_id.clone(),
                observed_at: mention.observed_at,
                prior_first_seen: prior.0,
                prior_last_seen: prior.1,
                status: ReviewStatus::Open,
            });
            tracing::warn!(
                target: "canon::resolve",
                raw = %mention.raw_name,
                entity = %entity_id,
                distance_days = distance / 86_400,
                review = flag_id,
                "possible homonym on exact alias hit"
            );
            review = Some(flag_id);
        }

        Ok(Resolution {
            entity_id,
            is_new_entity: false,
            merged_with: None,
            decision: Decision::ExactAlias,
            key: name.key().to_string(),
            score: None,
            features,
            runner_up: None,
            review,
        })
    }

    /// Seconds between the mention and the entity's observed range when the
    /// exact hit looks like a different person sharing the name.
    fn homonym_distance(
        &self,
        store: &EntityStore,
        mention: &Mention,
        entity_id: EntityId,
    ) -> Result<Option<i64>> {
        let Some(ts) = mention.observed_at else {
            return Ok(None);
        };
        let entity = store.get_entity(entity_id)?;
        if entity.kind != EntityKind::Person || entity.sources.contains(&mention.source_id) {
            return Ok(None);
        }
        Ok(entity
            .distance_from_seen(ts)
            .filter(|d| *d > self.options.homonym_window_secs()))
    }
}

fn seen_range(store: &EntityStore, id: EntityId) -> Result<(Option<i64>, Option<i64>)> {
    let entity = store.get_entity(id)?;
    Ok((entity.first_seen, entity.last_seen))
}
