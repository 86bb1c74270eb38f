//! Candidate generation and scoring for mentions without an exact alias hit.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::store::EntityStore;
use crate::text::{NameParts, NormalizedKey};
use crate::types::{AliasProvenance, EntityId, Mention, ResolverOptions};

/// How a mention relates to one existing alias key, before source overlap.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AliasMatch {
    pub base: f32,
    pub provenance: AliasProvenance,
    pub feature: String,
    /// Only counts when the mention shares a source or record with the entity.
    pub requires_overlap: bool,
}

/// A scored candidate entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entity: EntityId,
    pub score: f32,
    pub mention_count: u64,
    pub matched_alias: String,
    pub provenance: AliasProvenance,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closeness {
    Equal,
    Edit(usize),
    Prefix,
    Initial,
    Different,
}

/// Collect and score every entity sharing at least one token with `name`.
///
/// Candidates are returned best first: score descending, then mention count
/// descending, then id ascending.
pub(crate) fn generate(
    store: &EntityStore,
    name: &NormalizedKey,
    mention: &Mention,
    options: &ResolverOptions,
) -> Vec<Candidate> {
    let registry = store.registry();
    let pool: BTreeSet<EntityId> = name
        .tokens()
        .flat_map(|token| registry.entities_with_token(token))
        .collect();
    let parts = name.name_parts();
    let weights = &options.weights;

    let mut out = Vec::new();
    for entity_id in pool {
        let Some(entity) = store.live(entity_id) else {
            continue;
        };
        let shared_record =
            !mention.record_id.is_empty() && entity.records.contains(&mention.record_id);
        let shared_source =
            !mention.source_id.is_empty() && entity.sources.contains(&mention.source_id);

        let mut best: Option<(AliasMatch, String)> = None;
        for mapping in registry.mappings_of(entity_id) {
            let Some(found) = score_alias(name, &parts, &mapping.key, options) else {
                continue;
            };
            if found.requires_overlap && !shared_record && !shared_source {
                continue;
            }
            if best.as_ref().is_none_or(|(b, _)| found.base > b.base) {
                best = Some((found, mapping.key.clone()));
            }
        }
        let Some((found, matched_alias)) = best else {
            continue;
        };

        let mut features = vec![found.feature];
        let mut adjust = 0.0;
        if shared_source {
            features.push("shared_source".to_string());
            adjust += weights.shared_source;
        }
        // The entity is already listed on this record under another name, so
        // the mention is a different person on the same list.
        if shared_record {
            features.push("co_listed".to_string());
            adjust -= weights.co_listed_penalty;
        }
        out.push(Candidate {
            entity: entity_id,
            score: (found.base + adjust).clamp(0.0, 1.0),
            mention_count: entity.mention_count,
            matched_alias,
            provenance: found.provenance,
            features,
        });
    }
    out.sort_by(by_score);
    out
}

pub(crate) fn by_score(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.mention_count.cmp(&a.mention_count))
        .then_with(|| a.entity.cmp(&b.entity))
}

/// Tie-break among candidates that all cleared the auto-merge threshold: the
/// more established entity wins.
pub(crate) fn by_establishment(a: &Candidate, b: &Candidate) -> Ordering {
    b.mention_count
        .cmp(&a.mention_count)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.entity.cmp(&b.entity))
}

/// Score `name` against one alias key. `None` means the alias is not a
/// plausible variant.
pub(crate) fn score_alias(
    name: &NormalizedKey,
    parts: &NameParts,
    alias_key: &str,
    options: &ResolverOptions,
) -> Option<AliasMatch> {
    let weights = &options.weights;
    if alias_key == name.key() {
        return None;
    }
    if strip_punctuation(alias_key) == strip_punctuation(name.key()) {
        return Some(AliasMatch {
            base: weights.punctuation,
            provenance: AliasProvenance::Punctuation,
            feature: "punctuation".into(),
            requires_overlap: false,
        });
    }
    if signature(alias_key) == name.token_signature() {
        return Some(AliasMatch {
            base: weights.order_swap,
            provenance: AliasProvenance::NameOrderSwap,
            feature: "order_swap".into(),
            requires_overlap: false,
        });
    }

    let other = NameParts::from_key(alias_key);
    if parts.is_single_token() || other.is_single_token() {
        return containment(parts, &other, options);
    }

    let (Some(surname), Some(other_surname)) = (&parts.surname, &other.surname) else {
        return None;
    };
    let (Some(given), Some(other_given)) = (parts.first_given(), other.first_given()) else {
        return None;
    };
    let surname_rel = closeness(surname, other_surname, options);
    let given_rel = closeness(given, other_given, options);

    let edit_score = |d: usize| weights.edit_base - weights.edit_step * (d.saturating_sub(1)) as f32;
    match (surname_rel, given_rel) {
        (Closeness::Equal, Closeness::Equal) => Some(AliasMatch {
            base: weights.prefix,
            provenance: AliasProvenance::FuzzyMatch,
            feature: "middle_name".into(),
            requires_overlap: false,
        }),
        (Closeness::Equal, Closeness::Edit(d)) | (Closeness::Edit(d), Closeness::Equal) => {
            Some(AliasMatch {
                base: edit_score(d),
                provenance: AliasProvenance::OcrRepair,
                feature: format!("edit_distance={d}"),
                requires_overlap: false,
            })
        }
        (Closeness::Equal, Closeness::Prefix) => Some(AliasMatch {
            base: weights.prefix,
            provenance: AliasProvenance::OcrRepair,
            feature: "given_prefix".into(),
            requires_overlap: false,
        }),
        (Closeness::Equal, Closeness::Initial) => Some(AliasMatch {
            base: weights.initial,
            provenance: AliasProvenance::FuzzyMatch,
            feature: "given_initial".into(),
            requires_overlap: false,
        }),
        // Same given name, surnames within the raw edit window but too far
        // apart for the length-scaled one.
        (Closeness::Different, Closeness::Equal) => {
            let d = strsim::osa_distance(surname, other_surname);
            (d <= options.max_edit_distance).then(|| AliasMatch {
                base: edit_score(d) - weights.surname_mismatch_penalty,
                provenance: AliasProvenance::FuzzyMatch,
                feature: format!("surname_mismatch={d}"),
                requires_overlap: false,
            })
        }
        _ => None,
    }
}

fn containment(parts: &NameParts, other: &NameParts, options: &ResolverOptions) -> Option<AliasMatch> {
    // Both single tokens and not equal: nothing to contain.
    if parts.is_single_token() && other.is_single_token() {
        return None;
    }
    let (single, multi) = if parts.is_single_token() {
        (parts, other)
    } else {
        (other, parts)
    };
    let token = single.first_given()?;
    let contained = multi.given.iter().any(|g| g == token)
        || multi
            .surname
            .as_deref()
            .is_some_and(|s| s.split_whitespace().any(|t| t == token));
    contained.then(|| AliasMatch {
        base: options.weights.containment,
        provenance: AliasProvenance::FuzzyMatch,
        feature: "single_token_containment".into(),
        requires_overlap: true,
    })
}

fn closeness(a: &str, b: &str, options: &ResolverOptions) -> Closeness {
    if a == b {
        return Closeness::Equal;
    }
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    if long.starts_with(short) {
        if short_len == 1 {
            return Closeness::Initial;
        }
        if short_len >= options.min_prefix_len {
            return Closeness::Prefix;
        }
    }
    let allowed = options.max_edit_distance.min(short_len / 3);
    let distance = strsim::osa_distance(a, b);
    if distance > 0 && distance <= allowed {
        return Closeness::Edit(distance);
    }
    Closeness::Different
}

fn strip_punctuation(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn signature(key: &str) -> String {
    let mut tokens: Vec<&str> = key.split(',').flat_map(str::split_whitespace).collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
