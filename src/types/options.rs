//! Tunable resolver options.
//!
//! Thresholds and weights are policy choices validated against the scenario
//! tests, not fixed constants. They can be built fluently or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AUTO_MERGE_THRESHOLD, DEFAULT_FUZZY_SEARCH_THRESHOLD, DEFAULT_HOMONYM_WINDOW_DAYS,
    DEFAULT_MAX_EDIT_DISTANCE, DEFAULT_MIN_PREFIX_LEN, DEFAULT_REVIEW_THRESHOLD,
};
use crate::error::{CanonError, Result};

/// Additive weights used when scoring a candidate match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub order_swap: f32,
    /// Keys equal once punctuation is ignored (`O'Brien` / `OBrien`).
    pub punctuation: f32,
    /// Base for a match whose surname or given name is one edit away;
    /// reduced by `edit_step` for every further edit.
    pub edit_base: f32,
    pub edit_step: f32,
    /// Given name is a truncation of the candidate's (at least
    /// `min_prefix_len` characters).
    pub prefix: f32,
    /// Given name is a bare initial of the candidate's.
    pub initial: f32,
    /// Single-token mention contained in a multi-token alias.
    pub containment: f32,
    pub shared_source: f32,
    /// Subtracted when the candidate already appears on the mention's record
    /// under a different alias.
    pub co_listed_penalty: f32,
    pub surname_mismatch_penalty: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            order_swap: 0.85,
            punctuation: 0.95,
            edit_base: 0.75,
            edit_step: 0.10,
            prefix: 0.70,
            initial: 0.60,
            containment: 0.45,
            shared_source: 0.15,
            co_listed_penalty: 0.40,
            surname_mismatch_penalty: 0.30,
        }
    }
}

/// Options controlling the disambiguator and query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Scores at or above this attach automatically.
    pub auto_merge_threshold: f32,
    /// Scores in `[review_threshold, auto_merge_threshold)` attach
    /// provisionally and raise a review flag.
    pub review_threshold: f32,
    pub max_edit_distance: usize,
    pub min_prefix_len: usize,
    /// Exact hits further than this from an entity's observed range, with no
    /// shared source, are flagged as possible homonyms.
    pub homonym_window_days: i64,
    /// Extra placeholder words on top of the built-in list.
    pub placeholder_terms: Vec<String>,
    /// Minimum Jaro-Winkler similarity for fuzzy query hits.
    pub fuzzy_search_threshold: f64,
    pub weights: ScoreWeights,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            auto_merge_threshold: DEFAULT_AUTO_MERGE_THRESHOLD,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            max_edit_distance: DEFAULT_MAX_EDIT_DISTANCE,
            min_prefix_len: DEFAULT_MIN_PREFIX_LEN,
            homonym_window_days: DEFAULT_HOMONYM_WINDOW_DAYS,
            placeholder_terms: Vec::new(),
            fuzzy_search_threshold: DEFAULT_FUZZY_SEARCH_THRESHOLD,
            weights: ScoreWeights::default(),
        }
    }
}

impl ResolverOptions {
    /// Start a fluent builder for `ResolverOptions`.
    #[must_use]
    pub fn builder() -> ResolverOptionsBuilder {
        ResolverOptionsBuilder::default()
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.auto_merge_threshold) || !in_unit(self.review_threshold) {
            return Err(CanonError::InvalidOptions {
                reason: "thresholds must lie in [0, 1]".into(),
            });
        }
        if self.review_threshold > self.auto_merge_threshold {
            return Err(CanonError::InvalidOptions {
                reason: "review_threshold must not exceed auto_merge_threshold".into(),
            });
        }
        if self.min_prefix_len == 0 {
            return Err(CanonError::InvalidOptions {
                reason: "min_prefix_len must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub(crate) fn homonym_window_secs(&self) -> i64 {
        self.homonym_window_days.saturating_mul(86_400)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolverOptionsBuilder {
    inner: ResolverOptions,
}

impl ResolverOptionsBuilder {
    #[must_use]
    pub fn auto_merge_threshold(mut self, value: f32) -> Self {
        self.inner.auto_merge_threshold = value;
        self
    }

    #[must_use]
    pub fn review_threshold(mut self, value: f32) -> Self {
        self.inner.review_threshold = value;
        self
    }

    #[must_use]
    pub fn max_edit_distance(mut self, value: usize) -> Self {
        self.inner.max_edit_distance = value;
        self
    }

    #[must_use]
    pub fn min_prefix_len(mut self, value: usize) -> Self {
        self.inner.min_prefix_len = value;
        self
    }

    #[must_use]
    pub fn homonym_window_days(mut self, days: i64) -> Self {
        self.inner.homonym_window_days = days;
        self
    }

    pub fn placeholder<S: Into<String>>(mut self, term: S) -> Self {
        self.inner.placeholder_terms.push(term.into());
        self
    }

    #[must_use]
    pub fn fuzzy_search_threshold(mut self, value: f64) -> Self {
        self.inner.fuzzy_search_threshold = value;
        self
    }

    #[must_use]
    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.inner.weights = weights;
        self
    }

    pub fn build(self) -> Result<ResolverOptions> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let options =
            ResolverOptions::from_json(r#"{"auto_merge_threshold": 0.9}"#).expect("parse");
        assert!((options.auto_merge_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(options.max_edit_distance, DEFAULT_MAX_EDIT_DISTANCE);
        assert_eq!(options.weights, ScoreWeights::default());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let err = ResolverOptions::builder()
            .auto_merge_threshold(0.5)
            .review_threshold(0.7)
            .build()
            .expect_err("inverted bands");
        assert!(matches!(err, CanonError::InvalidOptions { .. }));
    }
}
