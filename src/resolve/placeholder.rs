//! Placeholder detection: role words and anonymous counters that must never
//! become entities.

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::text::fold;

const ROLE_PATTERN: &str = r"(?x)^
    (?:the\s+|an?\s+)?
    (?:\d+\s+)?
    (?:
        driver | nanny | pilot | co-?pilot | captain | crew | crew\s+member
      | flight\s+attendant | stewardess | steward | passenger | guest | assistant
      | female | male | woman | man | women | men | girl | boy | baby | child | infant
      | unknown | unidentified | unnamed | n/?a | none | tbd | \?+
    )s?
    (?:\s*[\(\[\#]?\s*\d+\s*[\)\]]?)?
$";

const COUNTER_PATTERN: &str = r"\s*[(\[#]?\s*\d+\s*[)\]]?$";

/// Matches normalized keys against the built-in role list plus configured
/// extra terms.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderFilter {
    extra: BTreeSet<String>,
}

impl PlaceholderFilter {
    pub fn new<I, S>(extra_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra = extra_terms
            .into_iter()
            .map(|t| fold(t.as_ref().trim()))
            .filter(|t| !t.is_empty())
            .collect();
        Self { extra }
    }

    /// True when `key` is a placeholder rather than a name.
    #[must_use]
    pub fn is_placeholder(&self, key: &str) -> bool {
        if let Some(role) = regex(&ROLE, ROLE_PATTERN) {
            if role.is_match(key) {
                return true;
            }
        }
        if self.extra.is_empty() {
            return false;
        }
        if self.extra.contains(key) {
            return true;
        }
        regex(&COUNTER, COUNTER_PATTERN)
            .map(|counter| counter.replace(key, ""))
            .is_some_and(|stripped| self.extra.contains(stripped.trim()))
    }
}

static ROLE: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
static COUNTER: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();

fn regex(
    cell: &'static OnceCell<std::result::Result<Regex, String>>,
    pattern: &str,
) -> Option<&'static Regex> {
    let compiled = cell.get_or_init(|| Regex::new(pattern).map_err(|err| err.to_string()));
    match compiled {
        Ok(re) => Some(re),
        Err(msg) => {
            tracing::error!(target: "canon::resolve", error = %msg, "placeholder regex init failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::normalize;

    fn key(raw: &str) -> String {
        normalize(raw).expect("normalize").key().to_string()
    }

    #[test]
    fn role_words_and_counters_are_placeholders() {
        let filter = PlaceholderFilter::default();
        for raw in [
            "Female (1)",
            "FEMALE 2",
            "Male",
            "Driver",
            "Nanny",
            "1 Female",
            "Co-Pilot",
            "Pilot #2",
            "Unknown",
            "?",
            "N/A",
        ] {
            assert!(filter.is_placeholder(&key(raw)), "{raw}");
        }
    }

    #[test]
    fn real_names_are_not_placeholders() {
        let filter = PlaceholderFilter::default();
        for raw in ["Ghislaine Maxwell", "Epstein, Jeffrey", "Driver, Minnie", "Mandy"] {
            assert!(!filter.is_placeholder(&key(raw)), "{raw}");
        }
    }

    #[test]
    fn extra_terms_extend_the_list() {
        let filter = PlaceholderFilter::new(["Bodyguard"]);
        assert!(filter.is_placeholder(&key("bodyguard")));
        assert!(filter.is_placeholder(&key("Bodyguard (3)")));
        assert!(!filter.is_placeholder(&key("Bodyguard Smith")));
    }
}
