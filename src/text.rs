//! Mention normalization.
//!
//! [`normalize`] turns a raw, possibly OCR-garbled name into a display form
//! (original casing kept) and a case/diacritic-folded comparison key. It never
//! guesses name order; that ambiguity is left to the disambiguator, which uses
//! [`NormalizedKey::name_parts`] and [`NormalizedKey::token_signature`].

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::{CanonError, Result};

/// A normalized mention: display form plus folded comparison key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    display: String,
    key: String,
}

impl NormalizedKey {
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key tokens with comma structure removed.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.key
            .split(',')
            .flat_map(str::split_whitespace)
            .filter(|t| !t.is_empty())
    }

    /// Order-insensitive signature: sorted key tokens joined by a space.
    /// `"Maxwell, Ghislaine"` and `"Ghislaine Maxwell"` share a signature.
    #[must_use]
    pub fn token_signature(&self) -> String {
        let mut tokens: Vec<&str> = self.tokens().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    }

    #[must_use]
    pub fn name_parts(&self) -> NameParts {
        NameParts::from_key(&self.key)
    }
}

/// Surname/given split of a normalized key.
///
/// A comma means surname-first (`"epstein, jeffrey"`); otherwise the last
/// token is taken as the surname. A single token has no surname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub surname: Option<String>,
    pub given: Vec<String>,
    pub surname_first: bool,
}

impl NameParts {
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        let segments: Vec<&str> = key.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        if segments.len() >= 2 {
            let surname: Vec<&str> = segments[0].split_whitespace().collect();
            let given: Vec<String> = segments[1..]
                .iter()
                .flat_map(|s| s.split_whitespace())
                .map(str::to_string)
                .collect();
            return Self {
                surname: Some(surname.join(" ")),
                given,
                surname_first: true,
            };
        }

        let mut tokens: Vec<String> = key.split_whitespace().map(str::to_string).collect();
        if tokens.len() <= 1 {
            return Self {
                surname: None,
                given: tokens,
                surname_first: false,
            };
        }
        let surname = tokens.pop();
        Self {
            surname,
            given: tokens,
            surname_first: false,
        }
    }

    #[must_use]
    pub fn is_single_token(&self) -> bool {
        self.surname.is_none() && self.given.len() == 1
    }

    #[must_use]
    pub fn first_given(&self) -> Option<&str> {
        self.given.first().map(String::as_str)
    }

    #[must_use]
    pub fn given_joined(&self) -> String {
        self.given.join(" ")
    }
}

/// Normalize a raw mention.
///
/// Steps, in order: map whitespace and control characters to spaces, trim,
/// split on commas dropping empty segments (repairs `"Last,First"`,
/// `"Last, , First"` and stray trailing commas), collapse whitespace runs and
/// immediately repeated tokens inside each segment (OCR stutter such as
/// `"Je           Je Epstein"`), and rejoin segments with `", "`.
///
/// Idempotent: `normalize(normalize(x)?.display())? == normalize(x)?`.
pub fn normalize(raw: &str) -> Result<NormalizedKey> {
    let spaced: String = raw
        .chars()
        .map(|c| if c.is_whitespace() || c.is_control() { ' ' } else { c })
        .collect();

    let segments: Vec<String> = spaced
        .split(',')
        .map(collapse_segment)
        .filter(|s| !s.is_empty())
        .collect();
    let display = segments.join(", ");
    if display.is_empty() {
        return Err(CanonError::MalformedMention {
            raw: raw.to_string(),
            reason: "empty after normalization",
        });
    }

    let key = fold_key(&display);
    if key.is_empty() {
        return Err(CanonError::MalformedMention {
            raw: raw.to_string(),
            reason: "no name characters",
        });
    }
    Ok(NormalizedKey { display, key })
}

/// Case- and diacritic-fold a single token or phrase.
#[must_use]
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn collapse_segment(segment: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut last_folded = String::new();
    for token in segment.split_whitespace() {
        let folded = fold(token);
        if !kept.is_empty() && folded == last_folded {
            continue;
        }
        kept.push(token);
        last_folded = folded;
    }
    kept.join(" ")
}

fn fold_key(display: &str) -> String {
    display
        .split(',')
        .map(|segment| {
            segment
                .split_whitespace()
                .map(|token| fold(token).replace('.', ""))
                .filter(|token| !token.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(raw: &str) -> String {
        normalize(raw).expect("normalize").display().to_string()
    }

    #[test]
    fn repairs_comma_spacing() {
        assert_eq!(display("Epstein,Jeffrey"), "Epstein, Jeffrey");
        assert_eq!(display("Epstein, , Jeffrey"), "Epstein, Jeffrey");
        assert_eq!(display("Epstein , Jeffrey,"), "Epstein, Jeffrey");
        assert_eq!(display(",Maxwell"), "Maxwell");
    }

    #[test]
    fn collapses_ocr_whitespace_and_stutter() {
        assert_eq!(display("  Je           Je Epstein "), "Je Epstein");
        assert_eq!(display("Je Je Epstein"), "Je Epstein");
        assert_eq!(display("je JE\tEpstein"), "je Epstein");
        assert_eq!(display("Sarah\u{00a0}\u{00a0}Kellen"), "Sarah Kellen");
    }

    #[test]
    fn key_is_folded_display_is_not() {
        let n = normalize("José  MARTÍNEZ").expect("normalize");
        assert_eq!(n.display(), "José MARTÍNEZ");
        assert_eq!(n.key(), "jose martinez");

        let dotted = normalize("J. Epstein").expect("normalize");
        assert_eq!(dotted.key(), normalize("j epstein").expect("n").key());
    }

    #[test]
    fn empty_input_is_malformed() {
        for raw in ["", "   ", " , ,", "\t\n"] {
            let err = normalize(raw).expect_err("malformed");
            assert!(matches!(err, CanonError::MalformedMention { .. }), "{raw:?}");
        }
        assert!(normalize(".").is_err());
    }

    #[test]
    fn name_parts_respect_comma_order() {
        let swapped = normalize("Maxwell, Ghislaine").expect("n").name_parts();
        assert_eq!(swapped.surname.as_deref(), Some("maxwell"));
        assert_eq!(swapped.given, vec!["ghislaine".to_string()]);
        assert!(swapped.surname_first);

        let natural = normalize("Ghislaine Maxwell").expect("n").name_parts();
        assert_eq!(natural.surname.as_deref(), Some("maxwell"));
        assert_eq!(natural.given, vec!["ghislaine".to_string()]);

        let single = normalize("Ghislaine").expect("n").name_parts();
        assert!(single.is_single_token());
    }

    #[test]
    fn signature_is_order_insensitive() {
        let a = normalize("Maxwell, Ghislaine").expect("n");
        let b = normalize("ghislaine   maxwell").expect("n");
        assert_eq!(a.token_signature(), b.token_signature());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn normalization_is_idempotent_on_corrupted_input() {
        let alphabet: Vec<char> = "abcJEe ,,  \t.\u{00a0}éÉ".chars().collect();
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..2_000 {
            let len = rng.usize(0..24);
            let raw: String = (0..len)
                .map(|_| alphabet[rng.usize(0..alphabet.len())])
                .collect();
            let Ok(once) = normalize(&raw) else {
                continue;
            };
            let twice = normalize(once.display()).expect("normalized text stays valid");
            assert_eq!(once, twice, "raw input {raw:?}");
        }
    }
}
