//! Best-effort entity kind classification from the normalized key.
//!
//! Only consulted when an entity is created. The result is a hint for
//! consumers of the artifacts; it never influences resolution.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::EntityKind;

static ORGANIZATION: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?x)\b(
            inc | llc | llp | ltd | plc | corp | corporation | co | company | companies
          | foundation | trust | bank | group | holdings | partners | capital | fund
          | university | college | institute | school | academy
          | associates | airlines? | aviation | agency | department | office
          | church | society | club | council | committee | ministry
        )\b",
    )
    .ok()
});

static LOCATION: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?x)\b(
            island | islands | isle | airport | ranch | estate | beach | bay
          | street | avenue | ave | road | rd | boulevard | blvd
          | county | city | state | republic | kingdom
          | mountain | lake | river | harbor | harbour | port
        )\b",
    )
    .ok()
});

/// Classify a normalized, case-folded key.
#[must_use]
pub fn classify(key: &str) -> EntityKind {
    if ORGANIZATION.as_ref().is_some_and(|re| re.is_match(key)) {
        return EntityKind::Organization;
    }
    if LOCATION.as_ref().is_some_and(|re| re.is_match(key)) {
        return EntityKind::Location;
    }
    EntityKind::Person
}
