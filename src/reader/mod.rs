//! Source reader traits and registry.
//!
//! Each source type has its own noise profile (quoted CSV cells, OCR'd
//! manifest blocks, pre-extracted records). A reader turns raw bytes into the
//! shared [`Mention`] and [`CoOccurrenceGroup`] shapes before anything enters
//! the resolution pipeline.

mod contact_list;
mod jsonl;
mod manifest;

pub use contact_list::ContactListReader;
pub use jsonl::JsonlReader;
pub use manifest::FlightManifestReader;

use chrono::NaiveDate;

use crate::error::{CanonError, Result};
use crate::types::{CoOccurrenceGroup, Mention};

/// Soft classification of source formats used by the reader registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    ContactList,
    FlightManifest,
    Jsonl,
}

impl SourceFormat {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ContactList => "contact_list",
            Self::FlightManifest => "flight_manifest",
            Self::Jsonl => "jsonl",
        }
    }
}

/// Hint provided to readers before probing/extraction.
#[derive(Debug, Clone)]
pub struct ReaderHint<'a> {
    /// Source identifier stamped on every mention.
    pub source_id: &'a str,
    pub format: Option<SourceFormat>,
    pub uri: Option<&'a str>,
}

impl<'a> ReaderHint<'a> {
    #[must_use]
    pub fn new(source_id: &'a str, format: Option<SourceFormat>) -> Self {
        Self {
            source_id,
            format,
            uri: None,
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: Option<&'a str>) -> Self {
        self.uri = uri;
        self
    }

    pub(crate) fn has_extension(&self, extensions: &[&str]) -> bool {
        self.uri.is_some_and(|uri| {
            let lower = uri.to_ascii_lowercase();
            extensions.iter().any(|ext| lower.ends_with(ext))
        })
    }
}

/// Mentions and groups extracted from one source, plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ReaderOutput {
    pub mentions: Vec<Mention>,
    pub groups: Vec<CoOccurrenceGroup>,
    pub reader_name: String,
    pub diagnostics: ReaderDiagnostics,
}

impl ReaderOutput {
    #[must_use]
    pub fn new(reader_name: impl Into<String>) -> Self {
        Self {
            reader_name: reader_name.into(),
            ..Self::default()
        }
    }
}

/// Per-read warnings. Bad lines are skipped and recorded here rather than
/// failing the whole source.
#[derive(Debug, Clone, Default)]
pub struct ReaderDiagnostics {
    pub warnings: Vec<String>,
    pub skipped_lines: usize,
}

impl ReaderDiagnostics {
    pub fn record_warning<S: Into<String>>(&mut self, warning: S) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn skip(&mut self, error: &CanonError) {
        self.skipped_lines += 1;
        self.warnings.push(error.to_string());
    }
}

/// Trait implemented by source readers.
pub trait SourceReader: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Return true if this reader is a good match for the provided hint.
    fn supports(&self, hint: &ReaderHint<'_>) -> bool;

    /// Extract mentions and groups from the provided bytes.
    fn extract(&self, bytes: &[u8], hint: &ReaderHint<'_>) -> Result<ReaderOutput>;
}

/// Registry of source readers.
pub struct ReaderRegistry {
    readers: Vec<Box<dyn SourceReader>>,
}

impl ReaderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    pub fn register<R>(&mut self, reader: R)
    where
        R: SourceReader + 'static,
    {
        self.readers.push(Box::new(reader));
    }

    #[must_use]
    pub fn readers(&self) -> &[Box<dyn SourceReader>] {
        &self.readers
    }

    pub fn find_reader<'a>(&'a self, hint: &ReaderHint<'_>) -> Option<&'a dyn SourceReader> {
        self.readers
            .iter()
            .map(std::convert::AsRef::as_ref)
            .find(|reader| reader.supports(hint))
    }

    /// Route `bytes` to the first reader supporting `hint`.
    pub fn extract(&self, bytes: &[u8], hint: &ReaderHint<'_>) -> Result<ReaderOutput> {
        let reader = self
            .find_reader(hint)
            .ok_or_else(|| CanonError::UnsupportedSource {
                source_id: hint.source_id.to_string(),
            })?;
        let output = reader.extract(bytes, hint)?;
        tracing::debug!(
            target: "canon::reader",
            reader = reader.name(),
            source = hint.source_id,
            mentions = output.mentions.len(),
            groups = output.groups.len(),
            skipped = output.diagnostics.skipped_lines,
            "source extracted"
        );
        Ok(output)
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(JsonlReader);
        registry.register(FlightManifestReader);
        registry.register(ContactListReader);
        registry
    }
}

pub(crate) fn decode_utf8<'a>(bytes: &'a [u8], reader: &'static str) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|err| CanonError::MalformedSource {
        reader,
        line: 0,
        reason: format!("input is not UTF-8: {err}"),
    })
}

/// Parse `YYYY-MM-DD`, `YYYY/MM/DD` or plain unix seconds into unix
/// seconds. Impossible calendar dates are rejected.
pub(crate) fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Some(secs);
    }
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_dates_and_seconds() {
        assert_eq!(parse_timestamp("1970-01-01"), Some(0));
        assert_eq!(parse_timestamp("2000-03-01"), Some(951_868_800));
        assert_eq!(parse_timestamp("1999/12/31"), Some(946_598_400));
        assert_eq!(parse_timestamp(" 42 "), Some(42));
        assert_eq!(parse_timestamp("2002-3-1"), Some(1_014_940_800));
        assert_eq!(parse_timestamp("2001-13-01"), None);
        assert_eq!(parse_timestamp("2001-02-31"), None);
        assert_eq!(parse_timestamp("2000-02-29"), Some(951_782_400));
        assert_eq!(parse_timestamp("soon"), None);
    }

    #[test]
    fn registry_routes_by_format_and_extension() {
        let registry = ReaderRegistry::default();
        let hint = ReaderHint::new("logs", None).with_uri(Some("flights/1997.jsonl"));
        assert_eq!(registry.find_reader(&hint).map(|r| r.name()), Some("jsonl"));

        let hint = ReaderHint::new("contacts", Some(SourceFormat::ContactList));
        assert_eq!(
            registry.find_reader(&hint).map(|r| r.name()),
            Some("contact_list")
        );

        let hint = ReaderHint::new("mystery", None).with_uri(Some("scan.pdf"));
        let err = registry.extract(b"", &hint).expect_err("unsupported");
        assert!(matches!(err, CanonError::UnsupportedSource { .. }));
    }
}
