//! Pre-extracted records, one JSON object per line.
//!
//! ```text
//! {"type":"mention","raw_name":"Epstein, Jeffrey","record_id":"doc-1"}
//! {"type":"group","record_id":"doc-1","members":["Epstein, Jeffrey","Maxwell, G"]}
//! ```

use serde::Deserialize;

use super::{ReaderHint, ReaderOutput, SourceFormat, SourceReader, decode_utf8};
use crate::error::{CanonError, Result};
use crate::types::{CoOccurrenceGroup, Mention};

const READER: &str = "jsonl";

pub struct JsonlReader;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line {
    Mention {
        raw_name: String,
        #[serde(default)]
        source_id: Option<String>,
        record_id: String,
        #[serde(default)]
        observed_at: Option<i64>,
    },
    Group {
        record_id: String,
        members: Vec<String>,
    },
}

impl SourceReader for JsonlReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn supports(&self, hint: &ReaderHint<'_>) -> bool {
        match hint.format {
            Some(format) => format == SourceFormat::Jsonl,
            None => hint.has_extension(&[".jsonl", ".ndjson"]),
        }
    }

    fn extract(&self, bytes: &[u8], hint: &ReaderHint<'_>) -> Result<ReaderOutput> {
        let text = decode_utf8(bytes, READER)?;
        let mut output = ReaderOutput::new(READER);
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Line>(line) {
                Ok(Line::Mention {
                    raw_name,
                    source_id,
                    record_id,
                    observed_at,
                }) => {
                    let source = source_id.unwrap_or_else(|| hint.source_id.to_string());
                    let mut mention = Mention::new(raw_name, source, record_id);
                    mention.observed_at = observed_at;
                    output.mentions.push(mention);
                }
                Ok(Line::Group { record_id, members }) => {
                    output.groups.push(CoOccurrenceGroup::new(record_id, members));
                }
                Err(err) => output.diagnostics.skip(&CanonError::MalformedSource {
                    reader: READER,
                    line: idx + 1,
                    reason: err.to_string(),
                }),
            }
        }
        Ok(output)
    }
}
