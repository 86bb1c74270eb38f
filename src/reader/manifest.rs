//! OCR'd flight manifests.
//!
//! Input is a sequence of blocks, each opened by a flight header line
//! (`FLIGHT 1234 DATE 2002-03-01 TEB-PBI`, OCR variants like `FL1GHT #1234`
//! accepted) followed by passenger lines. A passenger line may hold several
//! names separated by `;` or `|`. Every passenger becomes a mention and every
//! flight becomes one co-occurrence group.

use once_cell::sync::OnceCell;
use regex::Regex;

use super::{ReaderHint, ReaderOutput, SourceFormat, SourceReader, decode_utf8, parse_timestamp};
use crate::error::{CanonError, Result};
use crate::types::{CoOccurrenceGroup, Mention};

const READER: &str = "flight_manifest";

pub struct FlightManifestReader;

struct Flight {
    record_id: String,
    observed_at: Option<i64>,
    members: Vec<String>,
    line: usize,
}

static HEADER: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
static DATE: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();

fn compiled(cell: &'static OnceCell<std::result::Result<Regex, String>>, pattern: &str) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).map_err(|err| err.to_string()))
        .as_ref()
        .map_err(|msg| CanonError::MalformedSource {
            reader: READER,
            line: 0,
            reason: format!("pattern init failed: {msg}"),
        })
}

impl SourceReader for FlightManifestReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn supports(&self, hint: &ReaderHint<'_>) -> bool {
        match hint.format {
            Some(format) => format == SourceFormat::FlightManifest,
            None => hint.has_extension(&[".manifest", ".txt"]),
        }
    }

    fn extract(&self, bytes: &[u8], hint: &ReaderHint<'_>) -> Result<ReaderOutput> {
        let header = compiled(&HEADER, r"(?i)^\s*fl[i1l]ght\s*(?:no\.?|#)?\s*([A-Za-z]*\d[A-Za-z0-9-]*)(.*)$")?;
        let date = compiled(&DATE, r"\d{4}[-/]\d{1,2}[-/]\d{1,2}")?;
        let text = decode_utf8(bytes, READER)?;
        let mut output = ReaderOutput::new(READER);
        let mut current: Option<Flight> = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(caps) = header.captures(line) {
                if let Some(done) = current.take() {
                    finish(&mut output, done);
                }
                let flight_id = caps.get(1).map_or("", |m| m.as_str());
                let rest = caps.get(2).map_or("", |m| m.as_str());
                let day = date.find(rest).map(|m| m.as_str());
                let record_id = match day {
                    Some(day) => format!("{}:{flight_id}@{day}", hint.source_id),
                    None => format!("{}:{flight_id}", hint.source_id),
                };
                current = Some(Flight {
                    record_id,
                    observed_at: day.and_then(parse_timestamp),
                    members: Vec::new(),
                    line: line_no,
                });
                continue;
            }

            let Some(flight) = current.as_mut() else {
                output.diagnostics.skip(&CanonError::MalformedSource {
                    reader: READER,
                    line: line_no,
                    reason: "passenger line before any flight header".into(),
                });
                continue;
            };
            for raw in line.split([';', '|']).map(str::trim) {
                if raw.is_empty() {
                    continue;
                }
                let mut mention = Mention::new(raw, hint.source_id, flight.record_id.clone());
                if let Some(ts) = flight.observed_at {
                    mention = mention.observed_at(ts);
                }
                output.mentions.push(mention);
                flight.members.push(raw.to_string());
            }
        }
        if let Some(done) = current.take() {
            finish(&mut output, done);
        }
        Ok(output)
    }
}

fn finish(output: &mut ReaderOutput, flight: Flight) {
    if flight.members.is_empty() {
        output.diagnostics.record_warning(format!(
            "flight {} at line {} lists no passengers",
            flight.record_id, flight.line
        ));
        return;
    }
    output
        .groups
        .push(CoOccurrenceGroup::new(flight.record_id, flight.members));
}
