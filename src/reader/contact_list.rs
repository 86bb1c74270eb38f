//! Structured contact lists (CSV).
//!
//! Names arrive as one quoted `"Last, First"` cell or as separate `last` and
//! `first` columns. Every row becomes one mention with its own record id;
//! contact lists carry no co-occurrence groups.

use csv::StringRecord;

use super::{ReaderHint, ReaderOutput, SourceFormat, SourceReader, decode_utf8, parse_timestamp};
use crate::error::{CanonError, Result};
use crate::types::Mention;

const READER: &str = "contact_list";

pub struct ContactListReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameColumns {
    Single(usize),
    Split { last: usize, first: usize },
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    name: NameColumns,
    date: Option<usize>,
    delimiter: u8,
}

impl SourceReader for ContactListReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn supports(&self, hint: &ReaderHint<'_>) -> bool {
        match hint.format {
            Some(format) => format == SourceFormat::ContactList,
            None => hint.has_extension(&[".csv", ".tsv"]),
        }
    }

    fn extract(&self, bytes: &[u8], hint: &ReaderHint<'_>) -> Result<ReaderOutput> {
        let text = decode_utf8(bytes, READER)?.trim_start_matches('\u{feff}');
        let mut output = ReaderOutput::new(READER);
        let first_line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
        let delimiter = if hint.has_extension(&[".tsv"]) || first_line.contains('\t') {
            b'\t'
        } else {
            b','
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut layout: Option<Layout> = None;
        for result in reader.records() {
            let row = match result {
                Ok(row) => row,
                Err(err) => {
                    output.diagnostics.skip(&malformed(&err));
                    continue;
                }
            };
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let line = row.position().map_or(0, |pos| pos.line() as usize);
            let current = match layout {
                Some(current) => current,
                None => {
                    let (detected, header_is_data) = Layout::from_header(&row, delimiter);
                    layout = Some(detected);
                    if !header_is_data {
                        continue;
                    }
                    detected
                }
            };
            push_row(&mut output, hint, line, &row, current);
        }
        Ok(output)
    }
}

impl Layout {
    /// Detect columns from the header row. Without a recognizable header the
    /// first column is the name and the first row is data.
    fn from_header(header: &StringRecord, delimiter: u8) -> (Self, bool) {
        let find = |names: &[&str]| {
            header
                .iter()
                .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
        };
        let date = find(&["date", "observed_at", "added", "timestamp"]);
        if let (Some(last), Some(first)) = (
            find(&["last", "last_name", "lastname", "surname"]),
            find(&["first", "first_name", "firstname", "given"]),
        ) {
            let name = NameColumns::Split { last, first };
            return (Self { name, date, delimiter }, false);
        }
        if let Some(idx) = find(&["name", "full_name", "contact"]) {
            return (
                Self {
                    name: NameColumns::Single(idx),
                    date,
                    delimiter,
                },
                false,
            );
        }
        (
            Self {
                name: NameColumns::Single(0),
                date: None,
                delimiter,
            },
            true,
        )
    }
}

fn push_row(output: &mut ReaderOutput, hint: &ReaderHint<'_>, line: usize, row: &StringRecord, layout: Layout) {
    let cell = |idx: usize| row.get(idx).map_or("", str::trim);
    let raw_name = match layout.name {
        NameColumns::Single(idx) => cell(idx).to_string(),
        NameColumns::Split { last, first } => match (cell(last), cell(first)) {
            ("", given) => given.to_string(),
            (surname, "") => surname.to_string(),
            (surname, given) => format!("{surname}, {given}"),
        },
    };
    if raw_name.is_empty() {
        output.diagnostics.skip(&CanonError::MalformedSource {
            reader: READER,
            line,
            reason: format!("no name in row (delimiter {:?})", char::from(layout.delimiter)),
        });
        return;
    }
    let mut mention = Mention::new(raw_name, hint.source_id, format!("{}:{line}", hint.source_id));
    if let Some(ts) = layout.date.and_then(|idx| parse_timestamp(cell(idx))) {
        mention = mention.observed_at(ts);
    }
    output.mentions.push(mention);
}

fn malformed(err: &csv::Error) -> CanonError {
    CanonError::MalformedSource {
        reader: READER,
        line: err.position().map_or(0, |pos| pos.line() as usize),
        reason: err.to_string(),
    }
}
