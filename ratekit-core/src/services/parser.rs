//! Rate file parser
//!
//! Reads a comma-delimited rate table into [`RawRow`]s. The file's text
//! encoding is not declared, so each entry of [`CANDIDATE_ENCODINGS`] is
//! tried in order and the first one that yields a structurally valid table wins.

use std::path::Path;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use thiserror::Error;

use crate::domain::RawRow;

/// Encodings tried, in order. UTF-8 input may carry a byte-order mark.
pub const CANDIDATE_ENCODINGS: &[&Encoding] = &[UTF_8, WINDOWS_1252];

/// Columns every rate file must carry
pub const REQUIRED_COLUMNS: &[&str] = &["account_id", "rate", "revision_start_date"];

/// At least one of these identifies the service
pub const SERVICE_COLUMNS: &[&str] = &["service_id", "service_key"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Input-structural failures. Any of these aborts the import before row processing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("Cannot read '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Input contains no data rows")]
    Empty,

    #[error("Input could not be parsed with any supported encoding ({tried}): {reason}")]
    UndecodableInput { tried: String, reason: String },

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// A decoded rate table
#[derive(Debug, Clone)]
pub struct ParsedTable {
    /// Name of the encoding that decoded the input
    pub encoding: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Read and parse a rate file
pub fn parse_file(path: &Path) -> Result<ParsedTable, ImportError> {
    let bytes = std::fs::read(path).map_err(|e| ImportError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_bytes(&bytes)
}

/// Parse raw bytes, trying each candidate encoding in order
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedTable, ImportError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ImportError::Empty);
    }

    let mut last_reason = String::new();
    for &encoding in CANDIDATE_ENCODINGS {
        let Some(text) = decode(encoding, bytes) else {
            last_reason = format!("invalid {} byte sequence", encoding.name());
            continue;
        };

        match parse_text(&text) {
            Ok((headers, rows)) => {
                check_columns(&headers)?;
                if rows.is_empty() {
                    return Err(ImportError::Empty);
                }
                return Ok(ParsedTable {
                    encoding: encoding.name(),
                    headers,
                    rows,
                });
            }
            Err(e) => last_reason = e.to_string(),
        }
    }

    Err(ImportError::UndecodableInput {
        tried: CANDIDATE_ENCODINGS
            .iter()
            .map(|e| e.name())
            .collect::<Vec<_>>()
            .join(", "),
        reason: last_reason,
    })
}

/// Strict decode: malformed input yields `None` rather than replacement characters
fn decode(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let bytes = if encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

fn clean_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn parse_text(text: &str) -> Result<(Vec<String>, Vec<RawRow>), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.clone(), value.trim().to_string()))
            .collect();
        // Line 1 is the header row
        rows.push(RawRow::new(idx + 2, fields));
    }

    Ok((headers, rows))
}

fn check_columns(headers: &[String]) -> Result<(), ImportError> {
    let has = |name: &str| headers.iter().any(|h| h == name);

    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !has(c))
        .map(|c| c.to_string())
        .collect();
    if !SERVICE_COLUMNS.iter().any(|c| has(c)) {
        missing.push(SERVICE_COLUMNS.join(" or "));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ImportError::MissingColumns(missing))
    }
}
