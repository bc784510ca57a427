//! Raw sheet reader with encoding and delimiter auto-detection.
//!
//! Client exports rarely start with their data table: banners, addresses and
//! notes come first. The file is therefore read headerless into a
//! [`RawSheet`] grid, and [`extract_main_table`] cuts the real table out once
//! the header row is known.

use serde_json::Value;
use std::path::Path;

use crate::api::logs::log_info;
use crate::error::{CsvError, CsvResult};
use crate::models::Table;

/// Lines inspected when guessing the delimiter.
const DELIMITER_SAMPLE_LINES: usize = 20;

/// A headerless grid of cells. Empty cells are null.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub rows: Vec<Vec<Value>>,
    pub encoding: String,
    pub delimiter: char,
}

impl RawSheet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// The first `n` rows rendered one per line, prefixed with their index.
    pub fn preview_text(&self, n: usize) -> String {
        self.rows
            .iter()
            .take(n)
            .enumerate()
            .map(|(index, row)| {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| match cell {
                        Value::Null => "NaN".to_string(),
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                format!("{:>3}  {}", index, cells.join(" | "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let content = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match String::from_utf8(bytes.to_vec()) {
            Ok(s) => s,
            Err(_) => String::from_utf8_lossy(bytes).to_string(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => {
                let (decoded, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    return Err(CsvError::EncodingError(format!(
                        "content is not valid {}",
                        other
                    )));
                }
                decoded.to_string()
            }
            None => String::from_utf8_lossy(bytes).to_string(),
        },
    };
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting candidates over the first lines.
///
/// Banner lines at the top of an export usually hold no delimiter at all, so a
/// single line is not enough.
pub fn detect_delimiter(content: &str) -> char {
    let sample: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count: usize = sample.iter().map(|line| line.matches(sep).count()).sum();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn to_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::String(trimmed.to_string())
    }
}

/// Read decoded content into a headerless grid.
pub fn read_sheet(content: &str, delimiter: char, encoding: String) -> CsvResult<RawSheet> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| CsvError::ParseError {
            line: e.position().map(|p| p.line() as usize).unwrap_or(index + 1),
            message: e.to_string(),
        })?;
        rows.push(record.iter().map(to_cell).collect());
    }

    Ok(RawSheet {
        rows,
        encoding,
        delimiter,
    })
}

/// Read bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<RawSheet> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    read_sheet(&content, delimiter, encoding)
}

/// Read a file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<RawSheet> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Cut the data table out of a sheet given its header row.
///
/// Only columns with a non-empty header cell are kept and header names are
/// trimmed. Rows that are entirely empty are dropped. Returns `None` when the
/// index is past the end of the sheet.
pub fn extract_main_table(sheet: &RawSheet, header_row: usize) -> Option<Table> {
    let header = sheet.rows.get(header_row)?;

    let kept: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter_map(|(index, cell)| match cell {
            Value::Null => None,
            Value::String(s) => Some((index, s.trim().to_string())),
            other => Some((index, other.to_string())),
        })
        .collect();

    let rows: Vec<Vec<Value>> = sheet.rows[header_row + 1..]
        .iter()
        .map(|row| {
            kept.iter()
                .map(|(index, _)| row.get(*index).cloned().unwrap_or(Value::Null))
                .collect::<Vec<Value>>()
        })
        .filter(|row| row.iter().any(|cell| !cell.is_null()))
        .collect();

    let headers = kept.into_iter().map(|(_, name)| name).collect();
    let table = Table::from_rows(headers, rows);
    log_info(format!(
        "Extracted main table with {} rows and {} columns",
        table.height(),
        table.width()
    ));
    Some(table)
}
