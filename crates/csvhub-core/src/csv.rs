//! CSV parsing and serialization.
//!
//! Parsing is lenient about ragged rows: short rows are padded with nulls and
//! long rows are truncated, each recorded as a warning instead of an error.
//!
//! Cell types are inferred from unquoted fields only. A quoted field is always
//! a string, which is what lets [`serialize`] protect strings such as `"42"`
//! or `"true"` and keeps `parse(serialize(d))` value-equal to `d`.

use crate::dataset::{CellValue, TabularDataset};
use crate::error::ParseError;
use std::collections::HashSet;

const DELIMITER: u8 = b',';
const QUOTE: u8 = b'"';
const UTF8_BOM: &str = "\u{feff}";

/// Ragged-row warnings beyond this count are summarized in a single line.
pub const MAX_RECORDED_WARNINGS: usize = 100;

/// Result of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub dataset: TabularDataset,
    pub warnings: Vec<String>,
}

/// Parse CSV bytes into a dataset.
pub fn parse(bytes: &[u8]) -> Result<ParsedCsv, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let mut reader = RecordReader::new(text);

    let header = reader.next_record()?.ok_or(ParseError::EmptyInput)?;
    let columns = header_columns(header)?;
    let width = columns.len();
    // A whitespace-only line is a null cell in a single-column file.
    reader.skip_whitespace_lines = width > 1;

    let mut rows = Vec::new();
    let mut warnings = Warnings::default();
    while let Some(record) = reader.next_record()? {
        let found = record.fields.len();
        if found != width {
            let action = if found < width {
                "padded with nulls"
            } else {
                "extra fields dropped"
            };
            warnings.push(format!(
                "line {}: expected {} fields, found {}; {}",
                record.line, width, found, action
            ));
        }

        let mut row: Vec<CellValue> = record
            .fields
            .into_iter()
            .take(width)
            .map(RawField::into_cell)
            .collect();
        row.resize(width, CellValue::Null);
        rows.push(row);
    }

    let warnings = warnings.finish();
    if !warnings.is_empty() {
        tracing::debug!(
            rows = rows.len(),
            warnings = warnings.len(),
            "Parsed CSV with ragged rows"
        );
    }

    Ok(ParsedCsv {
        dataset: TabularDataset::from_parts_unchecked(columns, rows),
        warnings,
    })
}

/// Serialize a dataset as comma-separated text with a header line.
///
/// A dataset without columns has no CSV form and serializes to empty
/// output, which [`parse`] rejects as [`ParseError::EmptyInput`].
pub fn serialize(dataset: &TabularDataset) -> Vec<u8> {
    if dataset.num_columns() == 0 {
        return Vec::new();
    }
    let mut out = String::new();

    for (i, column) in dataset.columns().iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER as char);
        }
        write_text(&mut out, column, header_needs_quotes(column));
    }
    out.push('\n');

    for row in dataset.rows() {
        let start = out.len();
        for (i, cell) in row.values().iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER as char);
            }
            match cell {
                CellValue::Null => {}
                CellValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                CellValue::Number(n) => out.push_str(&n.to_string()),
                CellValue::String(s) => write_text(&mut out, s, cell_needs_quotes(s)),
            }
        }
        if out.len() == start {
            // An empty line would be skipped as blank on the way back in.
            out.push(' ');
        }
        out.push('\n');
    }

    out.into_bytes()
}

/// Infer the value of an unquoted field.
pub fn infer_cell(text: &str) -> CellValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return CellValue::Null;
    }
    if let Some(n) = parse_number(trimmed) {
        return CellValue::Number(n);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    CellValue::String(text.to_string())
}

fn parse_number(text: &str) -> Option<serde_json::Number> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    // Identifiers such as zip codes keep their leading zeros.
    let bytes = digits.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit() {
        return None;
    }
    if !bytes.iter().any(u8::is_ascii_digit)
        || !bytes
            .iter()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }

    if let Ok(i) = text.parse::<i64>() {
        return Some(i.into());
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(u.into());
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
}

fn header_columns(header: RawRecord) -> Result<Vec<String>, ParseError> {
    let mut seen = HashSet::with_capacity(header.fields.len());
    let mut columns = Vec::with_capacity(header.fields.len());
    for field in header.fields {
        let name = if field.quoted {
            field.text
        } else {
            field.text.trim().to_string()
        };
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateColumn { name });
        }
        columns.push(name);
    }
    Ok(columns)
}

fn has_special_chars(text: &str) -> bool {
    text.bytes()
        .any(|b| matches!(b, DELIMITER | QUOTE | b'\n' | b'\r'))
        || text.trim() != text
}

fn header_needs_quotes(text: &str) -> bool {
    text.is_empty() || has_special_chars(text)
}

fn cell_needs_quotes(text: &str) -> bool {
    text.is_empty() || has_special_chars(text) || !matches!(infer_cell(text), CellValue::String(_))
}

fn write_text(out: &mut String, text: &str, quoted: bool) {
    if !quoted {
        out.push_str(text);
        return;
    }
    out.push('"');
    for ch in text.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}

#[derive(Debug)]
struct RawField {
    text: String,
    quoted: bool,
}

impl RawField {
    fn into_cell(self) -> CellValue {
        if self.quoted {
            CellValue::String(self.text)
        } else {
            infer_cell(&self.text)
        }
    }
}

#[derive(Debug)]
struct RawRecord {
    /// 1-based line the record starts on
    line: usize,
    fields: Vec<RawField>,
}

/// Splits text into records, tracking whether each field was quoted.
///
/// Delimiters, quotes and line breaks are ASCII, so scanning bytes never
/// splits a multi-byte character.
struct RecordReader<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
    /// Treat whitespace-only lines as blank, not just empty ones.
    skip_whitespace_lines: bool,
}

impl<'a> RecordReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
            skip_whitespace_lines: true,
        }
    }

    fn skip_blank_lines(&mut self) {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            let (line, advance, ended) = match rest.find(|c: char| c == '\n' || c == '\r') {
                Some(i) if rest[i..].starts_with("\r\n") => (&rest[..i], i + 2, true),
                Some(i) => (&rest[..i], i + 1, true),
                None => (rest, rest.len(), false),
            };
            let blank = if self.skip_whitespace_lines {
                line.trim().is_empty()
            } else {
                line.is_empty()
            };
            if !blank {
                return;
            }
            self.pos += advance;
            if ended {
                self.line += 1;
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>, ParseError> {
        self.skip_blank_lines();
        if self.pos >= self.text.len() {
            return Ok(None);
        }

        let line = self.line;
        let bytes = self.text.as_bytes();
        let mut fields = Vec::new();

        loop {
            let field = if bytes.get(self.pos) == Some(&QUOTE) {
                self.quoted_field(line)?
            } else {
                let end = self.field_end();
                let text = self.text[self.pos..end].to_string();
                self.pos = end;
                RawField {
                    text,
                    quoted: false,
                }
            };
            fields.push(field);

            match bytes.get(self.pos) {
                None => break,
                Some(&DELIMITER) => self.pos += 1,
                Some(b'\r') => {
                    self.pos += if bytes.get(self.pos + 1) == Some(&b'\n') {
                        2
                    } else {
                        1
                    };
                    self.line += 1;
                    break;
                }
                Some(b'\n') => {
                    self.pos += 1;
                    self.line += 1;
                    break;
                }
                Some(_) => unreachable!("field_end stops only at delimiters or line breaks"),
            }
        }

        Ok(Some(RawRecord { line, fields }))
    }

    /// Position of the next delimiter or line break at or after `pos`.
    fn field_end(&self) -> usize {
        self.text.as_bytes()[self.pos..]
            .iter()
            .position(|b| matches!(*b, DELIMITER | b'\n' | b'\r'))
            .map(|off| self.pos + off)
            .unwrap_or(self.text.len())
    }

    fn quoted_field(&mut self, line: usize) -> Result<RawField, ParseError> {
        let bytes = self.text.as_bytes();
        let mut text = String::new();
        self.pos += 1;

        loop {
            let Some(off) = bytes[self.pos..].iter().position(|b| *b == QUOTE) else {
                return Err(ParseError::Malformed {
                    line,
                    reason: "unterminated quoted field".to_string(),
                });
            };
            let chunk = &self.text[self.pos..self.pos + off];
            self.line += chunk.matches('\n').count();
            text.push_str(chunk);
            self.pos += off + 1;

            if bytes.get(self.pos) == Some(&QUOTE) {
                text.push('"');
                self.pos += 1;
            } else {
                break;
            }
        }

        // Text between the closing quote and the delimiter is kept as-is.
        let end = self.field_end();
        text.push_str(&self.text[self.pos..end]);
        self.pos = end;

        Ok(RawField { text, quoted: true })
    }
}

#[derive(Default)]
struct Warnings {
    recorded: Vec<String>,
    suppressed: usize,
}

impl Warnings {
    fn push(&mut self, warning: String) {
        if self.recorded.len() < MAX_RECORDED_WARNINGS {
            self.recorded.push(warning);
        } else {
            self.suppressed += 1;
        }
    }

    fn finish(mut self) -> Vec<String> {
        if self.suppressed > 0 {
            self.recorded
                .push(format!("{} more ragged rows not listed", self.suppressed));
        }
        self.recorded
    }
}
