//! Line reassembly and field extraction (§4.2).
//!
//! The validation and extraction here are a deliberate substring scan, not a
//! JSON parse — matching the upstream analyzer's own shortcut rather than a
//! schema-validating reimplementation.

use crate::model::SecondaryKeyField;

pub const BUFFER_CAP: usize = 4096;

/// Reassembles newline-terminated records out of a raw byte stream.
/// Overflowing a single record silently truncates it; the newline is never
/// included in the yielded record.
pub struct LineReassembler {
    buf: Vec<u8>,
}

impl Default for LineReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReassembler {
    pub fn new() -> Self {
        LineReassembler {
            buf: Vec::with_capacity(BUFFER_CAP),
        }
    }

    /// Feed one byte. Returns `Some(record)` when `byte` was a newline.
    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == b'\n' {
            Some(std::mem::take(&mut self.buf))
        } else {
            if self.buf.len() < BUFFER_CAP {
                self.buf.push(byte);
            }
            None
        }
    }
}

/// A record accepted for ingestion, with the keys the store needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub pgn: u32,
    pub src: u8,
    pub key2: Option<String>,
    pub key_field: Option<SecondaryKeyField>,
    pub description: Option<String>,
    pub text: String,
}

/// §4.2 validation: substring `"fields":` present, starts with `{"timestamp`,
/// ends with `}}` (newline already stripped).
pub fn validate_candidate(text: &str) -> bool {
    text.contains("\"fields\":") && text.starts_with("{\"timestamp") && text.ends_with("}}")
}

fn extract_quoted_u32(text: &str, key: &str) -> Option<u32> {
    let pat = format!("\"{key}\":\"");
    let start = text.find(&pat)? + pat.len();
    let rest = &text[start..];
    let end = rest.find('"')?;
    rest[..end].parse::<u32>().ok()
}

/// Scan for the first matching secondary-key substring (§4.2), in priority
/// order, and capture its value.
pub fn extract_secondary_key(text: &str) -> Option<(SecondaryKeyField, String)> {
    for (pattern, field) in SecondaryKeyField::SCAN_ORDER {
        let Some(idx) = text.find(pattern) else {
            continue;
        };
        let rest = &text[idx + pattern.len()..];
        let value_start = rest
            .find(|c: char| !matches!(c, ':' | '"' | ',' | ' '))
            .unwrap_or(rest.len());
        let tail = &rest[value_start..];
        let value_end = tail
            .find(|c: char| c == ' ' || c == '"')
            .unwrap_or(tail.len());
        return Some((field, tail[..value_end].to_string()));
    }
    None
}

/// Substring following `"description":`, terminated by the next `:` or `"`.
pub fn extract_description(text: &str) -> Option<String> {
    const PATTERN: &str = "\"description\":";
    let idx = text.find(PATTERN)? + PATTERN.len();
    let rest = &text[idx..];
    let value_start = rest
        .find(|c: char| !matches!(c, ':' | '"' | ',' | ' '))
        .unwrap_or(rest.len());
    let tail = &rest[value_start..];
    let value_end = tail
        .find(|c: char| c == ':' || c == '"')
        .unwrap_or(tail.len());
    Some(tail[..value_end].to_string())
}

/// Parse an accepted candidate into its identifying keys, returning `None`
/// for anything the spec requires to be silently dropped: malformed JSON,
/// missing/zero `src` or `pgn`, or a PGN outside the valid ranges.
pub fn parse_record(text: &str) -> Option<ParsedRecord> {
    if !validate_candidate(text) {
        return None;
    }
    let src = extract_quoted_u32(text, "src").filter(|&v| v != 0 && v <= crate::model::MAX_SRC)?;
    let pgn = extract_quoted_u32(text, "pgn").filter(|&v| v != 0 && crate::model::is_valid_pgn(v))?;
    let secondary = extract_secondary_key(text);
    let key_field = secondary.as_ref().map(|(field, _)| *field);
    let key2 = secondary.map(|(_, value)| value);
    let description = extract_description(text);
    Some(ParsedRecord {
        pgn,
        src: src as u8,
        key2,
        key_field,
        description,
        text: text.to_string(),
    })
}
