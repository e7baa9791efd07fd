//! Plain delimited license format.
//!
//! ```text
//! NAME:John Smith
//! MOBILE:+1-555-0101
//! CITY:Springfield
//! ```
//!
//! Fields are written in [`LicenseField::ALL`] order, one `KEY:value` per
//! line. Decoding tolerates corruption in two passes: an exact line split,
//! then per-field patterns that capture up to the next expected key.

use std::sync::LazyLock;

use evlic_core::{
    LicenseField, LicenseRecord,
    constants::{FIELD_SEPARATOR, LINE_SEPARATOR},
};
use regex::Regex;

/// Per-field extraction patterns, terminated by the next key in wire order.
///
/// Only the immediately following key ends a capture. When that field is
/// missing from a corrupted read, the preceding value runs on into the
/// fields after it.
static FIELD_PATTERNS: LazyLock<Vec<(LicenseField, Regex)>> = LazyLock::new(|| {
    LicenseField::ALL
        .iter()
        .filter_map(|&field| {
            let key = regex::escape(field.key());
            let pattern = match field.next() {
                Some(next) => format!(r"(?s){key}:(.*?)(?:{}:|$)", regex::escape(next.key())),
                None => format!(r"(?s){key}:(.*)$"),
            };
            Regex::new(&pattern).ok().map(|re| (field, re))
        })
        .collect()
});

/// Encode a record as `KEY:value` lines.
///
/// Missing fields are omitted. Line breaks inside a value become spaces so
/// every field stays on its own line.
#[must_use]
pub fn encode(record: &LicenseRecord) -> String {
    LicenseField::ALL
        .iter()
        .filter_map(|&field| {
            let value = record.get(field)?;
            let value = value.replace("\r\n", " ").replace(['\n', '\r'], " ");
            Some(format!("{}{FIELD_SEPARATOR}{value}", field.key()))
        })
        .collect::<Vec<_>>()
        .join(&LINE_SEPARATOR.to_string())
}

/// Exact line split. Returns `None` if no line starts with a known key.
///
/// Lines are split on `\n` with a trailing `\r` removed; values are kept
/// verbatim otherwise.
#[must_use]
pub fn parse_lines(text: &str) -> Option<LicenseRecord> {
    let mut record = LicenseRecord::new();
    let mut recognized = 0;

    for line in text.split(LINE_SEPARATOR) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some((key, value)) = line.split_once(FIELD_SEPARATOR) else {
            continue;
        };
        if let Some(field) = LicenseField::from_key(key) {
            record.set(field, value);
            recognized += 1;
        }
    }

    (recognized > 0).then_some(record)
}

/// Pattern-based extraction for text where line structure is damaged.
///
/// Returns `None` if no field pattern matched. Captured values are trimmed.
#[must_use]
pub fn extract_fields(text: &str) -> Option<LicenseRecord> {
    let mut record = LicenseRecord::new();
    let mut matched = 0;

    for (field, re) in FIELD_PATTERNS.iter() {
        if let Some(caps) = re.captures(text) {
            matched += 1;
            if let Some(value) = caps.get(1) {
                record.set(*field, value.as_str().trim());
            }
        }
    }

    (matched > 0).then_some(record)
}

/// Decode text with the line split, falling back to pattern extraction.
#[must_use]
pub fn decode(text: &str) -> Option<LicenseRecord> {
    parse_lines(text).or_else(|| extract_fields(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> LicenseRecord {
        LicenseRecord::new()
            .with(LicenseField::HolderName, "John Smith")
            .with(LicenseField::Mobile, "+1-555-0101")
            .with(LicenseField::City, "Springfield")
            .with(LicenseField::LicenseType, "Commercial")
            .with(LicenseField::LicenseNumber, "EV-2024-001")
            .with(LicenseField::CardNumber, "C-778")
            .with(LicenseField::ValidUntil, "2026-12-31")
    }

    #[test]
    fn test_encode_fixed_order() {
        assert_eq!(
            encode(&full_record()),
            "NAME:John Smith\nMOBILE:+1-555-0101\nCITY:Springfield\nTYPE:Commercial\n\
             LICENSE:EV-2024-001\nCARD:C-778\nVALID:2026-12-31"
        );
    }

    #[test]
    fn test_encode_omits_missing_and_flattens_newlines() {
        let record = LicenseRecord::new()
            .with(LicenseField::HolderName, "Ana\nMaria")
            .with(LicenseField::City, "Porto\r\nNorte");
        assert_eq!(encode(&record), "NAME:Ana Maria\nCITY:Porto Norte");
    }

    #[test]
    fn test_parse_lines_roundtrip() {
        let record = full_record();
        assert_eq!(parse_lines(&encode(&record)), Some(record));
    }

    #[test]
    fn test_parse_lines_handles_crlf_and_colons_in_values() {
        let record = parse_lines("NAME:Ann\r\nVALID:12:30 2026\r\n").unwrap();
        assert_eq!(record.get(LicenseField::HolderName), Some("Ann"));
        assert_eq!(record.get(LicenseField::ValidUntil), Some("12:30 2026"));
    }

    #[test]
    fn test_parse_lines_no_keys() {
        assert_eq!(parse_lines("hello world"), None);
        assert_eq!(parse_lines("name:lowercase"), None);
    }

    #[test]
    fn test_extract_fields_between_keys() {
        let record = extract_fields("##NAME:Alice MOBILE:555 CITY:NYC").unwrap();
        assert_eq!(record.get(LicenseField::HolderName), Some("Alice"));
        assert_eq!(record.get(LicenseField::Mobile), Some("555"));
        assert_eq!(record.get(LicenseField::City), Some("NYC"));
        assert_eq!(record.get(LicenseField::LicenseType), None);
    }

    #[test]
    fn test_decode_prefers_line_split() {
        let record = decode("NAME:Bob\nMOBILE:1").unwrap();
        assert_eq!(record.get(LicenseField::HolderName), Some("Bob"));
        assert_eq!(decode("no fields here"), None);
    }
}
