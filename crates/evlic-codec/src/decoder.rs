//! Format detection and layered decoding of card payloads.
//!
//! Decoding never fails. Each layer that cannot make sense of the data
//! hands over to a narrower one:
//!
//! 1. NDEF text record in a TLV envelope (when the stream looks like TLV)
//! 2. `KEY:value` line split
//! 3. per-field pattern extraction
//! 4. JSON
//! 5. plain text
//!
//! Only an empty byte stream decodes to [`DecodedPayload::Empty`].

use evlic_core::{LicenseField, LicenseRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{encoder::WireFormat, ndef, plain, tlv};

/// Which decoding layer produced a license record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordSource {
    Lines,
    Patterns,
    Json,
}

/// Decoded card payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DecodedPayload {
    /// A license record, possibly with some fields missing.
    License {
        record: LicenseRecord,
        source: RecordSource,
    },
    /// Valid JSON that does not look like a license.
    Json { value: Value },
    /// Text no structured decoder recognized.
    PlainText { text: String },
    /// Nothing was written.
    Empty,
}

impl DecodedPayload {
    /// Returns `true` when the payload decoded to something narrower than a
    /// license record.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            DecodedPayload::Json { .. } | DecodedPayload::PlainText { .. }
        )
    }

    #[must_use]
    pub fn record(&self) -> Option<&LicenseRecord> {
        match self {
            DecodedPayload::License { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Text of a plain-text payload.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            DecodedPayload::PlainText { text } => Some(text),
            _ => None,
        }
    }
}

/// Decoding result with the detected wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoded {
    pub format: WireFormat,
    pub payload: DecodedPayload,
}

/// Decode an assembled byte stream.
#[must_use]
pub fn decode(bytes: &[u8]) -> Decoded {
    if bytes.is_empty() {
        return Decoded {
            format: WireFormat::Plain,
            payload: DecodedPayload::Empty,
        };
    }
    trace!(len = bytes.len(), data = %hex_preview(bytes), "Decoding payload");

    if tlv::looks_like_tlv(bytes) {
        match decode_ndef_text(bytes) {
            Ok(Some(text)) => {
                debug!(len = text.len(), "Decoded NDEF text record");
                return Decoded {
                    format: WireFormat::Ndef,
                    payload: decode_ndef_body(&text),
                };
            }
            Ok(None) => debug!("TLV area holds no NDEF text record, falling back to text"),
            Err(e) => warn!(error = %e, "Malformed NDEF data, falling back to text"),
        }
    }

    Decoded {
        format: WireFormat::Plain,
        payload: decode_text(&clean_text(bytes)),
    }
}

/// Extract the text of the NDEF text record in a TLV area.
///
/// `Ok(None)` when there is no NDEF TLV or its record is not text.
///
/// # Errors
/// Returns TLV, NDEF, or encoding errors for malformed data.
pub fn decode_ndef_text(bytes: &[u8]) -> evlic_core::Result<Option<String>> {
    let Some(message) = tlv::find_ndef_message(bytes)? else {
        return Ok(None);
    };
    Ok(ndef::decode_text(message)?.map(|record| record.text))
}

/// Body of an NDEF text record; an empty text is a valid payload here.
fn decode_ndef_body(text: &str) -> DecodedPayload {
    if text.is_empty() {
        return DecodedPayload::PlainText {
            text: String::new(),
        };
    }
    decode_text(text)
}

/// Decode text through the line, pattern, JSON, and plain-text layers.
///
/// Surrounding whitespace is ignored for the JSON attempt only; plain text
/// comes back exactly as stored.
#[must_use]
pub fn decode_text(text: &str) -> DecodedPayload {
    if let Some(record) = plain::parse_lines(text) {
        return DecodedPayload::License {
            record,
            source: RecordSource::Lines,
        };
    }
    if let Some(record) = plain::extract_fields(text) {
        debug!("Recovered license fields by pattern extraction");
        return DecodedPayload::License {
            record,
            source: RecordSource::Patterns,
        };
    }

    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return match record_from_json(&value) {
            Some(record) => DecodedPayload::License {
                record,
                source: RecordSource::Json,
            },
            None => DecodedPayload::Json { value },
        };
    }

    DecodedPayload::PlainText {
        text: text.to_string(),
    }
}

/// Lossy UTF-8 with NULs and control characters other than line breaks and
/// tabs removed.
#[must_use]
pub fn clean_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Build a record from a JSON object using common key spellings.
fn record_from_json(value: &Value) -> Option<LicenseRecord> {
    let object = value.as_object()?;
    let mut record = LicenseRecord::new();
    for (key, value) in object {
        let Some(field) = json_field(key) else {
            continue;
        };
        match value {
            Value::String(s) => record.set(field, s.as_str()),
            Value::Number(n) => record.set(field, n.to_string()),
            _ => {}
        }
    }
    (!record.is_empty()).then_some(record)
}

fn json_field(key: &str) -> Option<LicenseField> {
    let normalized: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "holdername" | "name" => Some(LicenseField::HolderName),
        "mobile" | "phone" => Some(LicenseField::Mobile),
        "city" => Some(LicenseField::City),
        "licensetype" | "type" => Some(LicenseField::LicenseType),
        "licensenumber" | "license" => Some(LicenseField::LicenseNumber),
        "cardnumber" | "card" => Some(LicenseField::CardNumber),
        "validuntil" | "valid" | "expiry" => Some(LicenseField::ValidUntil),
        _ => None,
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    const MAX: usize = 32;
    let shown = &bytes[..bytes.len().min(MAX)];
    let mut out = hex::encode_upper(shown);
    if bytes.len() > MAX {
        out.push_str("..");
    }
    out
}
