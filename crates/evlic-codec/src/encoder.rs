//! Payload encoding for card writes.

use evlic_core::{LicenseRecord, Result, constants::NDEF_DEFAULT_LANGUAGE};
use serde::{Deserialize, Serialize};

use crate::{ndef, plain, tlv};

/// On-card representation of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `KEY:value` lines as raw UTF-8.
    #[default]
    Plain,
    /// NDEF text record inside a TLV envelope.
    Ndef,
}

/// Something to write to a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WritePayload {
    Record(LicenseRecord),
    Text(String),
}

impl WritePayload {
    /// Text carried by the payload before any envelope is applied.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            WritePayload::Record(record) => plain::encode(record),
            WritePayload::Text(text) => text.clone(),
        }
    }
}

impl From<LicenseRecord> for WritePayload {
    fn from(record: LicenseRecord) -> Self {
        WritePayload::Record(record)
    }
}

impl From<String> for WritePayload {
    fn from(text: String) -> Self {
        WritePayload::Text(text)
    }
}

impl From<&str> for WritePayload {
    fn from(text: &str) -> Self {
        WritePayload::Text(text.to_string())
    }
}

/// Turns payloads into the byte stream written to the data area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    format: WireFormat,
    language: String,
}

impl Encoder {
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            language: NDEF_DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Language code for NDEF text records.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Encode a payload.
    ///
    /// # Errors
    /// Returns an error only for the NDEF format, when the language code or
    /// the payload size cannot be represented.
    pub fn encode(&self, payload: &WritePayload) -> Result<Vec<u8>> {
        let text = payload.to_text();
        match self.format {
            WireFormat::Plain => Ok(text.into_bytes()),
            WireFormat::Ndef => encode_ndef_with_language(&text, &self.language),
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(WireFormat::default())
    }
}

/// Encode a record in the plain format.
#[must_use]
pub fn encode_plain(record: &LicenseRecord) -> Vec<u8> {
    plain::encode(record).into_bytes()
}

/// Encode text as an English NDEF text record in a TLV envelope.
///
/// # Errors
/// Returns `Error::PayloadTooLarge` if the record exceeds the TLV length range.
pub fn encode_ndef(text: &str) -> Result<Vec<u8>> {
    encode_ndef_with_language(text, NDEF_DEFAULT_LANGUAGE)
}

fn encode_ndef_with_language(text: &str, language: &str) -> Result<Vec<u8>> {
    let record = ndef::encode_text(text, language)?;
    Ok(tlv::wrap_ndef(&record)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlic_core::LicenseField;

    #[test]
    fn test_plain_record() {
        let record = LicenseRecord::new().with(LicenseField::City, "Braga");
        let bytes = Encoder::new(WireFormat::Plain)
            .encode(&record.into())
            .unwrap();
        assert_eq!(bytes, b"CITY:Braga");
    }

    #[test]
    fn test_plain_text_stored_as_is() {
        let bytes = Encoder::default().encode(&"free text".into()).unwrap();
        assert_eq!(bytes, b"free text");
    }

    #[test]
    fn test_ndef_envelope() {
        let bytes = encode_ndef("Hi").unwrap();
        assert_eq!(
            bytes,
            vec![0x03, 0x09, 0xD1, 0x01, 0x05, b'T', 0x02, b'e', b'n', b'H', b'i', 0xFE]
        );
    }

    #[test]
    fn test_ndef_custom_language() {
        let bytes = Encoder::new(WireFormat::Ndef)
            .with_language("pt-BR")
            .encode(&"Olá".into())
            .unwrap();
        assert_eq!(bytes[6], 5);
        assert_eq!(&bytes[7..12], b"pt-BR");
    }

    #[test]
    fn test_write_payload_untagged_serde() {
        let text: WritePayload = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text, WritePayload::Text("hello".to_string()));

        let record: WritePayload =
            serde_json::from_str(r#"{"holderName":"Ana","city":"Faro"}"#).unwrap();
        let WritePayload::Record(record) = record else {
            panic!("expected record payload");
        };
        assert_eq!(record.get(LicenseField::City), Some("Faro"));
        assert_eq!(record.get(LicenseField::Mobile), None);
    }
}
