//! NDEF text records.
//!
//! Only the single-record text message used for license payloads is
//! produced. Parsing accepts short and long records, with or without an ID
//! field, and reports any record that is not a well-known text record as
//! "not text" instead of failing.
//!
//! ```text
//! header  [MB ME CF SR IL TNF(3)]
//! type length, payload length (1 byte if SR, else 4 bytes BE), [id length]
//! type "T", [id], payload = [status][language][text]
//! ```

use evlic_core::{
    Error, Result,
    constants::{NDEF_SHORT_PAYLOAD_MAX, NDEF_TEXT_TYPE, NDEF_TNF_WELL_KNOWN},
};

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const STATUS_UTF16: u8 = 0x80;
const STATUS_LANG_MASK: u8 = 0x3F;

/// A parsed NDEF record borrowing from the message bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord<'a> {
    pub header: u8,
    pub record_type: &'a [u8],
    pub id: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> NdefRecord<'a> {
    /// Parse the first record of an NDEF message.
    ///
    /// # Errors
    /// Returns `Error::InvalidNdef` if the header or a length runs past the
    /// end of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor { data, pos: 0 };
        let header = cursor.byte("header")?;
        let type_len = cursor.byte("type length")? as usize;
        let payload_len = if header & FLAG_SR != 0 {
            cursor.byte("payload length")? as usize
        } else {
            let bytes = cursor.take(4, "payload length")?;
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
        };
        let id_len = if header & FLAG_IL != 0 {
            cursor.byte("id length")? as usize
        } else {
            0
        };
        let record_type = cursor.take(type_len, "type")?;
        let id = cursor.take(id_len, "id")?;
        let payload = cursor.take(payload_len, "payload")?;

        Ok(NdefRecord {
            header,
            record_type,
            id,
            payload,
        })
    }

    /// Type name format (low 3 bits of the header).
    #[must_use]
    pub fn tnf(&self) -> u8 {
        self.header & TNF_MASK
    }

    /// Returns `true` for a well-known `"T"` record.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.tnf() == NDEF_TNF_WELL_KNOWN && self.record_type == NDEF_TEXT_TYPE
    }

    /// Decode the text payload, `Ok(None)` if this is not a text record.
    ///
    /// # Errors
    /// Returns `Error::InvalidNdef` for a language code running past the
    /// payload, and `Error::InvalidEncoding` for undecodable text.
    pub fn text(&self) -> Result<Option<TextRecord>> {
        if !self.is_text() {
            return Ok(None);
        }
        let Some((&status, rest)) = self.payload.split_first() else {
            return Err(Error::InvalidNdef("empty text record payload".to_string()));
        };
        let lang_len = (status & STATUS_LANG_MASK) as usize;
        if lang_len > rest.len() {
            return Err(Error::InvalidNdef(format!(
                "language code of {lang_len} bytes exceeds payload"
            )));
        }
        let (lang, body) = rest.split_at(lang_len);
        let language = String::from_utf8_lossy(lang).into_owned();
        let text = if status & STATUS_UTF16 != 0 {
            decode_utf16(body)?
        } else {
            String::from_utf8(body.to_vec())
                .map_err(|e| Error::InvalidEncoding(format!("text record: {e}")))?
        };
        Ok(Some(TextRecord { language, text }))
    }
}

/// Contents of a text record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub language: String,
    pub text: String,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.data.len());
        let Some(end) = end else {
            return Err(Error::InvalidNdef(format!(
                "{what} truncated: need {len} bytes at offset {}, have {}",
                self.pos,
                self.data.len().saturating_sub(self.pos)
            )));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }
}

/// UTF-16 text, big-endian unless a little-endian BOM is present.
fn decode_utf16(body: &[u8]) -> Result<String> {
    if body.len() % 2 != 0 {
        return Err(Error::InvalidEncoding(
            "UTF-16 text has odd byte length".to_string(),
        ));
    }
    let little_endian = body.starts_with(&[0xFF, 0xFE]);
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| {
            if little_endian {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                u16::from_be_bytes([c[0], c[1]])
            }
        })
        .collect();
    let units = match units.first() {
        Some(0xFEFF) => &units[1..],
        _ => &units[..],
    };
    String::from_utf16(units).map_err(|e| Error::InvalidEncoding(format!("UTF-16 text: {e}")))
}

/// Build a single-record NDEF message holding `text`.
///
/// Uses the short record form when the payload fits in 255 bytes and the
/// long form otherwise.
///
/// # Errors
/// Returns `Error::InvalidNdef` if the language code is longer than 63 bytes.
pub fn encode_text(text: &str, language: &str) -> Result<Vec<u8>> {
    let lang = language.as_bytes();
    if lang.len() > STATUS_LANG_MASK as usize {
        return Err(Error::InvalidNdef(format!(
            "language code '{language}' is too long"
        )));
    }

    let payload_len = 1 + lang.len() + text.len();
    let short = payload_len <= NDEF_SHORT_PAYLOAD_MAX;

    let mut header = FLAG_MB | FLAG_ME | NDEF_TNF_WELL_KNOWN;
    if short {
        header |= FLAG_SR;
    }

    let mut record = Vec::with_capacity(payload_len + 7);
    record.push(header);
    record.push(NDEF_TEXT_TYPE.len() as u8);
    if short {
        record.push(payload_len as u8);
    } else {
        record.extend_from_slice(&(payload_len as u32).to_be_bytes());
    }
    record.extend_from_slice(NDEF_TEXT_TYPE);
    record.push(lang.len() as u8);
    record.extend_from_slice(lang);
    record.extend_from_slice(text.as_bytes());
    Ok(record)
}

/// Parse an NDEF message and return the text of its first record.
///
/// `Ok(None)` means the record is well formed but not a text record.
///
/// # Errors
/// Propagates structural and encoding errors from [`NdefRecord`].
pub fn decode_text(message: &[u8]) -> Result<Option<TextRecord>> {
    NdefRecord::parse(message)?.text()
}
