//! Type-Length-Value envelope for NDEF messages.
//!
//! The tag data area is a sequence of TLV blocks:
//!
//! ```text
//! [0x00]                      NULL (padding, no length)
//! [0x01|0x02][len][value]     lock / memory control
//! [0x03][len][ndef message]   NDEF message
//! [0xFE]                      terminator
//! ```
//!
//! `len` is one byte for values up to 254 bytes, or `0xFF` followed by a
//! 2-byte big-endian length.

use bytes::{BufMut, Bytes, BytesMut};
use evlic_core::{
    Error, Result,
    constants::{
        TLV_EXTENDED_LENGTH, TLV_LOCK_CONTROL, TLV_LONG_LENGTH_MAX, TLV_MEMORY_CONTROL,
        TLV_NDEF_MESSAGE, TLV_NULL, TLV_SHORT_LENGTH_MAX, TLV_TERMINATOR,
    },
};

/// Proprietary TLV type; skipped like the control TLVs.
const TLV_PROPRIETARY: u8 = 0xFD;

/// Wrap an NDEF message in a `0x03` TLV followed by the terminator.
///
/// # Errors
/// Returns `Error::PayloadTooLarge` if the message does not fit the
/// extended length form.
pub fn wrap_ndef(message: &[u8]) -> Result<Bytes> {
    let len = message.len();
    if len > TLV_LONG_LENGTH_MAX {
        return Err(Error::PayloadTooLarge {
            size: len,
            max: TLV_LONG_LENGTH_MAX,
        });
    }

    let mut buf = BytesMut::with_capacity(len + 5);
    buf.put_u8(TLV_NDEF_MESSAGE);
    put_length(&mut buf, len);
    buf.put_slice(message);
    buf.put_u8(TLV_TERMINATOR);
    Ok(buf.freeze())
}

fn put_length(buf: &mut BytesMut, len: usize) {
    if len <= TLV_SHORT_LENGTH_MAX {
        buf.put_u8(len as u8);
    } else {
        buf.put_u8(TLV_EXTENDED_LENGTH);
        buf.put_u16(len as u16);
    }
}

/// Returns `true` if `data` starts like a TLV area rather than text.
///
/// Leading NULL padding is skipped; the first real byte must be a control
/// or NDEF TLV type.
#[must_use]
pub fn looks_like_tlv(data: &[u8]) -> bool {
    data.iter()
        .find(|&&b| b != TLV_NULL)
        .is_some_and(|&b| matches!(b, TLV_LOCK_CONTROL | TLV_MEMORY_CONTROL | TLV_NDEF_MESSAGE))
}

/// Locate the first NDEF message TLV and return its value.
///
/// Returns `Ok(None)` when the terminator (or the end of data) is reached
/// without an NDEF TLV.
///
/// # Errors
/// Returns `Error::InvalidTlv` for an unknown TLV type, a truncated length
/// field, or a value running past the end of `data`.
pub fn find_ndef_message(data: &[u8]) -> Result<Option<&[u8]>> {
    let mut pos = 0;
    while pos < data.len() {
        let tlv_type = data[pos];
        pos += 1;
        match tlv_type {
            TLV_NULL => continue,
            TLV_TERMINATOR => return Ok(None),
            TLV_LOCK_CONTROL | TLV_MEMORY_CONTROL | TLV_NDEF_MESSAGE | TLV_PROPRIETARY => {}
            other => {
                return Err(Error::InvalidTlv(format!(
                    "unexpected TLV type 0x{other:02X} at offset {}",
                    pos - 1
                )));
            }
        }

        let (len, header) = read_length(&data[pos..])?;
        pos += header;
        let end = pos + len;
        if end > data.len() {
            return Err(Error::InvalidTlv(format!(
                "TLV 0x{tlv_type:02X} declares {len} bytes, only {} available",
                data.len() - pos
            )));
        }
        if tlv_type == TLV_NDEF_MESSAGE {
            return Ok(Some(&data[pos..end]));
        }
        pos = end;
    }
    Ok(None)
}

/// Decode a TLV length field, returning `(length, bytes consumed)`.
fn read_length(data: &[u8]) -> Result<(usize, usize)> {
    match data {
        [TLV_EXTENDED_LENGTH, hi, lo, ..] => Ok((u16::from_be_bytes([*hi, *lo]) as usize, 3)),
        [TLV_EXTENDED_LENGTH, ..] => Err(Error::InvalidTlv(
            "truncated extended length field".to_string(),
        )),
        [len, ..] => Ok((*len as usize, 1)),
        [] => Err(Error::InvalidTlv("missing length field".to_string())),
    }
}
