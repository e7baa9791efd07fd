//! Property-based tests for the record codec.
//!
//! These tests use proptest to generate records and texts and verify that
//! both wire formats survive an encode/decode cycle, including the trip
//! through zero-padded card blocks.

mod common;

use evlic_codec::{
    WireFormat, assemble, decode, decode_ndef_text, encode_ndef, encode_plain, split_blocks,
};
use evlic_core::{LicenseField, LicenseRecord, MemoryBlock, constants::NOT_AVAILABLE};
use proptest::prelude::*;

/// Strategy for field values: printable ASCII without leading or trailing
/// whitespace.
fn field_value() -> impl Strategy<Value = String> {
    prop::string::string_regex("[!-~]([ -~]{0,30}[!-~])?")
        .expect("Failed to create field value regex strategy")
        .prop_filter("N/A is the missing-field sentinel", |v| v != NOT_AVAILABLE)
}

/// Strategy for records with an arbitrary subset of fields populated.
fn license_record() -> impl Strategy<Value = LicenseRecord> {
    prop::collection::vec(prop::option::of(field_value()), 7).prop_map(|values| {
        let mut record = LicenseRecord::new();
        for (field, value) in LicenseField::ALL.iter().zip(values) {
            if let Some(value) = value {
                record.set(*field, value);
            }
        }
        record
    })
}

/// Strategy for UTF-8 texts of 0-500 bytes, evenly spread across both TLV
/// length forms.
///
/// Letters and spaces only, so the text can never parse as a record or JSON
/// (apart from the three literals filtered out below).
fn ndef_text() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[ a-zA-Z]{0,500}")
            .expect("Failed to create ASCII text regex strategy"),
        prop::string::string_regex("[ a-zA-Zà-ÿ]{0,250}")
            .expect("Failed to create Latin-1 text regex strategy"),
    ]
    .prop_filter("JSON literals decode as JSON", |s| {
        !matches!(s.trim(), "true" | "false" | "null")
    })
}

fn to_memory_blocks(bytes: &[u8]) -> Vec<MemoryBlock> {
    split_blocks(bytes)
        .into_iter()
        .enumerate()
        .map(|(i, data)| MemoryBlock::readable(4 + i as u16, data))
        .collect()
}

proptest! {
    /// Property: a plain-encoded record decodes to the same record, with
    /// every missing field reported as N/A.
    #[test]
    fn prop_plain_roundtrip(record in license_record()) {
        prop_assume!(!record.is_empty());

        let decoded = decode(&encode_plain(&record));
        prop_assert_eq!(decoded.format, WireFormat::Plain);
        let back = decoded.payload.record().cloned();
        prop_assert_eq!(back.as_ref(), Some(&record));

        if let Some(back) = back {
            for field in LicenseField::ALL {
                if record.get(field).is_none() {
                    prop_assert_eq!(back.display(field), NOT_AVAILABLE);
                }
            }
        }
    }

    /// Property: plain records survive block splitting and assembly.
    #[test]
    fn prop_plain_roundtrip_through_blocks(record in license_record()) {
        prop_assume!(!record.is_empty());

        let blocks = to_memory_blocks(&encode_plain(&record));
        let decoded = decode(&assemble(&blocks));
        prop_assert_eq!(decoded.payload.record(), Some(&record));
    }

    /// Property: NDEF text round-trips byte for byte, edge whitespace
    /// included, for 0-500 byte strings in both TLV length forms.
    #[test]
    fn prop_ndef_roundtrip(text in ndef_text()) {
        prop_assert!(text.len() <= 500);
        let bytes = encode_ndef(&text).unwrap();
        let extended = bytes[1] == 0xFF;
        // record header (3 or 6) + type + status + "en" + text
        let record_len = text.len() + 4 + if text.len() + 3 > 255 { 6 } else { 3 };
        prop_assert_eq!(extended, record_len > 254);

        let decoded = decode(&bytes);
        prop_assert_eq!(decoded.format, WireFormat::Ndef);
        prop_assert_eq!(decoded.payload.text(), Some(text.as_str()));

        let decoded = decode(&assemble(&to_memory_blocks(&bytes)));
        prop_assert_eq!(decoded.format, WireFormat::Ndef);
        prop_assert_eq!(decoded.payload.text(), Some(text.as_str()));
    }

    /// Property: decoding arbitrary bytes never panics and only the empty
    /// stream yields no data.
    #[test]
    fn prop_decode_total(bytes in prop::collection::vec(any::<u8>(), 1..200)) {
        let decoded = decode(&bytes);
        prop_assert!(!matches!(decoded.payload, evlic_codec::DecodedPayload::Empty));
    }
}

#[test]
fn test_ndef_long_form_boundaries() {
    for len in [0usize, 1, 246, 247, 251, 252, 500] {
        let text = "a".repeat(len);
        let bytes = encode_ndef(&text).unwrap();
        assert_eq!(decode_ndef_text(&bytes).unwrap(), Some(text));
    }
}

#[test]
fn test_sample_record_both_formats() {
    let record = common::sample_record();
    assert_eq!(
        decode(&encode_plain(&record)).payload.record(),
        Some(&record)
    );

    let text = evlic_codec::plain::encode(&record);
    let decoded = decode(&encode_ndef(&text).unwrap());
    assert_eq!(decoded.format, WireFormat::Ndef);
    assert_eq!(decoded.payload.record(), Some(&record));
}
