//! License record codec for contactless card memory.
//!
//! Two wire formats are supported: plain `KEY:value` lines and an NDEF text
//! record inside a TLV envelope. [`decode`] detects the format and degrades
//! through narrower representations instead of failing; [`Encoder`] produces
//! the byte stream for a write.
//!
//! ```
//! use evlic_codec::{Encoder, WireFormat, decode};
//! use evlic_core::{LicenseField, LicenseRecord};
//!
//! let record = LicenseRecord::new().with(LicenseField::HolderName, "Alice");
//! let bytes = Encoder::new(WireFormat::Ndef).encode(&record.clone().into())?;
//!
//! let decoded = decode(&bytes);
//! assert_eq!(decoded.format, WireFormat::Ndef);
//! assert_eq!(decoded.payload.record(), Some(&record));
//! # Ok::<(), evlic_core::Error>(())
//! ```

pub mod assembly;
pub mod decoder;
pub mod encoder;
pub mod ndef;
pub mod plain;
pub mod tlv;

pub use assembly::{assemble, assemble_data, split_blocks};
pub use decoder::{Decoded, DecodedPayload, RecordSource, decode, decode_ndef_text, decode_text};
pub use encoder::{Encoder, WireFormat, WritePayload, encode_ndef, encode_plain};
