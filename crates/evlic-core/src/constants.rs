//! Core constants for the EV license card layer.
//!
//! This module defines the memory-layout, timing, and wire-format constants
//! shared by the codec and hardware crates. Keeping them in one place means
//! the block reader, the record encoder, and the poller agree on the same
//! numbers.
//!
//! # Card Memory Layout
//!
//! License payloads live in the data area of a contactless card. On a
//! Mifare Classic card the memory is split into 4-block sectors:
//!
//! ```text
//! Sector 0: [0: manufacturer/UID] [1: data] [2: data] [3: trailer]
//! Sector 1: [4: payload...      ] [5      ] [6      ] [7: trailer]
//! Sector 2: [8                  ] [9      ] [10     ] [11: trailer]
//! ```
//!
//! The payload starts at [`DATA_START_BLOCK`] and skips every sector trailer,
//! which holds access keys and must never be overwritten with data.
//!
//! # Wire Formats
//!
//! | Constant | Value | Meaning |
//! |----------|-------|---------|
//! | [`TLV_NDEF_MESSAGE`] | `0x03` | NDEF message TLV type |
//! | [`TLV_TERMINATOR`] | `0xFE` | End of TLV area |
//! | [`TLV_EXTENDED_LENGTH`] | `0xFF` | Marks a 3-byte length field |
//!
//! # Usage
//!
//! ```
//! use evlic_core::constants::*;
//!
//! assert_eq!(BLOCK_SIZE, 16);
//! assert!(DEFAULT_POLL_INTERVAL_MS >= MIN_POLL_INTERVAL_MS);
//! ```

// ============================================================================
// Memory Layout
// ============================================================================

/// Size of one addressable memory block in bytes.
///
/// Mifare Classic blocks are 16 bytes. Ultralight pages are 4 bytes, but the
/// read command returns four consecutive pages, so the core always moves data
/// in 16-byte units.
pub const BLOCK_SIZE: usize = 16;

/// Size of one Ultralight/NTAG page in bytes.
pub const PAGE_SIZE: usize = 4;

/// Number of pages that make up one logical 16-byte block on page-addressed cards.
pub const PAGES_PER_BLOCK: usize = BLOCK_SIZE / PAGE_SIZE;

/// First block that carries application data on Classic cards.
///
/// Blocks 0-3 hold the manufacturer block, UID, and the first sector trailer.
pub const DATA_START_BLOCK: u16 = 4;

/// Blocks per sector in the lower region of Classic cards.
pub const BLOCKS_PER_SECTOR: u16 = 4;

/// Blocks per sector in the upper region (sectors 32-39) of Classic 4K cards.
pub const BLOCKS_PER_LARGE_SECTOR: u16 = 16;

/// First block of the 16-block sectors on Classic 4K cards.
pub const LARGE_SECTOR_START_BLOCK: u16 = 128;

/// Minimum number of data blocks cleared before a write.
///
/// Clearing at least this many blocks removes residual bytes from a longer
/// payload written earlier.
///
/// # Value: 8 blocks
pub const MIN_CLEAR_BLOCKS: usize = 8;

/// Consecutive read failures tolerated past the head of a range.
///
/// Once more than this many blocks fail in a row (sector trailers excluded),
/// the reader assumes it reached an access-restriction boundary and stops.
pub const MAX_CONSECUTIVE_READ_FAILURES: usize = 3;

/// Number of leading blocks in a range that never count toward the
/// consecutive failure limit.
pub const READ_FAILURE_GRACE_BLOCKS: usize = 4;

/// Default payload limit in data blocks, for reads and writes alike.
///
/// 64 blocks hold 1 KiB, more than the whole data area of a Classic 1K card.
pub const DEFAULT_MAX_DATA_BLOCKS: usize = 64;

/// Factory default Mifare key A.
pub const DEFAULT_KEY_A: [u8; 6] = [0xFF; 6];

// ============================================================================
// Timing
// ============================================================================

/// Default timeout for one command/response exchange (milliseconds).
///
/// # Value: 3000ms
///
/// # Examples
///
/// ```
/// use evlic_core::constants::DEFAULT_COMMAND_TIMEOUT_MS;
/// use std::time::Duration;
///
/// let timeout = Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS);
/// assert_eq!(timeout.as_secs(), 3);
/// ```
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3000;

/// Minimum allowed command timeout (milliseconds).
pub const MIN_COMMAND_TIMEOUT_MS: u64 = 2000;

/// Maximum allowed command timeout (milliseconds).
pub const MAX_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Timeout used by the poller for its request-card exchange (milliseconds).
///
/// Shorter than the default so an unresponsive reader does not stretch a tick
/// far past the poll interval.
pub const POLL_COMMAND_TIMEOUT_MS: u64 = 2000;

/// Default card presence polling interval (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Minimum allowed polling interval (milliseconds).
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Maximum allowed polling interval (milliseconds).
pub const MAX_POLL_INTERVAL_MS: u64 = 10000;

// ============================================================================
// TLV / NDEF Wire Format
// ============================================================================

/// NULL TLV, used as padding before the NDEF message.
pub const TLV_NULL: u8 = 0x00;

/// Lock control TLV.
pub const TLV_LOCK_CONTROL: u8 = 0x01;

/// Memory control TLV.
pub const TLV_MEMORY_CONTROL: u8 = 0x02;

/// NDEF message TLV type.
pub const TLV_NDEF_MESSAGE: u8 = 0x03;

/// Terminator TLV; marks the end of the TLV area.
pub const TLV_TERMINATOR: u8 = 0xFE;

/// Length byte announcing a 2-byte big-endian length follows.
pub const TLV_EXTENDED_LENGTH: u8 = 0xFF;

/// Largest length encodable in the 1-byte TLV length form.
pub const TLV_SHORT_LENGTH_MAX: usize = 254;

/// Largest length encodable in the 3-byte TLV length form.
pub const TLV_LONG_LENGTH_MAX: usize = 0xFFFE;

/// NDEF "NFC Forum well-known type" name format.
pub const NDEF_TNF_WELL_KNOWN: u8 = 0x01;

/// Record type of an NDEF text record.
pub const NDEF_TEXT_TYPE: &[u8] = b"T";

/// Language code written into NDEF text records.
pub const NDEF_DEFAULT_LANGUAGE: &str = "en";

/// Largest payload that fits a short NDEF record.
pub const NDEF_SHORT_PAYLOAD_MAX: usize = 255;

// ============================================================================
// License Record Presentation
// ============================================================================

/// Sentinel rendered for a license field that could not be recovered.
pub const NOT_AVAILABLE: &str = "N/A";

/// Separator between key and value in the plain delimited format.
pub const FIELD_SEPARATOR: char = ':';

/// Separator between fields in the plain delimited format.
pub const LINE_SEPARATOR: char = '\n';
