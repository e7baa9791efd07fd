use crate::{
    Result,
    constants::{
        BLOCK_SIZE, BLOCKS_PER_LARGE_SECTOR, BLOCKS_PER_SECTOR, DATA_START_BLOCK,
        LARGE_SECTOR_START_BLOCK, NOT_AVAILABLE,
    },
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Index of a 16-byte memory block (or logical 4-page block on Ultralight).
pub type BlockIndex = u16;

/// Contents of one memory block.
pub type Block = [u8; BLOCK_SIZE];

/// Shortest UID a card can report (single-size UID).
pub const MIN_UID_LENGTH: usize = 4;

/// Longest UID a card can report (triple-size UID).
pub const MAX_UID_LENGTH: usize = 10;

/// Card unique identifier.
///
/// Rendered as an uppercase hex string without separators (`"04A1B2C3"`),
/// which is also its serialized form. Two sessions refer to the same card
/// exactly when their UIDs compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uid(Vec<u8>);

impl Uid {
    /// Create a UID from raw bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if the length is not 4-10 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let len = bytes.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::InvalidUid(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {len}"
            )));
        }
        Ok(Uid(bytes.to_vec()))
    }

    /// Raw UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Uppercase hex representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Uid {
    type Err = Error;

    /// Accepts plain hex as well as `:`/space separated octets.
    fn from_str(s: &str) -> Result<Self> {
        let cleaned: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | ' ' | '-'))
            .collect();
        let bytes =
            hex::decode(&cleaned).map_err(|e| Error::InvalidUid(format!("'{s}': {e}")))?;
        Uid::from_bytes(&bytes)
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Card product family, derived from SAK or ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardFamily {
    #[serde(rename = "MIFARE_CLASSIC_1K")]
    Classic1K,
    #[serde(rename = "MIFARE_CLASSIC_4K")]
    Classic4K,
    #[serde(rename = "MIFARE_ULTRALIGHT")]
    Ultralight,
    #[serde(rename = "MIFARE_DESFIRE")]
    DesFire,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl CardFamily {
    /// Returns `true` for families that use sector authentication.
    #[inline]
    #[must_use]
    pub fn is_classic(self) -> bool {
        matches!(self, CardFamily::Classic1K | CardFamily::Classic4K)
    }

    /// Returns `true` for page-addressed families.
    #[inline]
    #[must_use]
    pub fn is_page_addressed(self) -> bool {
        matches!(self, CardFamily::Ultralight)
    }
}

impl fmt::Display for CardFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CardFamily::Classic1K => write!(f, "Mifare Classic 1K"),
            CardFamily::Classic4K => write!(f, "Mifare Classic 4K"),
            CardFamily::Ultralight => write!(f, "Mifare Ultralight"),
            CardFamily::DesFire => write!(f, "Mifare DESFire"),
            CardFamily::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Contactless air interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Technology {
    #[default]
    #[serde(rename = "ISO14443-A")]
    Iso14443A,
    #[serde(rename = "ISO14443-B")]
    Iso14443B,
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Technology::Iso14443A => write!(f, "ISO14443-A"),
            Technology::Iso14443B => write!(f, "ISO14443-B"),
        }
    }
}

/// Result of card identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub family: CardFamily,
    pub technology: Technology,
    /// Total memory in bytes, `None` when the family has no fixed size.
    pub size_estimate: Option<usize>,
    /// Number of sectors (logical sectors on Ultralight), `None` when variable.
    pub sector_count: Option<u16>,
}

impl CardInfo {
    /// Identification result for a card nothing could be learned about.
    #[must_use]
    pub fn unknown() -> Self {
        CardInfo {
            family: CardFamily::Unknown,
            technology: Technology::Iso14443A,
            size_estimate: None,
            sector_count: None,
        }
    }

    /// Standard figures for a family.
    #[must_use]
    pub fn for_family(family: CardFamily) -> Self {
        let (size_estimate, sector_count) = match family {
            CardFamily::Classic1K => (Some(1024), Some(16)),
            CardFamily::Classic4K => (Some(4096), Some(40)),
            CardFamily::Ultralight => (Some(64), Some(4)),
            CardFamily::DesFire | CardFamily::Unknown => (None, None),
        };
        CardInfo {
            family,
            technology: Technology::Iso14443A,
            size_estimate,
            sector_count,
        }
    }
}

impl Default for CardInfo {
    fn default() -> Self {
        CardInfo::unknown()
    }
}

/// Memory geometry used by block I/O.
///
/// Classic cards are addressed in 16-byte blocks grouped into sectors whose
/// last block is a trailer. Ultralight cards are addressed in 4-byte pages;
/// one logical block covers four pages, so logical block `n` starts at page
/// `4 * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLayout {
    /// First logical block carrying payload data.
    pub data_start: BlockIndex,
    /// Number of addressable logical blocks.
    pub total_blocks: BlockIndex,
    /// Whether sector trailers interrupt the data area.
    pub has_sector_trailers: bool,
    /// Whether the card is addressed in 4-byte pages.
    pub page_addressed: bool,
}

impl CardLayout {
    /// Layout for a Classic card with the given number of sectors.
    #[must_use]
    pub fn classic(sectors: u16) -> Self {
        let small = sectors.min(32);
        let large = sectors.saturating_sub(32);
        CardLayout {
            data_start: DATA_START_BLOCK,
            total_blocks: small * BLOCKS_PER_SECTOR + large * BLOCKS_PER_LARGE_SECTOR,
            has_sector_trailers: true,
            page_addressed: false,
        }
    }

    /// Layout for a page-addressed Ultralight card.
    #[must_use]
    pub fn ultralight() -> Self {
        CardLayout {
            data_start: 1,
            total_blocks: 4,
            has_sector_trailers: false,
            page_addressed: true,
        }
    }

    /// Derive the layout from an identification result.
    ///
    /// Families without a known memory map (DESFire, Unknown) fall back to the
    /// Classic 1K layout, which is what most readers emulate for them.
    #[must_use]
    pub fn for_card(info: &CardInfo) -> Self {
        match info.family {
            CardFamily::Ultralight => CardLayout::ultralight(),
            CardFamily::Classic1K | CardFamily::Classic4K => {
                CardLayout::classic(info.sector_count.unwrap_or(16))
            }
            CardFamily::DesFire | CardFamily::Unknown => CardLayout::classic(16),
        }
    }

    /// Returns `true` if `index` is a sector trailer in this layout.
    #[must_use]
    pub fn is_sector_trailer(&self, index: BlockIndex) -> bool {
        self.has_sector_trailers && is_sector_trailer(index)
    }

    /// First block of the sector containing `index`.
    #[must_use]
    pub fn sector_first_block(&self, index: BlockIndex) -> BlockIndex {
        if index < LARGE_SECTOR_START_BLOCK {
            index - index % BLOCKS_PER_SECTOR
        } else {
            index - index % BLOCKS_PER_LARGE_SECTOR
        }
    }

    /// Data block indices in write order, starting at the data area and
    /// skipping sector trailers.
    pub fn data_blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        (self.data_start..self.total_blocks).filter(|&i| !self.is_sector_trailer(i))
    }

    /// Number of payload bytes the data area can hold.
    #[must_use]
    pub fn data_capacity(&self) -> usize {
        self.data_blocks().count() * BLOCK_SIZE
    }

    /// Returns `true` if `index` is addressable in this layout.
    #[must_use]
    pub fn contains(&self, index: BlockIndex) -> bool {
        index < self.total_blocks
    }
}

/// Returns `true` if `index` is a Classic sector trailer.
///
/// Sectors 0-31 have 4 blocks, sectors 32-39 (Classic 4K only) have 16.
#[must_use]
pub fn is_sector_trailer(index: BlockIndex) -> bool {
    if index < LARGE_SECTOR_START_BLOCK {
        index % BLOCKS_PER_SECTOR == BLOCKS_PER_SECTOR - 1
    } else {
        index % BLOCKS_PER_LARGE_SECTOR == BLOCKS_PER_LARGE_SECTOR - 1
    }
}

/// One block as read from the card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub index: BlockIndex,
    pub data: Block,
    pub readable: bool,
    pub error: Option<String>,
}

impl MemoryBlock {
    /// A successfully read block.
    #[must_use]
    pub fn readable(index: BlockIndex, data: Block) -> Self {
        MemoryBlock {
            index,
            data,
            readable: true,
            error: None,
        }
    }

    /// A block whose read failed.
    #[must_use]
    pub fn failed(index: BlockIndex, error: impl Into<String>) -> Self {
        MemoryBlock {
            index,
            data: [0u8; BLOCK_SIZE],
            readable: false,
            error: Some(error.into()),
        }
    }

    /// Returns `true` if the block read successfully and holds only zeros.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.readable && self.data.iter().all(|&b| b == 0)
    }
}

/// Card currently in the reader field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSession {
    pub uid: Uid,
    pub info: CardInfo,
    #[serde(with = "hex_bytes")]
    pub atr: Vec<u8>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CardSession {
    #[must_use]
    pub fn new(uid: Uid, info: CardInfo, atr: Vec<u8>) -> Self {
        let now = Utc::now();
        CardSession {
            uid,
            info,
            atr,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Record that the card answered another poll.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Field of a license record, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenseField {
    HolderName,
    Mobile,
    City,
    LicenseType,
    LicenseNumber,
    CardNumber,
    ValidUntil,
}

impl LicenseField {
    /// All fields in the order they are written to a card.
    pub const ALL: [LicenseField; 7] = [
        LicenseField::HolderName,
        LicenseField::Mobile,
        LicenseField::City,
        LicenseField::LicenseType,
        LicenseField::LicenseNumber,
        LicenseField::CardNumber,
        LicenseField::ValidUntil,
    ];

    /// Key used in the plain delimited format.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            LicenseField::HolderName => "NAME",
            LicenseField::Mobile => "MOBILE",
            LicenseField::City => "CITY",
            LicenseField::LicenseType => "TYPE",
            LicenseField::LicenseNumber => "LICENSE",
            LicenseField::CardNumber => "CARD",
            LicenseField::ValidUntil => "VALID",
        }
    }

    /// Look a field up by its plain-format key (case-sensitive).
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        LicenseField::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Field following this one in wire order.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let pos = LicenseField::ALL.iter().position(|&f| f == self)?;
        LicenseField::ALL.get(pos + 1).copied()
    }
}

impl fmt::Display for LicenseField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// EV license record stored on a card.
///
/// Every field is optional. A missing field serializes as `"N/A"`, and `"N/A"`
/// deserializes back to `None`, so a partially recovered record never hides
/// the fields that did survive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    #[serde(default, with = "not_available")]
    pub holder_name: Option<String>,
    #[serde(default, with = "not_available")]
    pub mobile: Option<String>,
    #[serde(default, with = "not_available")]
    pub city: Option<String>,
    #[serde(default, with = "not_available")]
    pub license_type: Option<String>,
    #[serde(default, with = "not_available")]
    pub license_number: Option<String>,
    #[serde(default, with = "not_available")]
    pub card_number: Option<String>,
    #[serde(default, with = "not_available")]
    pub valid_until: Option<String>,
}

impl LicenseRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder style. Empty and `"N/A"` values leave it unset.
    #[must_use]
    pub fn with(mut self, field: LicenseField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field. Empty and `"N/A"` values clear it.
    pub fn set(&mut self, field: LicenseField, value: impl Into<String>) {
        let value = value.into();
        let value = if value.is_empty() || value == NOT_AVAILABLE {
            None
        } else {
            Some(value)
        };
        *self.slot_mut(field) = value;
    }

    /// Field value, `None` when missing.
    #[must_use]
    pub fn get(&self, field: LicenseField) -> Option<&str> {
        match field {
            LicenseField::HolderName => self.holder_name.as_deref(),
            LicenseField::Mobile => self.mobile.as_deref(),
            LicenseField::City => self.city.as_deref(),
            LicenseField::LicenseType => self.license_type.as_deref(),
            LicenseField::LicenseNumber => self.license_number.as_deref(),
            LicenseField::CardNumber => self.card_number.as_deref(),
            LicenseField::ValidUntil => self.valid_until.as_deref(),
        }
    }

    /// Field value for presentation, `"N/A"` when missing.
    #[must_use]
    pub fn display(&self, field: LicenseField) -> &str {
        self.get(field).unwrap_or(NOT_AVAILABLE)
    }

    /// Number of populated fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        LicenseField::ALL
            .iter()
            .filter(|&&f| self.get(f).is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    fn slot_mut(&mut self, field: LicenseField) -> &mut Option<String> {
        match field {
            LicenseField::HolderName => &mut self.holder_name,
            LicenseField::Mobile => &mut self.mobile,
            LicenseField::City => &mut self.city,
            LicenseField::LicenseType => &mut self.license_type,
            LicenseField::LicenseNumber => &mut self.license_number,
            LicenseField::CardNumber => &mut self.card_number,
            LicenseField::ValidUntil => &mut self.valid_until,
        }
    }
}

mod not_available {
    use crate::constants::NOT_AVAILABLE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or(NOT_AVAILABLE))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.filter(|v| !v.is_empty() && v != NOT_AVAILABLE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("04A1B2C3", &[0x04, 0xA1, 0xB2, 0xC3])]
    #[case("04:a1:b2:c3", &[0x04, 0xA1, 0xB2, 0xC3])]
    #[case("04 11 22 33 44 55 66", &[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])]
    fn test_uid_parse(#[case] input: &str, #[case] expected: &[u8]) {
        let uid: Uid = input.parse().unwrap();
        assert_eq!(uid.as_bytes(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("0102")] // too short
    #[case("0102030405060708090A0B")] // too long
    #[case("ZZZZZZZZ")] // not hex
    fn test_uid_invalid(#[case] input: &str) {
        assert!(input.parse::<Uid>().is_err());
    }

    #[test]
    fn test_uid_display_uppercase() {
        let uid = Uid::from_bytes(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(uid.to_string(), "DEADBEEF");
        assert_eq!(serde_json::to_string(&uid).unwrap(), "\"DEADBEEF\"");
    }

    #[rstest]
    #[case(3, true)]
    #[case(7, true)]
    #[case(4, false)]
    #[case(126, false)]
    #[case(127, true)]
    #[case(128, false)]
    #[case(142, false)]
    #[case(143, true)]
    #[case(255, true)]
    fn test_sector_trailer(#[case] index: u16, #[case] expected: bool) {
        assert_eq!(is_sector_trailer(index), expected);
    }

    #[test]
    fn test_classic_data_blocks_skip_trailers() {
        let layout = CardLayout::classic(16);
        let blocks: Vec<u16> = layout.data_blocks().take(7).collect();
        assert_eq!(blocks, vec![4, 5, 6, 8, 9, 10, 12]);
        assert_eq!(layout.total_blocks, 64);
        // 15 sectors of 3 data blocks
        assert_eq!(layout.data_capacity(), 45 * 16);
    }

    #[test]
    fn test_classic_4k_layout() {
        let layout = CardLayout::for_card(&CardInfo::for_family(CardFamily::Classic4K));
        assert_eq!(layout.total_blocks, 256);
        assert_eq!(layout.sector_first_block(130), 128);
        assert_eq!(layout.sector_first_block(9), 8);
    }

    #[test]
    fn test_ultralight_layout() {
        let layout = CardLayout::for_card(&CardInfo::for_family(CardFamily::Ultralight));
        assert!(layout.page_addressed);
        assert!(!layout.is_sector_trailer(3));
        assert_eq!(layout.data_blocks().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_memory_block_blank() {
        assert!(MemoryBlock::readable(4, [0; 16]).is_blank());
        assert!(!MemoryBlock::readable(4, [1; 16]).is_blank());
        assert!(!MemoryBlock::failed(4, "auth failed").is_blank());
    }

    #[test]
    fn test_license_field_order() {
        let keys: Vec<&str> = LicenseField::ALL.iter().map(|f| f.key()).collect();
        assert_eq!(
            keys,
            vec!["NAME", "MOBILE", "CITY", "TYPE", "LICENSE", "CARD", "VALID"]
        );
        assert_eq!(LicenseField::City.next(), Some(LicenseField::LicenseType));
        assert_eq!(LicenseField::ValidUntil.next(), None);
        assert_eq!(LicenseField::from_key("CARD"), Some(LicenseField::CardNumber));
        assert_eq!(LicenseField::from_key("card"), None);
    }

    #[test]
    fn test_license_record_not_available() {
        let record = LicenseRecord::new()
            .with(LicenseField::HolderName, "Alice")
            .with(LicenseField::City, "N/A")
            .with(LicenseField::Mobile, "");

        assert_eq!(record.display(LicenseField::HolderName), "Alice");
        assert_eq!(record.display(LicenseField::City), "N/A");
        assert_eq!(record.get(LicenseField::Mobile), None);
        assert_eq!(record.field_count(), 1);
    }

    #[test]
    fn test_license_record_serde() {
        let record = LicenseRecord::new().with(LicenseField::LicenseNumber, "EV-123");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["licenseNumber"], "EV-123");
        assert_eq!(json["holderName"], "N/A");

        let back: LicenseRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_card_family_serde_names() {
        assert_eq!(
            serde_json::to_string(&CardFamily::Classic1K).unwrap(),
            "\"MIFARE_CLASSIC_1K\""
        );
        assert_eq!(Technology::Iso14443A.to_string(), "ISO14443-A");
    }
}
