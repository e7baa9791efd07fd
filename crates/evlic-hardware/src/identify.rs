//! Card identification from SAK or ATR bytes.
//!
//! # SAK table
//!
//! | SAK | Family | Sectors |
//! |-----|--------|---------|
//! | `0x08` | Classic 1K | 16 |
//! | `0x09` | Classic Mini (1K layout) | 5 |
//! | `0x18` | Classic 4K | 40 |
//! | `0x00` | Ultralight | 4 logical |
//! | `0x20` | DESFire | variable |
//!
//! ATRs are matched against the PC/SC part 3 card-name bytes first and a
//! table of known prefixes second. Identification never fails; anything
//! inconclusive is `Unknown` over ISO14443-A.

use evlic_core::{CardFamily, CardInfo, Technology};
use tracing::debug;

use crate::apdu::{PN532_DEVICE, PN532_IN_LIST_PASSIVE_TARGET};
use crate::{HardwareError, Result};

/// Raw identification input, as delivered by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawIdentity<'a> {
    /// Select acknowledge byte from anticollision.
    Sak(u8),
    /// Answer-to-reset built by the PC/SC driver.
    Atr(&'a [u8]),
}

/// Classify a card. Never fails.
#[must_use]
pub fn identify(raw: RawIdentity<'_>) -> CardInfo {
    let info = match raw {
        RawIdentity::Sak(sak) => identify_sak(sak),
        RawIdentity::Atr(atr) => identify_atr(atr),
    };
    debug!(?raw, family = %info.family, "Card identified");
    info
}

/// Classify a card from its SAK byte.
#[must_use]
pub fn identify_sak(sak: u8) -> CardInfo {
    match sak {
        0x08 => CardInfo::for_family(CardFamily::Classic1K),
        0x09 => CardInfo {
            size_estimate: Some(320),
            sector_count: Some(5),
            ..CardInfo::for_family(CardFamily::Classic1K)
        },
        0x18 => CardInfo::for_family(CardFamily::Classic4K),
        0x00 => CardInfo::for_family(CardFamily::Ultralight),
        0x20 => CardInfo::for_family(CardFamily::DesFire),
        _ => CardInfo::unknown(),
    }
}

/// Known ATR prefixes that the card-name bytes do not cover.
const ATR_PREFIXES: &[(&str, CardFamily)] = &[
    ("3B8180018080", CardFamily::DesFire),
    ("3B8F8001804F0CA0000003060300", CardFamily::Unknown),
];

/// Offset of the PC/SC part 3 standard byte in a storage-card ATR.
const ATR_STANDARD_OFFSET: usize = 12;

/// Offset of the two card-name bytes.
const ATR_CARD_NAME_OFFSET: usize = 13;

/// Classify a card from its ATR.
#[must_use]
pub fn identify_atr(atr: &[u8]) -> CardInfo {
    let technology = match atr.get(ATR_STANDARD_OFFSET) {
        Some(0x05..=0x07) => Technology::Iso14443B,
        _ => Technology::Iso14443A,
    };

    let name = atr
        .get(ATR_CARD_NAME_OFFSET..ATR_CARD_NAME_OFFSET + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]));

    let info = match name {
        Some(0x0001) => CardInfo::for_family(CardFamily::Classic1K),
        Some(0x0002) => CardInfo::for_family(CardFamily::Classic4K),
        Some(0x0003) => CardInfo::for_family(CardFamily::Ultralight),
        Some(0x0026) => identify_sak(0x09),
        _ => {
            let hex = hex::encode_upper(atr);
            ATR_PREFIXES
                .iter()
                .find(|(prefix, _)| hex.starts_with(prefix))
                .map_or_else(CardInfo::unknown, |(_, family)| {
                    CardInfo::for_family(*family)
                })
        }
    };

    CardInfo { technology, ..info }
}

/// One target reported by `InListPassiveTarget`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveTarget {
    pub atqa: [u8; 2],
    pub sak: u8,
    pub uid: Vec<u8>,
}

/// Parse the data of an `InListPassiveTarget` response (status word removed).
///
/// ```text
/// D5 4B NbTg Tg ATQA(2) SAK UIDlen UID...
/// ```
///
/// Returns `Ok(None)` when the reader found no target.
///
/// # Errors
/// Returns `InvalidResponse` for anything that is not a well-formed reply.
pub fn parse_passive_target(data: &[u8]) -> Result<Option<PassiveTarget>> {
    match data {
        [PN532_DEVICE, code, 0x00, ..] if *code == PN532_IN_LIST_PASSIVE_TARGET + 1 => Ok(None),
        [PN532_DEVICE, code, _, _, a0, a1, sak, len, rest @ ..]
            if *code == PN532_IN_LIST_PASSIVE_TARGET + 1 =>
        {
            let len = *len as usize;
            let uid = rest.get(..len).ok_or_else(|| {
                HardwareError::invalid_response(format!(
                    "target UID of {len} bytes truncated to {}",
                    rest.len()
                ))
            })?;
            Ok(Some(PassiveTarget {
                atqa: [*a0, *a1],
                sak: *sak,
                uid: uid.to_vec(),
            }))
        }
        _ => Err(HardwareError::invalid_response(format!(
            "malformed passive target reply [{}]",
            hex::encode_upper(data)
        ))),
    }
}
