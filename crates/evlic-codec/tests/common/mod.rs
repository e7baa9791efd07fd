//! Shared fixtures for codec integration tests.

#![allow(dead_code)]

use evlic_core::{LicenseField, LicenseRecord, MemoryBlock, constants::BLOCK_SIZE};

/// A fully populated record used across tests.
pub fn sample_record() -> LicenseRecord {
    LicenseRecord::new()
        .with(LicenseField::HolderName, "Maria Silva")
        .with(LicenseField::Mobile, "+351-912-000-111")
        .with(LicenseField::City, "Coimbra")
        .with(LicenseField::LicenseType, "Private")
        .with(LicenseField::LicenseNumber, "EV-2025-0042")
        .with(LicenseField::CardNumber, "CARD-7781")
        .with(LicenseField::ValidUntil, "2030-06-30")
}

/// Lay a payload out over Classic data blocks starting at block 4,
/// inserting readable trailers the way a range read returns them.
pub fn classic_blocks(payload: &[u8], trailing_blank: usize) -> Vec<MemoryBlock> {
    let mut blocks = Vec::new();
    let mut index = 4u16;
    let mut chunks = payload.chunks(BLOCK_SIZE).peekable();
    let mut blanks = trailing_blank;

    while chunks.peek().is_some() || blanks > 0 {
        if index % 4 == 3 {
            blocks.push(MemoryBlock::readable(index, [0xFF; BLOCK_SIZE]));
            index += 1;
            continue;
        }
        let mut data = [0u8; BLOCK_SIZE];
        if let Some(chunk) = chunks.next() {
            data[..chunk.len()].copy_from_slice(chunk);
        } else {
            blanks -= 1;
        }
        blocks.push(MemoryBlock::readable(index, data));
        index += 1;
    }
    blocks
}
