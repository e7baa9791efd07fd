//! Simulated contactless cards for the mock reader.

use std::collections::HashSet;

use evlic_core::{
    BlockIndex, CardFamily, CardInfo, CardLayout,
    constants::{BLOCK_SIZE, DEFAULT_KEY_A, PAGE_SIZE},
    is_sector_trailer,
};

/// Access bits written into fresh sector trailers (transport configuration).
const TRANSPORT_ACCESS_BITS: [u8; 4] = [0xFF, 0x07, 0x80, 0x69];

/// Pages on an Ultralight card.
const ULTRALIGHT_PAGES: usize = 16;

/// A card that can be placed in the mock reader's field.
///
/// Memory is kept flat: 16-byte blocks for Classic cards, 4-byte pages for
/// Ultralight. Individual blocks can be made to fail on read or write.
///
/// # Examples
///
/// ```
/// use evlic_hardware::mock::MockCard;
///
/// let card = MockCard::classic_1k(&[0x04, 0xA1, 0xB2, 0xC3])
///     .with_data(b"NAME:Alice")
///     .fail_reads([7, 11]);
/// assert_eq!(&card.block(4)[..10], b"NAME:Alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCard {
    pub uid: Vec<u8>,
    pub sak: u8,
    pub atqa: [u8; 2],
    pub family: CardFamily,
    key_a: [u8; 6],
    memory: Vec<u8>,
    failing_reads: HashSet<BlockIndex>,
    failing_writes: HashSet<BlockIndex>,
}

impl MockCard {
    fn new(uid: &[u8], sak: u8, atqa: [u8; 2], family: CardFamily, memory: Vec<u8>) -> Self {
        Self {
            uid: uid.to_vec(),
            sak,
            atqa,
            family,
            key_a: DEFAULT_KEY_A,
            memory,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
        }
    }

    /// Mifare Classic 1K with factory trailers.
    #[must_use]
    pub fn classic_1k(uid: &[u8]) -> Self {
        Self::new(uid, 0x08, [0x00, 0x04], CardFamily::Classic1K, classic_memory(64))
    }

    /// Mifare Classic 4K with factory trailers.
    #[must_use]
    pub fn classic_4k(uid: &[u8]) -> Self {
        Self::new(uid, 0x18, [0x00, 0x02], CardFamily::Classic4K, classic_memory(256))
    }

    /// Mifare Ultralight (16 pages).
    #[must_use]
    pub fn ultralight(uid: &[u8]) -> Self {
        Self::new(
            uid,
            0x00,
            [0x00, 0x44],
            CardFamily::Ultralight,
            vec![0u8; ULTRALIGHT_PAGES * PAGE_SIZE],
        )
    }

    /// A card with a SAK the reader does not know; memory is laid out like a
    /// Classic 1K.
    #[must_use]
    pub fn with_unknown_sak(uid: &[u8], sak: u8) -> Self {
        Self::new(uid, sak, [0x00, 0x04], CardFamily::Unknown, classic_memory(64))
    }

    /// Store `payload` in the data area, skipping sector trailers.
    #[must_use]
    pub fn with_data(mut self, payload: &[u8]) -> Self {
        let layout = self.layout();
        for (index, chunk) in layout.data_blocks().zip(payload.chunks(BLOCK_SIZE)) {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            self.store(index, &block);
        }
        self
    }

    /// Require a non-default key A for every sector.
    #[must_use]
    pub fn with_key(mut self, key: [u8; 6]) -> Self {
        self.key_a = key;
        self
    }

    /// Make reads of the given blocks fail.
    #[must_use]
    pub fn fail_reads(mut self, blocks: impl IntoIterator<Item = BlockIndex>) -> Self {
        self.failing_reads.extend(blocks);
        self
    }

    /// Make writes to the given blocks fail.
    #[must_use]
    pub fn fail_writes(mut self, blocks: impl IntoIterator<Item = BlockIndex>) -> Self {
        self.failing_writes.extend(blocks);
        self
    }

    /// Geometry used by the reader to address this card.
    #[must_use]
    pub fn layout(&self) -> CardLayout {
        CardLayout::for_card(&CardInfo::for_family(self.family))
    }

    /// Raw contents of a logical block (trailer keys included).
    #[must_use]
    pub fn block(&self, index: BlockIndex) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        let start = index as usize * BLOCK_SIZE;
        if let Some(src) = self.memory.get(start..start + BLOCK_SIZE) {
            out.copy_from_slice(src);
        }
        out
    }

    pub(crate) fn key_a(&self) -> &[u8; 6] {
        &self.key_a
    }

    pub(crate) fn block_count(&self) -> usize {
        self.memory.len() / BLOCK_SIZE
    }

    pub(crate) fn read_fails(&self, index: BlockIndex) -> bool {
        self.failing_reads.contains(&index)
    }

    pub(crate) fn write_fails(&self, index: BlockIndex) -> bool {
        self.failing_writes.contains(&index)
    }

    /// 16 bytes at a Classic block, with key A masked in trailers.
    pub(crate) fn read_classic(&self, index: BlockIndex) -> Option<[u8; BLOCK_SIZE]> {
        if index as usize >= self.block_count() {
            return None;
        }
        let mut block = self.block(index);
        if is_sector_trailer(index) {
            block[..6].fill(0);
        }
        Some(block)
    }

    /// 16 bytes starting at an Ultralight page, wrapping like the real tag.
    pub(crate) fn read_pages(&self, page: u8) -> Option<[u8; BLOCK_SIZE]> {
        let pages = self.memory.len() / PAGE_SIZE;
        if page as usize >= pages {
            return None;
        }
        let mut out = [0u8; BLOCK_SIZE];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.memory[(page as usize * PAGE_SIZE + i) % self.memory.len()];
        }
        Some(out)
    }

    pub(crate) fn store(&mut self, index: BlockIndex, data: &[u8]) {
        // logical block n covers pages 4n..4n+3 on Ultralight, so both
        // families share the 16-byte stride
        let start = index as usize * BLOCK_SIZE;
        if let Some(dst) = self.memory.get_mut(start..start + data.len()) {
            dst.copy_from_slice(data);
        }
    }

    pub(crate) fn write_page(&mut self, page: u8, data: &[u8]) -> bool {
        let start = page as usize * PAGE_SIZE;
        match self.memory.get_mut(start..start + PAGE_SIZE) {
            Some(dst) if data.len() == PAGE_SIZE => {
                dst.copy_from_slice(data);
                true
            }
            _ => false,
        }
    }
}

fn classic_memory(blocks: usize) -> Vec<u8> {
    let mut memory = vec![0u8; blocks * BLOCK_SIZE];
    for index in 0..blocks {
        if is_sector_trailer(index as BlockIndex) {
            let start = index * BLOCK_SIZE;
            memory[start..start + 6].copy_from_slice(&DEFAULT_KEY_A);
            memory[start + 6..start + 10].copy_from_slice(&TRANSPORT_ACCESS_BITS);
            memory[start + 10..start + 16].copy_from_slice(&DEFAULT_KEY_A);
        }
    }
    memory
}
