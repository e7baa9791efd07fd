//! Conversion between card blocks and payload byte streams.

use evlic_core::{Block, CardLayout, MemoryBlock, constants::BLOCK_SIZE};

/// Concatenate blocks in index order into one byte stream.
///
/// Unreadable blocks are skipped. Concatenation stops at the first readable
/// block that is entirely zero, which marks the end of written data.
#[must_use]
pub fn assemble(blocks: &[MemoryBlock]) -> Vec<u8> {
    let mut ordered: Vec<&MemoryBlock> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.index);

    let mut bytes = Vec::with_capacity(ordered.len() * BLOCK_SIZE);
    for block in ordered {
        if !block.readable {
            continue;
        }
        if block.is_blank() {
            break;
        }
        bytes.extend_from_slice(&block.data);
    }
    bytes
}

/// Assemble only the data blocks of `layout`, dropping sector trailers and
/// anything before the data area.
#[must_use]
pub fn assemble_data(blocks: &[MemoryBlock], layout: &CardLayout) -> Vec<u8> {
    let data: Vec<MemoryBlock> = blocks
        .iter()
        .filter(|b| b.index >= layout.data_start && !layout.is_sector_trailer(b.index))
        .cloned()
        .collect();
    assemble(&data)
}

/// Split a payload into zero-padded 16-byte blocks.
#[must_use]
pub fn split_blocks(payload: &[u8]) -> Vec<Block> {
    payload
        .chunks(BLOCK_SIZE)
        .map(|chunk| {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            block
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u16, text: &[u8]) -> MemoryBlock {
        let mut data = [0u8; BLOCK_SIZE];
        data[..text.len()].copy_from_slice(text);
        MemoryBlock::readable(index, data)
    }

    #[test]
    fn test_stops_at_first_blank_block() {
        let blocks = vec![
            block(4, b"NAME:Jo"),
            block(5, b"hn\nMOBI"),
            MemoryBlock::readable(6, [0; BLOCK_SIZE]),
            block(7, b"garbage"),
        ];
        let mut expected = blocks[0].data.to_vec();
        expected.extend_from_slice(&blocks[1].data);
        assert_eq!(assemble(&blocks), expected);
    }

    #[test]
    fn test_orders_by_index_and_skips_unreadable() {
        let blocks = vec![
            block(6, b"C"),
            MemoryBlock::failed(5, "auth failed"),
            block(4, b"A"),
        ];
        let bytes = assemble(&blocks);
        assert_eq!(bytes.len(), 2 * BLOCK_SIZE);
        assert_eq!(bytes[0], b'A');
        assert_eq!(bytes[BLOCK_SIZE], b'C');
    }

    #[test]
    fn test_empty_when_first_block_blank() {
        let blocks = vec![MemoryBlock::readable(4, [0; BLOCK_SIZE]), block(5, b"X")];
        assert!(assemble(&blocks).is_empty());
    }

    #[test]
    fn test_assemble_data_drops_trailers() {
        let layout = CardLayout::classic(16);
        let blocks = vec![
            block(4, b"A"),
            block(7, &[0xFF; 6]), // trailer with key bytes
            block(8, b"B"),
        ];
        let bytes = assemble_data(&blocks, &layout);
        assert_eq!(bytes.len(), 2 * BLOCK_SIZE);
        assert_eq!(bytes[BLOCK_SIZE], b'B');
    }

    #[test]
    fn test_split_pads_last_block() {
        let blocks = split_blocks(&[1u8; 20]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1][..4], [1, 1, 1, 1]);
        assert_eq!(blocks[1][4..], [0u8; 12]);
        assert!(split_blocks(&[]).is_empty());
    }
}
