//! Integration tests for block I/O over the mock reader.
//!
//! These tests exercise failure isolation on reads and the clear-then-write
//! policy on writes against simulated card memory.

use evlic_core::{CardLayout, constants::DEFAULT_KEY_A};
use evlic_hardware::blocks::BlockIo;
use evlic_hardware::discovery::Discovery;
use evlic_hardware::mock::{MockCard, MockReader, MockReaderHandle};
use evlic_hardware::{HardwareError, Session, SessionConfig};

const UID: [u8; 4] = [0x04, 0xA1, 0xB2, 0xC3];

async fn open(card: MockCard) -> (Session, MockReaderHandle) {
    let (reader, handle) = MockReader::new();
    handle.present_card(card).await;
    let session = Discovery::new()
        .with_mock(reader)
        .open_first(SessionConfig::default())
        .await
        .unwrap();
    (session, handle)
}

#[tokio::test]
async fn test_read_range_isolates_trailer_failures() {
    let (session, _handle) = open(MockCard::classic_1k(&UID).fail_reads([3, 7, 11, 15])).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let blocks = io.read_range(0, 16).await.unwrap();

    assert_eq!(blocks.len(), 16);
    for block in &blocks {
        let trailer = block.index % 4 == 3;
        assert_eq!(block.readable, !trailer, "block {}", block.index);
        assert_eq!(block.error.is_some(), trailer);
    }
}

#[tokio::test]
async fn test_read_range_stops_after_consecutive_failures() {
    let card = MockCard::classic_1k(&UID).fail_reads([8, 9, 10, 11, 12, 13]);
    let (session, _handle) = open(card).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let blocks = io.read_range(4, 20).await.unwrap();

    // 8, 9, 10 fail, trailer 11 does not count, 12 is the fourth failure
    let indices: Vec<_> = blocks.iter().map(|b| b.index).collect();
    assert_eq!(indices, (4..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_read_range_failures_in_first_blocks_do_not_count() {
    let card = MockCard::classic_1k(&UID).fail_reads([4, 5, 6, 8, 9, 10]);
    let (session, _handle) = open(card).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let blocks = io.read_range(4, 12).await.unwrap();

    assert_eq!(blocks.len(), 12);
    assert!(blocks.last().unwrap().readable);
}

#[tokio::test]
async fn test_read_range_clamps_to_card() {
    let (session, _handle) = open(MockCard::classic_1k(&UID)).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let blocks = io.read_range(60, 10).await.unwrap();
    assert_eq!(blocks.len(), 4);
}

#[tokio::test]
async fn test_read_range_aborts_on_device_io() {
    let (session, handle) = open(MockCard::classic_1k(&UID)).await;
    handle.set_connected(false).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let result = io.read_range(4, 8).await;
    assert!(matches!(result, Err(HardwareError::DeviceIo { .. })));
}

#[tokio::test]
async fn test_read_payload_ends_at_blank_block() {
    let card = MockCard::classic_1k(&UID).with_data(&[0xEE; 40]);
    let (session, _handle) = open(card).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    // 40 bytes fill 4, 5 and part of 6; trailer 7 is read but never ends it
    let blocks = io.read_payload(64).await.unwrap();
    let indices: Vec<_> = blocks.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![4, 5, 6, 7, 8]);
    assert_eq!(blocks[4].data, [0; 16]);

    let blocks = io.read_payload(2).await.unwrap();
    let indices: Vec<_> = blocks.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![4, 5]);
}

#[tokio::test]
async fn test_write_range_clears_stale_data() {
    let card = MockCard::classic_1k(&UID).with_data(&[0xEE; 100]);
    let (session, handle) = open(card).await;
    {
        let mut link = session.lock().await;
        let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);
        let written = io.write_range(4, &[[0x11; 16], [0x22; 16]]).await.unwrap();
        assert_eq!(written, vec![4, 5]);
    }

    let card = handle.card().await.unwrap();
    assert_eq!(card.block(4), [0x11; 16]);
    assert_eq!(card.block(5), [0x22; 16]);
    for index in [6, 8, 9, 10, 12, 13] {
        assert_eq!(card.block(index), [0; 16], "block {index} not cleared");
    }
}

#[tokio::test]
async fn test_write_range_skips_trailers() {
    let (session, handle) = open(MockCard::classic_1k(&UID)).await;
    let trailer_before = handle.card().await.unwrap().block(7);
    {
        let mut link = session.lock().await;
        let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);
        let written = io
            .write_range(4, &[[0x01; 16], [0x02; 16], [0x03; 16], [0x04; 16]])
            .await
            .unwrap();
        assert_eq!(written, vec![4, 5, 6, 8]);
    }

    let card = handle.card().await.unwrap();
    assert_eq!(card.block(6), [0x03; 16]);
    assert_eq!(card.block(7), trailer_before);
    assert_eq!(card.block(8), [0x04; 16]);
}

#[tokio::test]
async fn test_write_range_aborts_on_block_failure() {
    let (session, _handle) = open(MockCard::classic_1k(&UID).fail_writes([5])).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let result = io.write_range(4, &[[0xAA; 16], [0xBB; 16], [0xCC; 16]]).await;
    assert!(matches!(result, Err(HardwareError::BlockWrite { block: 5, .. })));
}

#[tokio::test]
async fn test_write_block_rejects_trailer() {
    let (session, _handle) = open(MockCard::classic_1k(&UID)).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    let result = io.write_block(7, &[0; 16]).await;
    assert!(matches!(result, Err(HardwareError::BlockWrite { block: 7, .. })));
}

#[tokio::test]
async fn test_wrong_key_fails_block_access() {
    let card = MockCard::classic_1k(&UID).with_key([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
    let (session, _handle) = open(card).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), DEFAULT_KEY_A);

    assert!(matches!(
        io.read_block(4).await,
        Err(HardwareError::BlockRead { block: 4, .. })
    ));
    assert!(matches!(
        io.write_block(4, &[1; 16]).await,
        Err(HardwareError::BlockWrite { block: 4, .. })
    ));
}

#[tokio::test]
async fn test_configured_key_authenticates() {
    let key = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5];
    let card = MockCard::classic_1k(&UID).with_key(key).with_data(b"keyed");
    let (session, _handle) = open(card).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::classic(16), key);

    let block = io.read_block(4).await.unwrap();
    assert_eq!(&block[..5], b"keyed");
}

#[tokio::test]
async fn test_ultralight_pages() {
    let (session, handle) = open(MockCard::ultralight(&[0x04, 1, 2, 3, 4, 5, 6])).await;
    {
        let mut link = session.lock().await;
        let mut io = BlockIo::new(&mut link, CardLayout::ultralight(), DEFAULT_KEY_A);
        io.write_range(1, &[[0x5A; 16]]).await.unwrap();
        assert_eq!(io.read_block(1).await.unwrap(), [0x5A; 16]);
    }

    // logical block 1 is pages 4..8
    let card = handle.card().await.unwrap();
    assert_eq!(card.block(1), [0x5A; 16]);
}

#[tokio::test]
async fn test_ultralight_payload_too_large() {
    let (session, _handle) = open(MockCard::ultralight(&[0x04, 1, 2, 3, 4, 5, 6])).await;
    let mut link = session.lock().await;
    let mut io = BlockIo::new(&mut link, CardLayout::ultralight(), DEFAULT_KEY_A);

    let result = io.write_range(1, &[[0; 16]; 4]).await;
    assert!(matches!(
        result,
        Err(HardwareError::Codec(evlic_core::Error::PayloadTooLarge { size: 64, max: 48 }))
    ));
}

#[tokio::test]
async fn test_mini_card_layout() {
    let (session, _handle) = open(MockCard::with_unknown_sak(&UID, 0x09)).await;
    let read = session.read_card().await.unwrap();
    assert_eq!(read.card.info.sector_count, Some(5));
    assert_eq!(CardLayout::for_card(&read.card.info).total_blocks, 20);
}
