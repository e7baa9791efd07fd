//! Block-level reads and writes on the card in the field.
//!
//! Classic cards authenticate per sector with key A before any access; the
//! last authenticated sector is cached until a failure or a sector change.
//! Ultralight cards are page addressed: logical block `n` spans pages
//! `4n..4n+3` and needs no authentication.
//!
//! Range reads isolate failures so one bad block never hides the rest.
//! Range writes clear the old footprint first so stale bytes from a longer
//! previous payload cannot trail the new one.

use evlic_core::{
    Block, BlockIndex, CardLayout, MemoryBlock,
    constants::{
        BLOCK_SIZE, MAX_CONSECUTIVE_READ_FAILURES, MIN_CLEAR_BLOCKS, PAGE_SIZE, PAGES_PER_BLOCK,
        READ_FAILURE_GRACE_BLOCKS,
    },
};
use tracing::{debug, trace, warn};

use crate::apdu;
use crate::session::Link;
use crate::{HardwareError, Result};

/// Block reader/writer bound to one locked session.
pub struct BlockIo<'l, 'a> {
    link: &'l mut Link<'a>,
    layout: CardLayout,
    key_a: [u8; 6],
    key_loaded: bool,
    authenticated: Option<BlockIndex>,
}

impl<'l, 'a> BlockIo<'l, 'a> {
    #[must_use]
    pub fn new(link: &'l mut Link<'a>, layout: CardLayout, key_a: [u8; 6]) -> Self {
        Self {
            link,
            layout,
            key_a,
            key_loaded: false,
            authenticated: None,
        }
    }

    /// Geometry in use.
    #[must_use]
    pub fn layout(&self) -> &CardLayout {
        &self.layout
    }

    fn address(index: BlockIndex, page_addressed: bool) -> Option<u8> {
        let address = if page_addressed {
            index.checked_mul(PAGES_PER_BLOCK as BlockIndex)?
        } else {
            index
        };
        u8::try_from(address).ok()
    }

    /// Authenticate the sector holding `index`. `Ok(false)` means the card
    /// rejected the key.
    async fn authenticate(&mut self, index: BlockIndex) -> Result<bool> {
        let sector = self.layout.sector_first_block(index);
        if self.authenticated == Some(sector) {
            return Ok(true);
        }
        self.authenticated = None;

        if !self.key_loaded {
            let response = self.link.transmit(&apdu::load_key(&self.key_a)).await?;
            if !response.is_success() {
                debug!(status = %response.status(), "Load key rejected");
                return Ok(false);
            }
            self.key_loaded = true;
        }

        let Ok(block) = u8::try_from(sector) else {
            return Ok(false);
        };
        let response = self.link.transmit(&apdu::authenticate(block)).await?;
        if response.is_success() {
            trace!(sector = block, "Sector authenticated");
            self.authenticated = Some(sector);
            Ok(true)
        } else {
            debug!(sector = block, status = %response.status(), "Authentication failed");
            Ok(false)
        }
    }

    /// Read one logical block.
    ///
    /// # Errors
    /// - `BlockRead` when the block is outside the card, authentication
    ///   fails, or the card rejects the read
    /// - transport errors (`Timeout`, `DeviceIo`, ...) unchanged
    pub async fn read_block(&mut self, index: BlockIndex) -> Result<Block> {
        let page_addressed = self.layout.page_addressed;
        let Some(address) = self
            .layout
            .contains(index)
            .then(|| Self::address(index, page_addressed))
            .flatten()
        else {
            return Err(HardwareError::block_read(index, "outside card memory"));
        };

        if !page_addressed && !self.authenticate(index).await? {
            return Err(HardwareError::block_read(index, "authentication failed"));
        }

        let response = self.link.transmit(&apdu::read_binary(address)).await?;
        if !response.is_success() {
            self.authenticated = None;
            return Err(HardwareError::block_read(
                index,
                format!("status {}", response.status()),
            ));
        }
        let data = response.data.get(..BLOCK_SIZE).ok_or_else(|| {
            HardwareError::block_read(
                index,
                format!("short read of {} bytes", response.data.len()),
            )
        })?;

        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(data);
        Ok(block)
    }

    /// Write one logical block of the data area.
    ///
    /// # Errors
    /// - `BlockWrite` for sector trailers, blocks outside the data area,
    ///   failed authentication, or a status other than `90 00`
    /// - transport errors unchanged
    pub async fn write_block(&mut self, index: BlockIndex, data: &Block) -> Result<()> {
        if self.layout.is_sector_trailer(index) {
            return Err(HardwareError::block_write(index, "sector trailers are never written"));
        }
        let page_addressed = self.layout.page_addressed;
        let Some(address) = (self.layout.contains(index) && index >= self.layout.data_start)
            .then(|| Self::address(index, page_addressed))
            .flatten()
        else {
            return Err(HardwareError::block_write(index, "outside data area"));
        };

        if page_addressed {
            for (offset, page) in data.chunks(PAGE_SIZE).enumerate() {
                let command = apdu::update_binary(address + offset as u8, page);
                let response = self.link.transmit(&command).await?;
                if !response.is_success() {
                    return Err(HardwareError::block_write(
                        index,
                        format!("page {} status {}", address as usize + offset, response.status()),
                    ));
                }
            }
            return Ok(());
        }

        if !self.authenticate(index).await? {
            return Err(HardwareError::block_write(index, "authentication failed"));
        }
        let response = self
            .link
            .transmit(&apdu::update_binary(address, data))
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            self.authenticated = None;
            Err(HardwareError::block_write(
                index,
                format!("status {}", response.status()),
            ))
        }
    }

    /// Read `count` blocks starting at `start`, clamped to the card.
    ///
    /// Every block gets an entry; failed ones are marked unreadable. The scan
    /// stops early once more than three consecutive blocks fail, counting
    /// only blocks past the first four of the range that are not sector
    /// trailers.
    ///
    /// # Errors
    /// Only `DeviceIo`/`NoDevice` abort the scan.
    pub async fn read_range(&mut self, start: BlockIndex, count: u16) -> Result<Vec<MemoryBlock>> {
        let end = start.saturating_add(count).min(self.layout.total_blocks);
        self.scan(start, end, false).await
    }

    /// Read the payload from the data area, at most `max_data_blocks` data
    /// blocks and never past the end of the card.
    ///
    /// Stops after the first readable all-zero data block, where assembly
    /// stops too.
    ///
    /// # Errors
    /// See [`read_range`](Self::read_range).
    pub async fn read_payload(&mut self, max_data_blocks: usize) -> Result<Vec<MemoryBlock>> {
        let start = self.layout.data_start;
        let end = match max_data_blocks.checked_sub(1) {
            Some(last) => self
                .layout
                .data_blocks()
                .nth(last)
                .map_or(self.layout.total_blocks, |index| index + 1),
            None => start,
        };
        self.scan(start, end, true).await
    }

    async fn scan(
        &mut self,
        start: BlockIndex,
        end: BlockIndex,
        stop_at_blank: bool,
    ) -> Result<Vec<MemoryBlock>> {
        let mut blocks = Vec::with_capacity(end.saturating_sub(start) as usize);
        let mut consecutive_failures = 0usize;

        for (position, index) in (start..end).enumerate() {
            match self.read_block(index).await {
                Ok(data) => {
                    consecutive_failures = 0;
                    blocks.push(MemoryBlock::readable(index, data));
                    if stop_at_blank
                        && !self.layout.is_sector_trailer(index)
                        && data.iter().all(|&b| b == 0)
                    {
                        trace!(block = index, "Blank data block, payload ends");
                        break;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    trace!(block = index, error = %e, "Block unreadable");
                    blocks.push(MemoryBlock::failed(index, e.to_string()));
                    if self.layout.is_sector_trailer(index) || position < READ_FAILURE_GRACE_BLOCKS
                    {
                        continue;
                    }
                    consecutive_failures += 1;
                    if consecutive_failures > MAX_CONSECUTIVE_READ_FAILURES {
                        warn!(
                            block = index,
                            failures = consecutive_failures,
                            "Stopping read after consecutive failures"
                        );
                        break;
                    }
                }
            }
        }

        Ok(blocks)
    }

    /// Write `blocks` onto consecutive data blocks from `start`, skipping
    /// sector trailers. Returns the indices written, in order.
    ///
    /// The first `max(8, blocks.len())` data blocks are zeroed first; a
    /// failed clear is logged and skipped.
    ///
    /// # Errors
    /// - `Codec(PayloadTooLarge)` when the data area is too small
    /// - `BlockWrite { block }` for the first block that fails
    pub async fn write_range(
        &mut self,
        start: BlockIndex,
        blocks: &[Block],
    ) -> Result<Vec<BlockIndex>> {
        let targets: Vec<BlockIndex> = self
            .layout
            .data_blocks()
            .filter(|&index| index >= start)
            .collect();
        if blocks.len() > targets.len() {
            return Err(evlic_core::Error::PayloadTooLarge {
                size: blocks.len() * BLOCK_SIZE,
                max: targets.len() * BLOCK_SIZE,
            }
            .into());
        }

        let footprint = blocks.len().max(MIN_CLEAR_BLOCKS).min(targets.len());
        let zero = [0u8; BLOCK_SIZE];
        for &index in &targets[..footprint] {
            match self.write_block(index, &zero).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(block = index, error = %e, "Clearing block failed"),
            }
        }

        for (&index, block) in targets.iter().zip(blocks) {
            self.write_block(index, block).await.map_err(|e| match e {
                e @ (HardwareError::BlockWrite { .. }
                | HardwareError::DeviceIo { .. }
                | HardwareError::NoDevice) => e,
                other => HardwareError::block_write(index, other.to_string()),
            })?;
        }

        let written = targets[..blocks.len()].to_vec();
        debug!(start, count = written.len(), "Blocks written");
        Ok(written)
    }
}
