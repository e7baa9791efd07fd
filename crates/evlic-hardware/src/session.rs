//! Reader session.
//!
//! A [`Session`] owns the transport to the single active reader. All device
//! I/O goes through [`Session::lock`], a fair FIFO lock, and every caller
//! holds it for a whole APDU sequence. A poll tick and an explicit read can
//! therefore never interleave commands, and sector authentication stays
//! intact. An explicit operation that arrives during a poll tick waits for
//! the tick to finish.

use std::time::Duration;

use evlic_codec::{Decoded, assemble_data, decode, split_blocks};
use evlic_core::{
    BlockIndex, CardInfo, CardLayout, MemoryBlock, Uid,
    constants::{BLOCK_SIZE, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_KEY_A, DEFAULT_MAX_DATA_BLOCKS},
};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::apdu::{self, Command, Response};
use crate::blocks::BlockIo;
use crate::devices::AnyTransport;
use crate::identify::{RawIdentity, identify, parse_passive_target};
use crate::front_end;
use crate::transport::ReaderTransport;
use crate::types::{LedColor, ReaderDevice};
use crate::{HardwareError, Result};

/// Firmware recorded when the reader does not report one.
pub const UNKNOWN_FIRMWARE: &str = "unknown";

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for each explicit command/response exchange.
    pub command_timeout: Duration,
    /// Key A used to authenticate Classic sectors.
    pub key_a: [u8; 6],
    /// Payload limit in data blocks. Writes above it are rejected, so
    /// anything written reads back whole.
    pub max_data_blocks: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            key_a: DEFAULT_KEY_A,
            max_data_blocks: DEFAULT_MAX_DATA_BLOCKS,
        }
    }
}

/// A card found by a detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedCard {
    pub uid: Uid,
    pub info: CardInfo,
    #[serde(skip)]
    pub atr: Vec<u8>,
}

/// Result of reading the card in the field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRead {
    #[serde(flatten)]
    pub card: DetectedCard,
    #[serde(skip)]
    pub blocks: Vec<MemoryBlock>,
    pub payload: Decoded,
}

/// Result of writing a payload to the card in the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub uid: Uid,
    pub bytes_written: usize,
    pub blocks: Vec<BlockIndex>,
}

/// Exclusive access to the reader for one APDU sequence.
pub struct Link<'a> {
    transport: MutexGuard<'a, Option<AnyTransport>>,
    timeout: Duration,
}

impl Link<'_> {
    /// Send one command with the session's timeout.
    ///
    /// # Errors
    /// `NoDevice` after the session was closed, transport errors, or
    /// `InvalidResponse` when no status word came back.
    pub async fn transmit(&mut self, command: &Command) -> Result<Response> {
        let timeout = self.timeout;
        self.transmit_within(command, timeout).await
    }

    /// Send one command with an explicit timeout.
    ///
    /// # Errors
    /// See [`transmit`](Self::transmit).
    pub async fn transmit_within(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Response> {
        let raw = self.send_raw(command, timeout).await?;
        Response::parse(&raw)
    }

    async fn send_raw(&mut self, command: &Command, timeout: Duration) -> Result<Vec<u8>> {
        let transport = self.transport.as_mut().ok_or(HardwareError::NoDevice)?;
        trace!(%command, "APDU >>");
        let raw = transport.send(command.as_bytes(), timeout).await?;
        trace!(reply = %hex::encode_upper(&raw), "APDU <<");
        Ok(raw)
    }

    /// Look for a card in the field.
    ///
    /// Uses request-type-A. Readers that do not tunnel PN532 commands fall
    /// back to GET UID plus the ATR from the transport.
    ///
    /// # Errors
    /// Transport errors other than `NoCardPresent`, which maps to `Ok(None)`.
    pub async fn detect(&mut self, timeout: Duration) -> Result<Option<DetectedCard>> {
        let response = match self.transmit_within(&apdu::request_type_a(), timeout).await {
            Ok(response) => response,
            Err(HardwareError::NoCardPresent) => return Ok(None),
            Err(e) => return Err(e),
        };

        if response.is_success() {
            let Some(target) = parse_passive_target(&response.data)? else {
                return Ok(None);
            };
            let uid = Uid::from_bytes(&target.uid)?;
            let info = identify(RawIdentity::Sak(target.sak));
            let atr = self.atr();
            return Ok(Some(DetectedCard { uid, info, atr }));
        }

        trace!(status = %response.status(), "Request-A unsupported, trying GET UID");
        let response = match self.transmit_within(&apdu::get_uid(), timeout).await {
            Ok(response) if response.is_success() => response,
            Ok(_) | Err(HardwareError::NoCardPresent) => return Ok(None),
            Err(e) => return Err(e),
        };
        let uid = Uid::from_bytes(&response.data)?;
        let atr = self.atr();
        let info = if atr.is_empty() {
            CardInfo::unknown()
        } else {
            identify(RawIdentity::Atr(&atr))
        };
        Ok(Some(DetectedCard { uid, info, atr }))
    }

    fn atr(&self) -> Vec<u8> {
        self.transport
            .as_ref()
            .and_then(|transport| transport.atr())
            .unwrap_or_default()
    }

    /// Read and decode the payload of `card`.
    ///
    /// # Errors
    /// `DeviceIo`/`NoDevice`; individual block failures are isolated.
    pub async fn read_card(
        &mut self,
        card: DetectedCard,
        key_a: [u8; 6],
        max_data_blocks: usize,
    ) -> Result<CardRead> {
        let layout = CardLayout::for_card(&card.info);
        let blocks = BlockIo::new(self, layout, key_a)
            .read_payload(max_data_blocks)
            .await?;
        let payload = decode(&assemble_data(&blocks, &layout));
        debug!(uid = %card.uid, blocks = blocks.len(), format = ?payload.format, "Card read");
        Ok(CardRead {
            card,
            blocks,
            payload,
        })
    }
}

/// Open connection to the active reader.
#[derive(Debug)]
pub struct Session {
    device: ReaderDevice,
    transport: Mutex<Option<AnyTransport>>,
    config: SessionConfig,
}

impl Session {
    /// Open a session: query the firmware version and the capabilities.
    ///
    /// A failed firmware query records `"unknown"` and continues; a failed
    /// capability query keeps the capabilities `device` came with.
    ///
    /// # Errors
    /// Returns `DeviceIo` if the reader is unusable.
    pub async fn open(
        mut device: ReaderDevice,
        mut transport: AnyTransport,
        config: SessionConfig,
    ) -> Result<Self> {
        let timeout = config.command_timeout;

        let firmware = match transport
            .send(apdu::firmware_version().as_bytes(), timeout)
            .await
        {
            Ok(raw) => parse_firmware(&raw),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Firmware query failed");
                None
            }
        };
        device.firmware = Some(firmware.unwrap_or_else(|| UNKNOWN_FIRMWARE.to_string()));

        match front_end::query_capabilities(&mut transport, timeout).await? {
            Some(capabilities) => device.capabilities = capabilities,
            None => warn!(
                name = %device.name,
                "Capability query failed, assuming the reader family defaults"
            ),
        }

        info!(
            name = %device.name,
            firmware = device.firmware.as_deref().unwrap_or(UNKNOWN_FIRMWARE),
            backend = %device.backend,
            "Reader session opened"
        );

        Ok(Self {
            device,
            transport: Mutex::new(Some(transport)),
            config,
        })
    }

    /// Reader this session is bound to, with its firmware version.
    #[must_use]
    pub fn device(&self) -> &ReaderDevice {
        &self.device
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wait for exclusive access to the reader.
    pub async fn lock(&self) -> Link<'_> {
        Link {
            transport: self.transport.lock().await,
            timeout: self.config.command_timeout,
        }
    }

    /// Read and decode the card in the field.
    ///
    /// # Errors
    /// - `NoCardPresent` when the field is empty
    /// - transport errors from detection
    pub async fn read_card(&self) -> Result<CardRead> {
        let mut link = self.lock().await;
        let card = link
            .detect(self.config.command_timeout)
            .await?
            .ok_or(HardwareError::NoCardPresent)?;
        link.read_card(card, self.config.key_a, self.config.max_data_blocks)
            .await
    }

    /// Write an encoded payload to the data area of the card in the field.
    ///
    /// # Errors
    /// - `NoCardPresent` when the field is empty
    /// - `BlockWrite { block }` when a block write fails
    /// - `Codec(PayloadTooLarge)` when the payload exceeds the configured
    ///   block limit or the card's data area
    pub async fn write_card(&self, payload: &[u8]) -> Result<WriteOutcome> {
        let mut link = self.lock().await;
        let card = link
            .detect(self.config.command_timeout)
            .await?
            .ok_or(HardwareError::NoCardPresent)?;

        let layout = CardLayout::for_card(&card.info);
        let blocks = split_blocks(payload);
        if blocks.len() > self.config.max_data_blocks {
            return Err(evlic_core::Error::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_data_blocks * BLOCK_SIZE,
            }
            .into());
        }
        let written = BlockIo::new(&mut link, layout, self.config.key_a)
            .write_range(layout.data_start, &blocks)
            .await?;

        info!(uid = %card.uid, bytes = payload.len(), blocks = written.len(), "Card written");
        Ok(WriteOutcome {
            uid: card.uid,
            bytes_written: payload.len(),
            blocks: written,
        })
    }

    /// Turn the LED and buzzer off and release the device. Best effort:
    /// failures are logged and ignored. Later commands fail with `NoDevice`.
    pub async fn close(&self) {
        let mut link = self.lock().await;
        if link.transport.is_none() {
            return;
        }
        for command in [apdu::led_buzzer(LedColor::Off), apdu::buzzer_off()] {
            if let Err(e) = link.transmit(&command).await {
                debug!(command = command.name, error = %e, "Ignoring close failure");
            }
        }
        if let Some(mut transport) = link.transport.take()
            && let Err(e) = transport.close().await
        {
            debug!(error = %e, "Ignoring transport close failure");
        }
        info!(name = %self.device.name, "Reader session closed");
    }
}

/// Firmware reply is bare ASCII on ACR122 readers; some PC/SC drivers append
/// `90 00`.
fn parse_firmware(raw: &[u8]) -> Option<String> {
    let text = raw.strip_suffix(&[0x90, 0x00]).unwrap_or(raw);
    let printable = !text.is_empty() && text.iter().all(|b| b.is_ascii_graphic() || *b == b' ');
    printable.then(|| String::from_utf8_lossy(text).trim().to_string())
}
