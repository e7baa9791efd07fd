//! Command/response transport.
//!
//! A transport carries one command to the reader and returns its response.
//! It never pipelines and never retries. Backend-specific wrapping lives in a
//! [`Framing`] so sessions only ever see plain APDUs.
//!
//! # Native async traits
//!
//! [`ReaderTransport`] uses native `async fn` in traits (Edition 2024), so it
//! is not object-safe. Backends are dispatched through
//! [`AnyTransport`](crate::devices::AnyTransport) instead of `Box<dyn _>`.

use std::future::Future;
use std::time::Duration;

use crate::{HardwareError, Result};

/// Byte-level transport to one reader.
pub trait ReaderTransport: Send + Sync {
    /// Send one APDU and wait for its response (data followed by SW1 SW2).
    ///
    /// # Errors
    /// - `Timeout` when no response arrives within `timeout`
    /// - `DeviceIo` for lower-level faults (device unplugged, handle closed)
    /// - `NoCardPresent` when the backend knows no card is connected
    fn send(
        &mut self,
        apdu: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// ATR of the connected card, when the backend exposes one.
    fn atr(&self) -> Option<Vec<u8>> {
        None
    }

    /// Release the device handle.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Wrapping of APDUs for a specific link.
pub trait Framing: Send + Sync {
    /// Wrap an APDU for the wire.
    fn frame(&mut self, apdu: &[u8]) -> Vec<u8>;

    /// Extract the response APDU from a wire message.
    ///
    /// # Errors
    /// Returns `InvalidResponse` for malformed or mismatched messages.
    fn unframe(&mut self, raw: &[u8]) -> Result<Vec<u8>>;
}

/// APDUs travel unmodified (PC/SC, mock).
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Framing for Passthrough {
    fn frame(&mut self, apdu: &[u8]) -> Vec<u8> {
        apdu.to_vec()
    }

    fn unframe(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }
}

/// CCID message header length.
pub const CCID_HEADER_LEN: usize = 10;

/// `PC_to_RDR_XfrBlock` message type.
pub const CCID_XFR_BLOCK: u8 = 0x6F;

/// `RDR_to_PC_DataBlock` message type.
pub const CCID_DATA_BLOCK: u8 = 0x80;

/// CCID-style framing used by ACR122 readers over HID.
///
/// ```text
/// [type][length u32 LE][slot][seq][bwi][level u16] [apdu...]
/// ```
///
/// Each request carries the next sequence number; the reply must be a data
/// block echoing it.
#[derive(Debug, Clone, Default)]
pub struct CcidFraming {
    slot: u8,
    seq: u8,
}

impl CcidFraming {
    #[must_use]
    pub fn new(slot: u8) -> Self {
        Self { slot, seq: 0 }
    }

    /// Total wire length announced by a (partial) reply header.
    #[must_use]
    pub fn expected_len(header: &[u8]) -> Option<usize> {
        if header.len() < CCID_HEADER_LEN {
            return None;
        }
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        Some(CCID_HEADER_LEN + len)
    }
}

impl Framing for CcidFraming {
    fn frame(&mut self, apdu: &[u8]) -> Vec<u8> {
        self.seq = self.seq.wrapping_add(1);
        let mut frame = Vec::with_capacity(CCID_HEADER_LEN + apdu.len());
        frame.push(CCID_XFR_BLOCK);
        frame.extend_from_slice(&(apdu.len() as u32).to_le_bytes());
        frame.push(self.slot);
        frame.push(self.seq);
        frame.extend_from_slice(&[0x00, 0x00, 0x00]);
        frame.extend_from_slice(apdu);
        frame
    }

    fn unframe(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        let Some(total) = Self::expected_len(raw) else {
            return Err(HardwareError::invalid_response(format!(
                "CCID reply of {} bytes is shorter than its header",
                raw.len()
            )));
        };
        if raw[0] != CCID_DATA_BLOCK {
            return Err(HardwareError::invalid_response(format!(
                "unexpected CCID message type 0x{:02X}",
                raw[0]
            )));
        }
        if raw[6] != self.seq {
            return Err(HardwareError::invalid_response(format!(
                "CCID sequence mismatch: sent {}, got {}",
                self.seq, raw[6]
            )));
        }
        if raw.len() < total {
            return Err(HardwareError::invalid_response(format!(
                "CCID reply truncated: {} of {total} bytes",
                raw.len()
            )));
        }
        Ok(raw[CCID_HEADER_LEN..total].to_vec())
    }
}

/// Run `fut` with a deadline, mapping expiry to `HardwareError::Timeout`.
///
/// # Errors
/// Returns `Timeout` on expiry, otherwise the future's own result.
pub async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(HardwareError::timeout(timeout.as_millis() as u64)),
    }
}
