//! Reader capability query, run once when a session opens.
//!
//! Two PN53x commands go through direct transmit:
//!
//! ```text
//! D4 04  ->  D5 05 Err Field NbTg [Tg BrRx BrTx Type]... SAM
//! D4 02  ->  D5 03 IC Ver Rev Support
//! ```
//!
//! General status has to come back without an error code. The `Support`
//! bits of the version reply give the air interfaces, the IC gives the
//! fastest bit rate.

use std::time::Duration;

use evlic_core::{CardFamily, Technology};
use tracing::debug;

use crate::apdu::{
    self, Command, PN532_DEVICE, PN532_GET_FIRMWARE_VERSION, PN532_GET_GENERAL_STATUS, Response,
};
use crate::devices::AnyTransport;
use crate::transport::ReaderTransport;
use crate::types::ReaderCapabilities;
use crate::{HardwareError, Result};

const SUPPORT_ISO14443A: u8 = 0x01;
const SUPPORT_ISO14443B: u8 = 0x02;

const IC_PN533: u8 = 0x33;

/// One target listed in a general-status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetStatus {
    pub rx_kbps: Option<u32>,
    pub tx_kbps: Option<u32>,
    pub modulation: u8,
}

/// Decoded `GetGeneralStatus` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralStatus {
    /// Last error reported by the front end, `0` when healthy.
    pub error: u8,
    /// An external RF field is present.
    pub field: bool,
    pub targets: Vec<TargetStatus>,
}

/// Decoded PN53x `GetFirmwareVersion` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEnd {
    /// `0x32` for a PN532, `0x33` for a PN533.
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    /// Bit 0 ISO14443-A, bit 1 ISO14443-B, bit 2 ISO18092.
    pub support: u8,
}

impl FrontEnd {
    fn max_rate_kbps(&self) -> u32 {
        if self.ic == IC_PN533 { 848 } else { 424 }
    }

    /// Capability set of this front end. Rates seen on active targets raise
    /// the maximum when they exceed the IC's nominal one.
    #[must_use]
    pub fn capabilities(&self, status: &GeneralStatus) -> ReaderCapabilities {
        let mut protocols = Vec::new();
        if self.support & SUPPORT_ISO14443A != 0 {
            protocols.push(Technology::Iso14443A);
        }
        if self.support & SUPPORT_ISO14443B != 0 {
            protocols.push(Technology::Iso14443B);
        }

        let card_families = if protocols.contains(&Technology::Iso14443A) {
            vec![
                CardFamily::Classic1K,
                CardFamily::Classic4K,
                CardFamily::Ultralight,
                CardFamily::DesFire,
            ]
        } else {
            Vec::new()
        };

        let max_data_rate_kbps = status
            .targets
            .iter()
            .flat_map(|t| [t.rx_kbps, t.tx_kbps])
            .flatten()
            .fold(self.max_rate_kbps(), u32::max);

        ReaderCapabilities {
            protocols,
            max_data_rate_kbps,
            card_families,
        }
    }
}

fn bit_rate_kbps(code: u8) -> Option<u32> {
    match code {
        0x00 => Some(106),
        0x01 => Some(212),
        0x02 => Some(424),
        0x03 => Some(848),
        _ => None,
    }
}

/// Parse the data of a general-status reply (status word removed).
///
/// # Errors
/// Returns `InvalidResponse` for a malformed reply or a truncated target list.
pub fn parse_general_status(data: &[u8]) -> Result<GeneralStatus> {
    match data {
        [PN532_DEVICE, code, error, field, count, rest @ ..]
            if *code == PN532_GET_GENERAL_STATUS + 1 =>
        {
            let count = *count as usize;
            let entries = rest.get(..count * 4).ok_or_else(|| {
                HardwareError::invalid_response(format!(
                    "{count} targets announced, {} bytes follow",
                    rest.len()
                ))
            })?;
            let targets = entries
                .chunks_exact(4)
                .map(|t| TargetStatus {
                    rx_kbps: bit_rate_kbps(t[1]),
                    tx_kbps: bit_rate_kbps(t[2]),
                    modulation: t[3],
                })
                .collect();
            Ok(GeneralStatus {
                error: *error,
                field: *field != 0,
                targets,
            })
        }
        _ => Err(HardwareError::invalid_response(format!(
            "malformed general status [{}]",
            hex::encode_upper(data)
        ))),
    }
}

/// Parse the data of a front-end version reply (status word removed).
///
/// # Errors
/// Returns `InvalidResponse` for anything that is not a well-formed reply.
pub fn parse_front_end(data: &[u8]) -> Result<FrontEnd> {
    match data {
        [PN532_DEVICE, code, ic, version, revision, support, ..]
            if *code == PN532_GET_FIRMWARE_VERSION + 1 =>
        {
            Ok(FrontEnd {
                ic: *ic,
                version: *version,
                revision: *revision,
                support: *support,
            })
        }
        _ => Err(HardwareError::invalid_response(format!(
            "malformed front-end version [{}]",
            hex::encode_upper(data)
        ))),
    }
}

/// Data of a successful reply, `None` when the reader rejected or garbled it.
async fn exchange(
    transport: &mut AnyTransport,
    command: &Command,
    timeout: Duration,
) -> Result<Option<Vec<u8>>> {
    let raw = match transport.send(command.as_bytes(), timeout).await {
        Ok(raw) => raw,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!(command = command.name, error = %e, "Capability command failed");
            return Ok(None);
        }
    };
    match Response::parse(&raw).and_then(Response::into_data) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            debug!(command = command.name, error = %e, "Capability command rejected");
            Ok(None)
        }
    }
}

/// Ask the reader what it supports.
///
/// `Ok(None)` when it does not answer like a healthy PN53x front end; the
/// caller keeps the family default then.
///
/// # Errors
/// Only fatal transport errors (`DeviceIo`, `NoDevice`).
pub async fn query_capabilities(
    transport: &mut AnyTransport,
    timeout: Duration,
) -> Result<Option<ReaderCapabilities>> {
    let Some(data) = exchange(transport, &apdu::get_status(), timeout).await? else {
        return Ok(None);
    };
    let status = match parse_general_status(&data) {
        Ok(status) if status.error == 0 => status,
        Ok(status) => {
            debug!(error = status.error, "Front end reports an error");
            return Ok(None);
        }
        Err(e) => {
            debug!(error = %e, "Unusable general status");
            return Ok(None);
        }
    };

    let Some(data) = exchange(transport, &apdu::front_end_version(), timeout).await? else {
        return Ok(None);
    };
    let front_end = match parse_front_end(&data) {
        Ok(front_end) => front_end,
        Err(e) => {
            debug!(error = %e, "Unusable front-end version");
            return Ok(None);
        }
    };

    let capabilities = front_end.capabilities(&status);
    debug!(
        ic = front_end.ic,
        version = front_end.version,
        revision = front_end.revision,
        field = status.field,
        targets = status.targets.len(),
        max_rate = capabilities.max_data_rate_kbps,
        "Capabilities queried"
    );
    Ok(Some(capabilities))
}
