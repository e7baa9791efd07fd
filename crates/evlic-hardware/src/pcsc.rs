//! Readers behind the PC/SC resource manager.
//!
//! APDUs go unframed through `SCardTransmit`. The card handle is connected
//! lazily on the first command and dropped when the card leaves, so the
//! next command reconnects. `pcsc` calls block and run on the blocking pool.

use std::ffi::CString;
use std::time::Duration;

use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode};
use tracing::{debug, trace};

use crate::discovery::known_reader_name;
use crate::transport::{ReaderTransport, with_timeout};
use crate::types::{BackendKind, ReaderDevice};
use crate::{HardwareError, Result};

fn pcsc_error(error: pcsc::Error) -> HardwareError {
    match error {
        pcsc::Error::NoSmartcard
        | pcsc::Error::RemovedCard
        | pcsc::Error::ResetCard
        | pcsc::Error::UnpoweredCard
        | pcsc::Error::UnresponsiveCard => HardwareError::NoCardPresent,
        pcsc::Error::ReaderUnavailable
        | pcsc::Error::NoReadersAvailable
        | pcsc::Error::UnknownReader
        | pcsc::Error::NoService
        | pcsc::Error::ServiceStopped
        | pcsc::Error::InvalidHandle => HardwareError::device_io(format!("PC/SC: {error}")),
        other => HardwareError::invalid_response(format!("PC/SC: {other}")),
    }
}

/// List PC/SC readers whose names match a known reader.
///
/// # Errors
/// Returns `DeviceIo` if the resource manager is not running.
pub fn enumerate() -> Result<Vec<ReaderDevice>> {
    let context = Context::establish(Scope::User).map_err(pcsc_error)?;
    let names = match context.list_readers_owned() {
        Ok(names) => names,
        Err(pcsc::Error::NoReadersAvailable) => return Ok(Vec::new()),
        Err(e) => return Err(pcsc_error(e)),
    };
    Ok(names
        .iter()
        .filter_map(|name| {
            let name = name.to_string_lossy();
            let known = known_reader_name(&name)?;
            Some(ReaderDevice::new(known, name.into_owned(), BackendKind::Pcsc))
        })
        .collect())
}

/// Transport to one PC/SC reader.
pub struct PcscTransport {
    context: Context,
    reader: CString,
    card: Option<Card>,
    atr: Option<Vec<u8>>,
}

impl std::fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader", &self.reader)
            .field("connected", &self.card.is_some())
            .finish()
    }
}

impl PcscTransport {
    /// Establish a context for the reader called `name`.
    ///
    /// # Errors
    /// Returns `DeviceIo` if the resource manager is unavailable.
    pub fn open(name: &str) -> Result<Self> {
        let reader = CString::new(name)
            .map_err(|e| HardwareError::device_io(format!("invalid reader name: {e}")))?;
        let context = Context::establish(Scope::User).map_err(pcsc_error)?;
        debug!(reader = name, "PC/SC context established");
        Ok(Self {
            context,
            reader,
            card: None,
            atr: None,
        })
    }
}

struct Exchange {
    card: Option<Card>,
    atr: Option<Vec<u8>>,
    reply: Result<Vec<u8>>,
}

fn transmit_blocking(
    context: &Context,
    reader: &CString,
    card: Option<Card>,
    apdu: &[u8],
) -> Exchange {
    let (card, atr) = match card {
        Some(card) => (card, None),
        None => match context.connect(reader, ShareMode::Shared, Protocols::ANY) {
            Ok(card) => {
                let atr = card.status2_owned().ok().map(|s| s.atr().to_vec());
                (card, atr)
            }
            Err(e) => {
                return Exchange {
                    card: None,
                    atr: None,
                    reply: Err(pcsc_error(e)),
                };
            }
        },
    };

    let mut buf = [0u8; pcsc::MAX_BUFFER_SIZE];
    match card.transmit(apdu, &mut buf) {
        Ok(reply) => {
            let reply = reply.to_vec();
            Exchange {
                card: Some(card),
                atr,
                reply: Ok(reply),
            }
        }
        Err(e @ (pcsc::Error::RemovedCard | pcsc::Error::ResetCard)) => Exchange {
            card: None,
            atr: None,
            reply: Err(pcsc_error(e)),
        },
        Err(e) => Exchange {
            card: Some(card),
            atr,
            reply: Err(pcsc_error(e)),
        },
    }
}

impl ReaderTransport for PcscTransport {
    async fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        trace!(apdu = %hex::encode_upper(apdu), "PC/SC transmit");
        let context = self.context.clone();
        let reader = self.reader.clone();
        let card = self.card.take();
        let apdu = apdu.to_vec();

        let task = tokio::task::spawn_blocking(move || {
            transmit_blocking(&context, &reader, card, &apdu)
        });
        let exchange = with_timeout(timeout, async { Ok::<_, HardwareError>(task.await?) }).await?;

        if exchange.card.is_none() {
            self.atr = None;
        }
        if exchange.atr.is_some() {
            self.atr = exchange.atr;
        }
        self.card = exchange.card;
        exchange.reply
    }

    fn atr(&self) -> Option<Vec<u8>> {
        self.atr.clone()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(card) = self.card.take() {
            card.disconnect(Disposition::LeaveCard)
                .map_err(|(_, e)| pcsc_error(e))?;
        }
        self.atr = None;
        Ok(())
    }
}
