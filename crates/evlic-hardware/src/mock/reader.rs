//! Mock ACR122-style reader for testing and development.
//!
//! The reader answers the same pseudo-APDUs as the real device, backed by an
//! in-memory [`MockCard`]. A [`MockReaderHandle`] places and removes cards,
//! unplugs the reader, and inspects what was sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::trace;

use super::MockCard;
use crate::{
    HardwareError, Result,
    apdu::{
        PN532_DEVICE, PN532_GET_FIRMWARE_VERSION, PN532_GET_GENERAL_STATUS, PN532_HOST,
        PN532_IN_LIST_PASSIVE_TARGET,
    },
    transport::{
        CCID_DATA_BLOCK, CCID_HEADER_LEN, CcidFraming, Framing, Passthrough, ReaderTransport,
        with_timeout,
    },
    types::{BackendKind, LedColor, ReaderDevice},
};
use evlic_core::{BlockIndex, constants::PAGE_SIZE, is_sector_trailer};

const SW_OK: [u8; 2] = [0x90, 0x00];
const SW_FAILED: [u8; 2] = [0x63, 0x00];
const SW_NOT_ALLOWED: [u8; 2] = [0x69, 0x82];
const SW_NOT_SUPPORTED: [u8; 2] = [0x6A, 0x81];

/// Default firmware string reported by the mock.
pub const MOCK_FIRMWARE: &str = "ACR122U207";

/// PN532 v1.6 supporting ISO14443-A, ISO14443-B, and ISO18092: IC, version,
/// revision, support bits.
pub const MOCK_FRONT_END: [u8; 4] = [0x32, 0x01, 0x06, 0x07];

#[derive(Debug)]
struct MockState {
    connected: bool,
    firmware: Option<String>,
    front_end: Option<[u8; 4]>,
    card: Option<MockCard>,
    loaded_key: Option<[u8; 6]>,
    authenticated_sector: Option<BlockIndex>,
    led: LedColor,
    delay: Duration,
    unresponsive: bool,
    in_flight: bool,
    interleaved: bool,
    log: Vec<Vec<u8>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            connected: true,
            firmware: Some(MOCK_FIRMWARE.to_string()),
            front_end: Some(MOCK_FRONT_END),
            card: None,
            loaded_key: None,
            authenticated_sector: None,
            led: LedColor::Off,
            delay: Duration::ZERO,
            unresponsive: false,
            in_flight: false,
            interleaved: false,
            log: Vec::new(),
        }
    }

    fn process(&mut self, apdu: &[u8]) -> Vec<u8> {
        match apdu {
            [0xFF, 0xCA, 0x00, 0x00, 0x00] => match &self.card {
                Some(card) => with_status(card.uid.clone(), SW_OK),
                None => SW_FAILED.to_vec(),
            },
            [0xFF, 0x00, 0x48, 0x00, 0x00] => match &self.firmware {
                // Firmware comes back as bare ASCII without a status word
                Some(fw) => fw.as_bytes().to_vec(),
                None => SW_NOT_SUPPORTED.to_vec(),
            },
            [0xFF, 0x00, 0x00, 0x00, _, PN532_HOST, pn532 @ ..] => self.pn532(pn532),
            [0xFF, 0x00, 0x40, p2, 0x04, ..] => {
                self.led = match p2 & 0x03 {
                    0x01 => LedColor::Red,
                    0x02 => LedColor::Green,
                    0x03 => LedColor::Orange,
                    _ => LedColor::Off,
                };
                SW_OK.to_vec()
            }
            [0xFF, 0x00, 0x52, _, 0x00] => SW_OK.to_vec(),
            [0xFF, 0x82, 0x00, _, 0x06, key @ ..] if key.len() == 6 => {
                let mut slot = [0u8; 6];
                slot.copy_from_slice(key);
                self.loaded_key = Some(slot);
                SW_OK.to_vec()
            }
            [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, 0x60, _] => {
                self.authenticate(*block as BlockIndex)
            }
            [0xFF, 0xB0, 0x00, address, 0x10] => self.read(*address),
            [0xFF, 0xD6, 0x00, address, len, data @ ..] if data.len() == *len as usize => {
                self.write(*address, data)
            }
            _ => SW_NOT_SUPPORTED.to_vec(),
        }
    }

    fn pn532(&mut self, command: &[u8]) -> Vec<u8> {
        match command {
            [PN532_IN_LIST_PASSIVE_TARGET, 0x01, 0x00] => {
                self.authenticated_sector = None;
                let mut out = vec![PN532_DEVICE, PN532_IN_LIST_PASSIVE_TARGET + 1];
                match &self.card {
                    Some(card) => {
                        out.extend_from_slice(&[0x01, 0x01]);
                        out.extend_from_slice(&card.atqa);
                        out.push(card.sak);
                        out.push(card.uid.len() as u8);
                        out.extend_from_slice(&card.uid);
                    }
                    None => out.push(0x00),
                }
                with_status(out, SW_OK)
            }
            [PN532_GET_GENERAL_STATUS] if self.front_end.is_some() => {
                let mut out = vec![PN532_DEVICE, PN532_GET_GENERAL_STATUS + 1, 0x00, 0x00];
                match &self.card {
                    // target 1 at 106 kbit/s both ways, ISO14443-A
                    Some(_) => out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x00]),
                    None => out.push(0x00),
                }
                out.push(0x80);
                with_status(out, SW_OK)
            }
            [PN532_GET_FIRMWARE_VERSION] => match self.front_end {
                Some(version) => {
                    let mut out = vec![PN532_DEVICE, PN532_GET_FIRMWARE_VERSION + 1];
                    out.extend_from_slice(&version);
                    with_status(out, SW_OK)
                }
                None => SW_NOT_SUPPORTED.to_vec(),
            },
            _ => SW_NOT_SUPPORTED.to_vec(),
        }
    }

    fn authenticate(&mut self, block: BlockIndex) -> Vec<u8> {
        let Some(card) = &self.card else {
            return SW_FAILED.to_vec();
        };
        if card.family.is_page_addressed()
            || block as usize >= card.block_count()
            || self.loaded_key.as_ref() != Some(card.key_a())
        {
            self.authenticated_sector = None;
            return SW_FAILED.to_vec();
        }
        self.authenticated_sector = Some(sector_of(block));
        SW_OK.to_vec()
    }

    fn read(&mut self, address: u8) -> Vec<u8> {
        let Some(card) = &self.card else {
            return SW_FAILED.to_vec();
        };
        let index = address as BlockIndex;
        if card.read_fails(index) {
            return SW_FAILED.to_vec();
        }
        let data = if card.family.is_page_addressed() {
            card.read_pages(address)
        } else {
            if self.authenticated_sector != Some(sector_of(index)) {
                return SW_NOT_ALLOWED.to_vec();
            }
            card.read_classic(index)
        };
        match data {
            Some(block) => with_status(block.to_vec(), SW_OK),
            None => SW_FAILED.to_vec(),
        }
    }

    fn write(&mut self, address: u8, data: &[u8]) -> Vec<u8> {
        let authenticated = self.authenticated_sector;
        let Some(card) = &mut self.card else {
            return SW_FAILED.to_vec();
        };
        let index = address as BlockIndex;
        if card.write_fails(index) {
            return SW_FAILED.to_vec();
        }
        if card.family.is_page_addressed() {
            if data.len() != PAGE_SIZE || !card.write_page(address, data) {
                return SW_FAILED.to_vec();
            }
            return SW_OK.to_vec();
        }
        if authenticated != Some(sector_of(index))
            || is_sector_trailer(index)
            || index as usize >= card.block_count()
            || data.len() != 16
        {
            return SW_NOT_ALLOWED.to_vec();
        }
        card.store(index, data);
        SW_OK.to_vec()
    }
}

fn with_status(mut data: Vec<u8>, sw: [u8; 2]) -> Vec<u8> {
    data.extend_from_slice(&sw);
    data
}

fn sector_of(block: BlockIndex) -> BlockIndex {
    if block < 128 {
        block / 4
    } else {
        32 + (block - 128) / 16
    }
}

/// Mock reader for testing and development.
///
/// Clones share the same simulated device, so a discovery backend can hand
/// out a fresh transport on every open.
///
/// # Examples
///
/// ```
/// use evlic_hardware::mock::{MockCard, MockReader};
/// use evlic_hardware::transport::ReaderTransport;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> evlic_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new();
///     handle.present_card(MockCard::classic_1k(&[0x04, 0xAB, 0xCD, 0xEF])).await;
///
///     let response = reader.send(&[0xFF, 0xCA, 0x00, 0x00, 0x00], Duration::from_secs(1)).await?;
///     assert_eq!(response, vec![0x04, 0xAB, 0xCD, 0xEF, 0x90, 0x00]);
///     Ok(())
/// }
/// ```
pub struct MockReader {
    state: Arc<Mutex<MockState>>,
    framing: Box<dyn Framing>,
    ccid: bool,
    name: String,
}

impl std::fmt::Debug for MockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockReader")
            .field("name", &self.name)
            .field("ccid", &self.ccid)
            .finish()
    }
}

impl Clone for MockReader {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            framing: new_framing(self.ccid),
            ccid: self.ccid,
            name: self.name.clone(),
        }
    }
}

fn new_framing(ccid: bool) -> Box<dyn Framing> {
    if ccid {
        Box::new(CcidFraming::new(0))
    } else {
        Box::new(Passthrough)
    }
}

impl MockReader {
    /// Create a new mock reader with the default name.
    ///
    /// Returns the reader and a handle to control the simulated device.
    pub fn new() -> (Self, MockReaderHandle) {
        Self::with_name("Mock ACR122U")
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockReaderHandle) {
        let state = Arc::new(Mutex::new(MockState::new()));
        let reader = Self {
            state: Arc::clone(&state),
            framing: new_framing(false),
            ccid: false,
            name: name.into(),
        };
        (reader, MockReaderHandle { state })
    }

    /// Speak CCID framing on the simulated wire, like the HID backend.
    #[must_use]
    pub fn with_ccid_framing(mut self) -> Self {
        self.ccid = true;
        self.framing = new_framing(true);
        self
    }

    /// Description of this reader for discovery.
    #[must_use]
    pub fn device(&self) -> ReaderDevice {
        ReaderDevice::new(self.name.clone(), format!("mock:{}", self.name), BackendKind::Mock)
            .with_usb_ids(0x072F, 0x2200)
    }

    async fn exchange(&mut self, wire: Vec<u8>) -> Result<Vec<u8>> {
        let (reply, delay) = {
            let mut state = self.state.lock().await;
            if !state.connected {
                return Err(HardwareError::device_io("mock reader unplugged"));
            }
            if state.in_flight {
                state.interleaved = true;
            }
            state.in_flight = true;

            let apdu = if self.ccid {
                wire.get(CCID_HEADER_LEN..).unwrap_or_default().to_vec()
            } else {
                wire.clone()
            };
            state.log.push(apdu.clone());
            let mut reply = state.process(&apdu);
            if self.ccid {
                reply = ccid_reply(&wire, reply);
            }
            (reply, state.delay)
        };

        let unresponsive = self.state.lock().await.unresponsive;
        if unresponsive {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state.lock().await.in_flight = false;
        Ok(reply)
    }
}

/// Wrap a reply APDU in a CCID data block echoing the request sequence.
fn ccid_reply(request: &[u8], apdu: Vec<u8>) -> Vec<u8> {
    let seq = request.get(6).copied().unwrap_or_default();
    let mut out = Vec::with_capacity(CCID_HEADER_LEN + apdu.len());
    out.push(CCID_DATA_BLOCK);
    out.extend_from_slice(&(apdu.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0x00, seq, 0x00, 0x00, 0x00]);
    out.extend(apdu);
    out
}

impl ReaderTransport for MockReader {
    async fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let wire = self.framing.frame(apdu);
        let result = with_timeout(timeout, self.exchange(wire)).await;
        if result.is_err() {
            self.state.lock().await.in_flight = false;
        }
        let reply = result?;
        trace!(reader = %self.name, reply = %hex::encode_upper(&reply), "Mock reply");
        self.framing.unframe(&reply)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Handle for controlling a mock reader.
///
/// # Examples
///
/// ```
/// use evlic_hardware::mock::{MockCard, MockReader};
///
/// #[tokio::main]
/// async fn main() {
///     let (_reader, handle) = MockReader::new();
///
///     handle.present_card(MockCard::ultralight(&[0x04, 1, 2, 3, 4, 5, 6])).await;
///     assert!(handle.card_present().await);
///
///     handle.remove_card().await;
///     assert!(!handle.card_present().await);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockReaderHandle {
    /// Place a card in the field, replacing any card already there.
    pub async fn present_card(&self, card: MockCard) {
        let mut state = self.state.lock().await;
        state.card = Some(card);
        state.authenticated_sector = None;
    }

    /// Take the card out of the field, returning it with its memory.
    pub async fn remove_card(&self) -> Option<MockCard> {
        let mut state = self.state.lock().await;
        state.authenticated_sector = None;
        state.card.take()
    }

    /// Check if a card is in the field.
    pub async fn card_present(&self) -> bool {
        self.state.lock().await.card.is_some()
    }

    /// Copy of the card currently in the field.
    pub async fn card(&self) -> Option<MockCard> {
        self.state.lock().await.card.clone()
    }

    /// Simulate unplugging (`false`) or reconnecting (`true`) the reader.
    pub async fn set_connected(&self, connected: bool) {
        self.state.lock().await.connected = connected;
    }

    /// Firmware string to report, `None` to make the query fail.
    pub async fn set_firmware(&self, firmware: Option<&str>) {
        self.state.lock().await.firmware = firmware.map(str::to_string);
    }

    /// PN53x version reply (IC, version, revision, support bits); `None`
    /// makes the reader reject both front-end queries.
    pub async fn set_front_end(&self, front_end: Option<[u8; 4]>) {
        self.state.lock().await.front_end = front_end;
    }

    /// Delay applied to every response.
    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = delay;
    }

    /// Stop answering commands entirely.
    pub async fn set_unresponsive(&self, unresponsive: bool) {
        self.state.lock().await.unresponsive = unresponsive;
    }

    /// Current LED state.
    pub async fn led(&self) -> LedColor {
        self.state.lock().await.led
    }

    /// All APDUs received so far, in order.
    pub async fn commands(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.log.clone()
    }

    /// Clear the command log.
    pub async fn clear_commands(&self) {
        self.state.lock().await.log.clear();
    }

    /// Returns `true` if a command ever arrived while another was in flight.
    pub async fn interleaved(&self) -> bool {
        self.state.lock().await.interleaved
    }
}
