//! ACR122-style pseudo-APDUs and response parsing.
//!
//! All reader commands use class `0xFF`. Card memory access goes through
//! the PC/SC storage-card commands (load key, authenticate, read/update
//! binary); PN532 commands are tunneled with the direct-transmit wrapper
//! `FF 00 00 00 Lc <pn532 frame>`.
//!
//! | Command | Bytes |
//! |---------|-------|
//! | Get UID | `FF CA 00 00 00` |
//! | Get ATS | `FF CA 01 00 00` |
//! | Firmware version | `FF 00 48 00 00` |
//! | Request type A | `FF 00 00 00 04 D4 4A 01 00` |
//! | PN532 general status | `FF 00 00 00 02 D4 04` |
//! | PN532 firmware | `FF 00 00 00 02 D4 02` |
//! | Load key | `FF 82 00 00 06 <key>` |
//! | Authenticate | `FF 86 00 00 05 01 00 <blk> 60 00` |
//! | Read binary | `FF B0 00 <blk> 10` |
//! | Update binary | `FF D6 00 <blk> <len> <data>` |

use crate::{HardwareError, Result};
use evlic_core::constants::BLOCK_SIZE;
use std::fmt;

const CLA: u8 = 0xFF;

/// PN532 host-to-device frame identifier.
pub const PN532_HOST: u8 = 0xD4;

/// PN532 device-to-host frame identifier.
pub const PN532_DEVICE: u8 = 0xD5;

/// PN532 InListPassiveTarget command code.
pub const PN532_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

/// PN532 GetFirmwareVersion command code.
pub const PN532_GET_FIRMWARE_VERSION: u8 = 0x02;

/// PN532 GetGeneralStatus command code.
pub const PN532_GET_GENERAL_STATUS: u8 = 0x04;

/// Mifare authentication with key A.
const KEY_TYPE_A: u8 = 0x60;

/// Key slot in reader volatile memory.
const KEY_SLOT: u8 = 0x00;

/// A command ready for the transport, with a name for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

impl Command {
    fn new(name: &'static str, bytes: Vec<u8>) -> Self {
        Self { name, bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, hex::encode_upper(&self.bytes))
    }
}

/// Get the UID of the card in the field.
#[must_use]
pub fn get_uid() -> Command {
    Command::new("get-uid", vec![CLA, 0xCA, 0x00, 0x00, 0x00])
}

/// Get the answer-to-select of an ISO14443-4 card.
#[must_use]
pub fn get_ats() -> Command {
    Command::new("get-ats", vec![CLA, 0xCA, 0x01, 0x00, 0x00])
}

/// Read the reader firmware version string.
#[must_use]
pub fn firmware_version() -> Command {
    Command::new("firmware", vec![CLA, 0x00, 0x48, 0x00, 0x00])
}

/// Wrap a PN532 command in the direct-transmit pseudo-APDU.
#[must_use]
pub fn direct_transmit(name: &'static str, pn532: &[u8]) -> Command {
    let mut bytes = Vec::with_capacity(pn532.len() + 6);
    bytes.extend_from_slice(&[CLA, 0x00, 0x00, 0x00, (pn532.len() + 1) as u8, PN532_HOST]);
    bytes.extend_from_slice(pn532);
    Command::new(name, bytes)
}

/// Poll for one ISO14443-A target at 106 kbit/s.
#[must_use]
pub fn request_type_a() -> Command {
    direct_transmit("request-a", &[PN532_IN_LIST_PASSIVE_TARGET, 0x01, 0x00])
}

/// PN532 general status: last error, field, and active targets.
#[must_use]
pub fn get_status() -> Command {
    direct_transmit("get-status", &[PN532_GET_GENERAL_STATUS])
}

/// PN532 IC, version, and supported air interfaces. Not to be confused with
/// the reader firmware string from [`firmware_version`].
#[must_use]
pub fn front_end_version() -> Command {
    direct_transmit("front-end-version", &[PN532_GET_FIRMWARE_VERSION])
}

/// Drive the LEDs and buzzer.
///
/// `led` is the final LED state; blinking and the buzzer are left off.
#[must_use]
pub fn led_buzzer(led: crate::types::LedColor) -> Command {
    // P2: update both LED states from the state bits
    let p2 = 0x0C | led.state_bits();
    Command::new(
        "led-buzzer",
        vec![CLA, 0x00, 0x40, p2, 0x04, 0x00, 0x00, 0x00, 0x00],
    )
}

/// Disable the buzzer on card detection.
#[must_use]
pub fn buzzer_off() -> Command {
    Command::new("buzzer-off", vec![CLA, 0x00, 0x52, 0x00, 0x00])
}

/// Load a Mifare key into the reader's volatile key slot.
#[must_use]
pub fn load_key(key: &[u8; 6]) -> Command {
    let mut bytes = vec![CLA, 0x82, 0x00, KEY_SLOT, 0x06];
    bytes.extend_from_slice(key);
    Command::new("load-key", bytes)
}

/// Authenticate the sector containing `block` with key A.
#[must_use]
pub fn authenticate(block: u8) -> Command {
    Command::new(
        "authenticate",
        vec![
            CLA, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, KEY_TYPE_A, KEY_SLOT,
        ],
    )
}

/// Read 16 bytes starting at `address` (block or page number).
#[must_use]
pub fn read_binary(address: u8) -> Command {
    Command::new(
        "read-binary",
        vec![CLA, 0xB0, 0x00, address, BLOCK_SIZE as u8],
    )
}

/// Write `data` at `address` (16 bytes for a block, 4 for a page).
#[must_use]
pub fn update_binary(address: u8, data: &[u8]) -> Command {
    let mut bytes = vec![CLA, 0xD6, 0x00, address, data.len() as u8];
    bytes.extend_from_slice(data);
    Command::new("update-binary", bytes)
}

/// Reader response split into data and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl Response {
    /// Split a raw response into data and the trailing status word.
    ///
    /// # Errors
    /// Returns `HardwareError::InvalidResponse` if fewer than two bytes arrived.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        match raw {
            [data @ .., sw1, sw2] => Ok(Self {
                data: data.to_vec(),
                sw1: *sw1,
                sw2: *sw2,
            }),
            _ => Err(HardwareError::invalid_response(format!(
                "{} byte response has no status word",
                raw.len()
            ))),
        }
    }

    /// Returns `true` for `90 00`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Status word as text for error messages.
    #[must_use]
    pub fn status(&self) -> String {
        format!("{:02X} {:02X}", self.sw1, self.sw2)
    }

    /// Data of a successful response.
    ///
    /// # Errors
    /// Returns `HardwareError::InvalidResponse` naming the status word otherwise.
    pub fn into_data(self) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(HardwareError::invalid_response(format!(
                "status {}",
                self.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedColor;
    use rstest::rstest;

    #[rstest]
    #[case(get_uid(), &[0xFF, 0xCA, 0x00, 0x00, 0x00])]
    #[case(get_ats(), &[0xFF, 0xCA, 0x01, 0x00, 0x00])]
    #[case(firmware_version(), &[0xFF, 0x00, 0x48, 0x00, 0x00])]
    #[case(request_type_a(), &[0xFF, 0x00, 0x00, 0x00, 0x04, 0xD4, 0x4A, 0x01, 0x00])]
    #[case(authenticate(8), &[0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, 0x08, 0x60, 0x00])]
    #[case(read_binary(4), &[0xFF, 0xB0, 0x00, 0x04, 0x10])]
    #[case(get_status(), &[0xFF, 0x00, 0x00, 0x00, 0x02, 0xD4, 0x04])]
    #[case(front_end_version(), &[0xFF, 0x00, 0x00, 0x00, 0x02, 0xD4, 0x02])]
    fn test_command_bytes(#[case] command: Command, #[case] expected: &[u8]) {
        assert_eq!(command.as_bytes(), expected);
    }

    #[test]
    fn test_load_key() {
        let command = load_key(&[0xFF; 6]);
        assert_eq!(&command.bytes[..5], &[0xFF, 0x82, 0x00, 0x00, 0x06]);
        assert_eq!(&command.bytes[5..], &[0xFF; 6]);
    }

    #[test]
    fn test_update_binary() {
        let command = update_binary(5, &[0xAB; 16]);
        assert_eq!(&command.bytes[..5], &[0xFF, 0xD6, 0x00, 0x05, 0x10]);
        assert_eq!(command.bytes.len(), 21);
    }

    #[test]
    fn test_led_off() {
        let command = led_buzzer(LedColor::Off);
        assert_eq!(command.bytes[3], 0x0C);
    }

    #[test]
    fn test_response_parse() {
        let response = Response::parse(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert!(response.is_success());
        assert_eq!(response.into_data().unwrap(), vec![0x01, 0x02]);

        let failed = Response::parse(&[0x63, 0x00]).unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.status(), "63 00");
        assert!(failed.into_data().is_err());

        assert!(Response::parse(&[0x90]).is_err());
    }

    #[test]
    fn test_command_display() {
        assert_eq!(get_uid().to_string(), "get-uid [FFCA000000]");
    }
}
