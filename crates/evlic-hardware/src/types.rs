//! Reader description types shared by discovery, sessions, and events.

use evlic_core::{CardFamily, Technology};
use serde::{Deserialize, Serialize};

/// How a reader is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// USB HID with CCID-style framing.
    Hid,
    /// PC/SC resource manager.
    Pcsc,
    /// In-process simulated reader.
    Mock,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hid => write!(f, "HID"),
            Self::Pcsc => write!(f, "PC/SC"),
            Self::Mock => write!(f, "Mock"),
        }
    }
}

/// What a reader model can talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderCapabilities {
    /// Supported air interfaces.
    pub protocols: Vec<Technology>,

    /// Maximum data rate in kbit/s.
    pub max_data_rate_kbps: u32,

    /// Card families the reader can read and write.
    pub card_families: Vec<CardFamily>,
}

impl ReaderCapabilities {
    /// Capabilities of the ACR122U family (PN532 front end).
    #[must_use]
    pub fn acr122() -> Self {
        Self {
            protocols: vec![Technology::Iso14443A, Technology::Iso14443B],
            max_data_rate_kbps: 424,
            card_families: vec![
                CardFamily::Classic1K,
                CardFamily::Classic4K,
                CardFamily::Ultralight,
                CardFamily::DesFire,
            ],
        }
    }
}

impl Default for ReaderCapabilities {
    fn default() -> Self {
        Self::acr122()
    }
}

/// One physical (or simulated) contactless reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderDevice {
    /// USB vendor id (0 when unknown, e.g. PC/SC readers).
    pub vendor_id: u16,

    /// USB product id (0 when unknown).
    pub product_id: u16,

    /// Backend-specific path: HID path, PC/SC reader name, or mock id.
    pub path: String,

    /// Optional serial number.
    pub serial_number: Option<String>,

    /// Display name (e.g., "ACR122U").
    pub name: String,

    /// Firmware version, filled in when the session is opened.
    pub firmware: Option<String>,

    pub capabilities: ReaderCapabilities,

    pub backend: BackendKind,
}

impl ReaderDevice {
    /// Create a new ReaderDevice with required fields.
    pub fn new(name: impl Into<String>, path: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            path: path.into(),
            serial_number: None,
            name: name.into(),
            firmware: None,
            capabilities: ReaderCapabilities::default(),
            backend,
        }
    }

    /// Set the USB ids.
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }
}

/// Bicolor LED state of ACR122-style readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LedColor {
    /// Both LEDs off.
    Off,

    /// Red LED.
    Red,

    /// Green LED.
    Green,

    /// Red and green together.
    Orange,
}

impl LedColor {
    /// LED state byte for the ACR122 LED/buzzer command (bit 0 red, bit 1 green).
    #[must_use]
    pub fn state_bits(self) -> u8 {
        match self {
            Self::Off => 0x00,
            Self::Red => 0x01,
            Self::Green => 0x02,
            Self::Orange => 0x03,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_device_builder() {
        let device = ReaderDevice::new("ACR122U", "1-2:1.0", BackendKind::Hid)
            .with_usb_ids(0x072F, 0x2200)
            .with_serial_number("RR123");

        assert_eq!(device.vendor_id, 0x072F);
        assert_eq!(device.serial_number.as_deref(), Some("RR123"));
        assert_eq!(device.firmware, None);
    }

    #[test]
    fn test_reader_device_serializes_camel_case() {
        let device = ReaderDevice::new("Mock", "mock-0", BackendKind::Mock);
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["vendorId"], 0);
        assert_eq!(json["backend"], "mock");
        assert_eq!(json["capabilities"]["maxDataRateKbps"], 424);
    }

    #[test]
    fn test_led_bits() {
        assert_eq!(LedColor::Off.state_bits(), 0);
        assert_eq!(LedColor::Orange.state_bits(), 3);
    }
}
