//! Events published to subscribers of the NFC subsystem.

use evlic_codec::Decoded;
use evlic_core::{CardFamily, Technology, Uid};
use serde::Serialize;

use crate::types::ReaderDevice;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something subscribers should know about.
///
/// Serializes with a kebab-case `type` tag and camelCase fields:
///
/// ```
/// use evlic_hardware::events::NfcEvent;
///
/// let event = NfcEvent::DeviceDisconnected { reason: "unplugged".into() };
/// let json = serde_json::to_value(&event).unwrap();
/// assert_eq!(json["type"], "device-disconnected");
/// assert_eq!(json["reason"], "unplugged");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
#[non_exhaustive]
pub enum NfcEvent {
    /// A reader session was opened.
    DeviceConnected {
        device: ReaderDevice,
        firmware: String,
    },

    /// The reader session ended. `refresh_devices` is needed to reconnect.
    DeviceDisconnected { reason: String },

    /// A new card entered the field.
    CardDetected {
        uid: Uid,
        card_type: CardFamily,
        technology: Technology,
        /// Decoded card contents, present when reading on detect is enabled
        /// and the read succeeded.
        payload: Option<Decoded>,
    },

    /// The held card left the field.
    CardRemoved { uid: Uid },

    /// A fault the subscriber may want to display.
    Error {
        message: String,
        cause: Option<String>,
    },
}

impl NfcEvent {
    /// Kebab-case event name, as used on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceConnected { .. } => "device-connected",
            Self::DeviceDisconnected { .. } => "device-disconnected",
            Self::CardDetected { .. } => "card-detected",
            Self::CardRemoved { .. } => "card-removed",
            Self::Error { .. } => "error",
        }
    }
}
