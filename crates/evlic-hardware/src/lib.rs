//! Contactless reader access for EV license cards.
//!
//! This crate talks to ACR122-family and PC/SC readers at the APDU level:
//! it discovers readers, opens a session on the active one, polls for card
//! presence, identifies cards, and reads and writes their memory blocks.
//!
//! # Layers
//!
//! - [`transport`]: one command, one response, with framing abstracted
//!   behind [`transport::Framing`] (CCID over HID, unframed over PC/SC)
//! - [`discovery`] and [`session`]: reader enumeration and the serialized
//!   command lock
//! - [`front_end`]: reader capabilities from the PN53x front end
//! - [`poller`]: presence edges published as [`events::NfcEvent`]
//! - [`identify`]: card family from SAK or ATR
//! - [`blocks`]: sector authentication, range reads, and range writes
//!
//! # Native async traits
//!
//! [`transport::ReaderTransport`] uses native `async fn` in traits (Rust
//! 1.90 + Edition 2024 RPITIT). Backends are dispatched through
//! [`devices::AnyTransport`].
//!
//! # Backends
//!
//! The mock backend is always available. Physical readers need the
//! `hardware-hid` and/or `hardware-pcsc` features.
//!
//! ```
//! use evlic_hardware::discovery::Discovery;
//! use evlic_hardware::mock::{MockCard, MockReader};
//! use evlic_hardware::session::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> evlic_hardware::Result<()> {
//!     let (reader, handle) = MockReader::new();
//!     handle.present_card(MockCard::classic_1k(&[0x04, 0xA1, 0xB2, 0xC3])).await;
//!
//!     let session = Discovery::new().with_mock(reader).open_first(SessionConfig::default()).await?;
//!     session.write_card(b"NAME:Alice").await?;
//!
//!     let read = session.read_card().await?;
//!     assert_eq!(read.card.uid.to_hex(), "04A1B2C3");
//!     Ok(())
//! }
//! ```

pub mod apdu;
pub mod blocks;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod events;
pub mod front_end;
#[cfg(feature = "hardware-hid")]
pub mod hid;
pub mod identify;
pub mod mock;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc;
pub mod poller;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{HardwareError, Result};
pub use events::NfcEvent;
pub use poller::{Poller, PollerConfig, PollerSnapshot, PollerState};
pub use session::{CardRead, DetectedCard, Session, SessionConfig, WriteOutcome};
pub use types::{BackendKind, LedColor, ReaderCapabilities, ReaderDevice};
