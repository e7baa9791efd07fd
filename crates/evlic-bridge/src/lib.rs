//! # evlic-bridge
//!
//! Glue between the NFC subsystem and the desktop UI: configuration
//! loading, tracing setup, the [`NfcService`] that owns the reader
//! lifecycle, and the string-named requests the IPC layer forwards.
//!
//! ## Example
//!
//! ```
//! use evlic_bridge::{NfcConfig, NfcService, request};
//! use evlic_hardware::discovery::Discovery;
//! use evlic_hardware::mock::{MockCard, MockReader};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (reader, handle) = MockReader::new();
//!     handle
//!         .present_card(MockCard::classic_1k(&[0x04, 0xA1, 0xB2, 0xC3]))
//!         .await;
//!
//!     let service = NfcService::new(NfcConfig::default(), Discovery::new().with_mock(reader));
//!     let refreshed = request::invoke(&service, "nfc.refreshDevices", json!(null)).await;
//!     assert_eq!(refreshed["success"], true);
//!
//!     let written = request::invoke(
//!         &service,
//!         "nfc.writeCard",
//!         json!({ "holderName": "Ana Souza", "licenseType": "EV-B" }),
//!     )
//!     .await;
//!     assert_eq!(written["success"], true);
//!
//!     let read = request::invoke(&service, "nfc.readCard", json!(null)).await;
//!     assert_eq!(read["payload"]["payload"]["record"]["holderName"], "Ana Souza");
//!     service.shutdown().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod request;
pub mod service;

pub use config::{CodecConfig, NfcConfig, PollerConfig, TransportConfig};
pub use error::{BridgeError, BridgeResult};
pub use request::{Operation, invoke};
pub use service::{NfcService, ServiceStatus};
