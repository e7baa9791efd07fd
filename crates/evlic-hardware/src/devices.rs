//! Enum wrapper for transport dispatch.
//!
//! Native `async fn` in traits (RPITIT, Rust Edition 2024) is not
//! object-safe, so `Box<dyn ReaderTransport>` is not an option. Sessions hold
//! an [`AnyTransport`] instead, with one variant per compiled-in backend.
//!
//! # Examples
//!
//! ```
//! use evlic_hardware::devices::AnyTransport;
//! use evlic_hardware::mock::MockReader;
//!
//! let (reader, _handle) = MockReader::new();
//! let transport = AnyTransport::Mock(reader);
//!
//! // Can now be used polymorphically through the ReaderTransport trait
//! ```

use std::time::Duration;

use crate::Result;
use crate::mock::MockReader;
use crate::transport::ReaderTransport;
use crate::types::BackendKind;

#[cfg(feature = "hardware-hid")]
use crate::hid::HidTransport;
#[cfg(feature = "hardware-pcsc")]
use crate::pcsc::PcscTransport;

/// Enum wrapper for reader transport dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// Simulated reader for development and testing.
    Mock(MockReader),

    /// ACR122-family reader over USB HID.
    #[cfg(feature = "hardware-hid")]
    Hid(HidTransport),

    /// Any reader known to the PC/SC resource manager.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscTransport),
}

impl AnyTransport {
    /// Backend behind this transport.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Mock(_) => BackendKind::Mock,
            #[cfg(feature = "hardware-hid")]
            Self::Hid(_) => BackendKind::Hid,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(_) => BackendKind::Pcsc,
        }
    }
}

impl ReaderTransport for AnyTransport {
    async fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        match self {
            Self::Mock(transport) => transport.send(apdu, timeout).await,
            #[cfg(feature = "hardware-hid")]
            Self::Hid(transport) => transport.send(apdu, timeout).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(transport) => transport.send(apdu, timeout).await,
        }
    }

    fn atr(&self) -> Option<Vec<u8>> {
        match self {
            Self::Mock(transport) => transport.atr(),
            #[cfg(feature = "hardware-hid")]
            Self::Hid(transport) => transport.atr(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(transport) => transport.atr(),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(transport) => transport.close().await,
            #[cfg(feature = "hardware-hid")]
            Self::Hid(transport) => transport.close().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(transport) => transport.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu;

    #[tokio::test]
    async fn test_any_transport_mock() {
        let (reader, _handle) = MockReader::new();
        let mut transport = AnyTransport::Mock(reader);
        assert_eq!(transport.backend(), BackendKind::Mock);

        let reply = transport
            .send(apdu::request_type_a().as_bytes(), Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(reply, vec![0xD5, 0x4B, 0x00, 0x90, 0x00]);
        assert_eq!(transport.atr(), None);
        transport.close().await.unwrap();
    }
}
