//! Reader discovery.
//!
//! Discovery asks each configured backend for candidate readers and keeps
//! the ones that match a static table of supported models. HID devices
//! match by USB vendor/product id, PC/SC readers by a fragment of their
//! reader name. The first match becomes the active reader; the rest stay
//! available for a later switch.

use tracing::{debug, info, warn};

use crate::devices::AnyTransport;
use crate::mock::MockReader;
use crate::session::{Session, SessionConfig};
use crate::types::{BackendKind, ReaderDevice};
use crate::{HardwareError, Result};

/// USB vendor id of Advanced Card Systems.
pub const ACS_VENDOR_ID: u16 = 0x072F;

/// Reader model class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderClass {
    /// Contactless (PN532 front end).
    Contactless,
    /// Dual interface, contact and contactless.
    DualInterface,
    /// Contact-only; listed so it is recognized but never selected.
    Contact,
}

/// One entry of the supported-reader table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownReader {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: &'static str,
    pub class: ReaderClass,
}

/// Supported readers by USB id.
pub const KNOWN_READERS: &[KnownReader] = &[
    KnownReader {
        vendor_id: ACS_VENDOR_ID,
        product_id: 0x2200,
        name: "ACR122U",
        class: ReaderClass::Contactless,
    },
    KnownReader {
        vendor_id: ACS_VENDOR_ID,
        product_id: 0x2214,
        name: "ACR1222L",
        class: ReaderClass::Contactless,
    },
    KnownReader {
        vendor_id: ACS_VENDOR_ID,
        product_id: 0x223B,
        name: "ACR1252U",
        class: ReaderClass::Contactless,
    },
    KnownReader {
        vendor_id: ACS_VENDOR_ID,
        product_id: 0x2219,
        name: "ACR1251",
        class: ReaderClass::DualInterface,
    },
    KnownReader {
        vendor_id: ACS_VENDOR_ID,
        product_id: 0x90CC,
        name: "ACR38U",
        class: ReaderClass::Contact,
    },
];

/// Reader-name fragments accepted from PC/SC, checked case-insensitively in
/// order. A fragment must come before any of its own prefixes.
const PCSC_NAME_FRAGMENTS: &[(&str, &str)] = &[
    ("acr1222", "ACR1222L"),
    ("acr1251", "ACR1251"),
    ("acr1252", "ACR1252U"),
    ("acr122", "ACR122U"),
    ("picc", "PC/SC contactless reader"),
    ("contactless", "PC/SC contactless reader"),
];

/// Look up a supported contactless reader by USB id.
#[must_use]
pub fn known_reader(vendor_id: u16, product_id: u16) -> Option<&'static KnownReader> {
    KNOWN_READERS.iter().find(|r| {
        r.vendor_id == vendor_id && r.product_id == product_id && r.class != ReaderClass::Contact
    })
}

/// Display name for a PC/SC reader, if its name marks it as supported.
#[must_use]
pub fn known_reader_name(reader_name: &str) -> Option<&'static str> {
    let lower = reader_name.to_ascii_lowercase();
    PCSC_NAME_FRAGMENTS
        .iter()
        .find(|(fragment, _)| lower.contains(fragment))
        .map(|(_, name)| *name)
}

/// Where discovery looks for readers.
#[derive(Debug, Clone)]
pub enum Backend {
    /// USB HID enumeration.
    Hid,
    /// PC/SC resource manager.
    Pcsc,
    /// An in-process simulated reader.
    Mock(MockReader),
}

impl Backend {
    async fn scan(&self) -> Result<Vec<ReaderDevice>> {
        match self {
            #[cfg(feature = "hardware-hid")]
            Self::Hid => tokio::task::spawn_blocking(crate::hid::enumerate).await?,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc => tokio::task::spawn_blocking(crate::pcsc::enumerate).await?,
            #[cfg(not(feature = "hardware-hid"))]
            Self::Hid => Err(HardwareError::unsupported("HID backend not compiled in")),
            #[cfg(not(feature = "hardware-pcsc"))]
            Self::Pcsc => Err(HardwareError::unsupported("PC/SC backend not compiled in")),
            Self::Mock(reader) => Ok(vec![reader.device()]),
        }
    }
}

/// Enumerates readers and opens sessions on them.
///
/// # Examples
///
/// ```
/// use evlic_hardware::discovery::Discovery;
/// use evlic_hardware::mock::MockReader;
/// use evlic_hardware::session::SessionConfig;
///
/// #[tokio::main]
/// async fn main() -> evlic_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new();
///     let discovery = Discovery::new().with_mock(reader);
///
///     let session = discovery.open_first(SessionConfig::default()).await?;
///     assert_eq!(session.device().firmware.as_deref(), Some("ACR122U207"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    backends: Vec<Backend>,
}

impl Discovery {
    /// Discovery with no backends.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery over the given backend kinds.
    ///
    /// `BackendKind::Mock` has no system-wide meaning and is ignored here;
    /// add simulated readers with [`with_mock`](Self::with_mock).
    #[must_use]
    pub fn from_kinds(kinds: &[BackendKind]) -> Self {
        let backends = kinds
            .iter()
            .filter_map(|kind| match kind {
                BackendKind::Hid => Some(Backend::Hid),
                BackendKind::Pcsc => Some(Backend::Pcsc),
                BackendKind::Mock => None,
            })
            .collect();
        Self { backends }
    }

    /// Add a simulated reader.
    #[must_use]
    pub fn with_mock(mut self, reader: MockReader) -> Self {
        self.backends.push(Backend::Mock(reader));
        self
    }

    /// Add a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backends.push(backend);
        self
    }

    /// List all supported readers across backends, in backend order.
    ///
    /// A backend that fails to enumerate is logged and skipped.
    pub async fn scan(&self) -> Vec<ReaderDevice> {
        let mut found = Vec::new();
        for backend in &self.backends {
            match backend.scan().await {
                Ok(devices) => found.extend(devices),
                Err(e) => warn!(?backend, error = %e, "Reader scan failed"),
            }
        }
        debug!(count = found.len(), "Reader scan complete");
        found
    }

    /// Open a transport to `device`.
    ///
    /// # Errors
    /// - `DeviceNotFound` when the device's backend is not configured
    /// - `DeviceIo` when the device cannot be opened
    pub async fn connect(&self, device: &ReaderDevice) -> Result<AnyTransport> {
        match device.backend {
            BackendKind::Mock => self
                .backends
                .iter()
                .find_map(|backend| match backend {
                    Backend::Mock(reader) if reader.device().path == device.path => {
                        Some(AnyTransport::Mock(reader.clone()))
                    }
                    _ => None,
                })
                .ok_or_else(|| HardwareError::device_not_found(device.path.clone())),
            #[cfg(feature = "hardware-hid")]
            BackendKind::Hid => Ok(AnyTransport::Hid(
                crate::hid::HidTransport::open(&device.path).await?,
            )),
            #[cfg(feature = "hardware-pcsc")]
            BackendKind::Pcsc => Ok(AnyTransport::Pcsc(crate::pcsc::PcscTransport::open(
                &device.path,
            )?)),
            #[allow(unreachable_patterns)]
            other => Err(HardwareError::device_not_found(format!(
                "{other} backend not compiled in"
            ))),
        }
    }

    /// Open a session on `device`.
    ///
    /// # Errors
    /// See [`connect`](Self::connect).
    pub async fn open(&self, device: ReaderDevice, config: SessionConfig) -> Result<Session> {
        let transport = self.connect(&device).await?;
        Session::open(device, transport, config).await
    }

    /// Scan and open a session on the first supported reader.
    ///
    /// # Errors
    /// Returns `DeviceNotFound` when no supported reader is attached.
    pub async fn open_first(&self, config: SessionConfig) -> Result<Session> {
        let devices = self.scan().await;
        let Some(device) = devices.into_iter().next() else {
            return Err(HardwareError::device_not_found(
                "no supported contactless reader attached",
            ));
        };
        info!(name = %device.name, backend = %device.backend, "Opening reader");
        self.open(device, config).await
    }
}
