//! ACR122-family readers over USB HID.
//!
//! Commands travel as CCID messages split into 64-byte output reports, each
//! prefixed with report id `0x00`. The reply is reassembled from input
//! reports until the length announced in its CCID header has arrived.
//! `hidapi` calls block, so every exchange runs on the blocking pool.

use std::ffi::CString;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hidapi::{HidApi, HidDevice, HidError};
use tracing::{debug, trace};

use crate::discovery::known_reader;
use crate::transport::{CcidFraming, Framing, ReaderTransport};
use crate::types::{BackendKind, ReaderDevice};
use crate::{HardwareError, Result};

/// HID report payload size.
const REPORT_LEN: usize = 64;

/// Report id prepended to every output report.
const REPORT_ID: u8 = 0x00;

fn hid_error(error: HidError) -> HardwareError {
    HardwareError::device_io(format!("HID: {error}"))
}

/// List HID devices that match the known-reader table.
///
/// # Errors
/// Returns `DeviceIo` if the HID subsystem cannot be initialized.
pub fn enumerate() -> Result<Vec<ReaderDevice>> {
    let api = HidApi::new().map_err(hid_error)?;
    let devices = api
        .device_list()
        .filter_map(|info| {
            let known = known_reader(info.vendor_id(), info.product_id())?;
            let mut device = ReaderDevice::new(
                known.name,
                info.path().to_string_lossy().into_owned(),
                BackendKind::Hid,
            )
            .with_usb_ids(info.vendor_id(), info.product_id());
            if let Some(serial) = info.serial_number().filter(|s| !s.is_empty()) {
                device = device.with_serial_number(serial);
            }
            Some(device)
        })
        .collect();
    Ok(devices)
}

/// Transport over one opened HID device.
pub struct HidTransport {
    device: Arc<Mutex<HidDevice>>,
    framing: CcidFraming,
    path: String,
}

impl std::fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidTransport")
            .field("path", &self.path)
            .finish()
    }
}

impl HidTransport {
    /// Open the HID device at `path`.
    ///
    /// # Errors
    /// Returns `DeviceIo` if the device cannot be opened.
    pub async fn open(path: &str) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|e| HardwareError::device_io(format!("invalid HID path: {e}")))?;
        let device = tokio::task::spawn_blocking(move || {
            let api = HidApi::new().map_err(hid_error)?;
            api.open_path(&c_path).map_err(hid_error)
        })
        .await??;

        debug!(path, "HID reader opened");
        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            framing: CcidFraming::new(0),
            path: path.to_string(),
        })
    }
}

fn exchange_blocking(device: &HidDevice, frame: &[u8], timeout: Duration) -> Result<Vec<u8>> {
    for chunk in frame.chunks(REPORT_LEN) {
        let mut report = [0u8; REPORT_LEN + 1];
        report[0] = REPORT_ID;
        report[1..=chunk.len()].copy_from_slice(chunk);
        device.write(&report).map_err(hid_error)?;
    }

    let deadline = Instant::now() + timeout;
    let mut reply = Vec::new();
    let mut buf = [0u8; REPORT_LEN];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HardwareError::timeout(timeout.as_millis() as u64));
        }
        let millis = i32::try_from(remaining.as_millis()).unwrap_or(i32::MAX);
        let n = device.read_timeout(&mut buf, millis).map_err(hid_error)?;
        reply.extend_from_slice(&buf[..n]);
        if let Some(total) = CcidFraming::expected_len(&reply)
            && reply.len() >= total
        {
            reply.truncate(total);
            return Ok(reply);
        }
    }
}

impl ReaderTransport for HidTransport {
    async fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let frame = self.framing.frame(apdu);
        trace!(path = %self.path, frame = %hex::encode_upper(&frame), "HID write");

        let device = Arc::clone(&self.device);
        let raw = tokio::task::spawn_blocking(move || {
            let device = device
                .lock()
                .map_err(|_| HardwareError::device_io("HID handle poisoned"))?;
            exchange_blocking(&device, &frame, timeout)
        })
        .await??;

        self.framing.unframe(&raw)
    }

    async fn close(&mut self) -> Result<()> {
        debug!(path = %self.path, "HID reader closed");
        Ok(())
    }
}
