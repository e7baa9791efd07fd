//! The NFC service behind the UI requests.
//!
//! One service owns at most one reader session and the poller running on
//! it. Explicit reads and writes share the session lock with the poller, so
//! a request issued mid-tick waits for the tick to finish.
//!
//! A `DeviceIo` failure ends the session, whether the poller or a request
//! hit it. Every later request fails with `NoDevice` until
//! [`NfcService::refresh_devices`] opens a new one.

use std::sync::Arc;

use evlic_codec::WritePayload;
use evlic_core::Uid;
use evlic_hardware::discovery::Discovery;
use evlic_hardware::events::EVENT_CHANNEL_CAPACITY;
use evlic_hardware::session::UNKNOWN_FIRMWARE;
use evlic_hardware::{
    CardRead, HardwareError, NfcEvent, Poller, ReaderDevice, Session, WriteOutcome,
};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::BridgeResult;
use crate::config::NfcConfig;

/// Answer to a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub connected: bool,
    pub device: Option<ReaderDevice>,
    pub polling: bool,
    pub last_card_uid: Option<Uid>,
}

struct Active {
    session: Arc<Session>,
    poller: Poller,
}

/// Reader lifecycle, card requests, and the event stream.
pub struct NfcService {
    config: NfcConfig,
    discovery: Discovery,
    events: broadcast::Sender<NfcEvent>,
    active: RwLock<Option<Active>>,
}

impl NfcService {
    /// Service over an explicit discovery, e.g. one holding mock readers.
    /// No reader is opened until [`refresh_devices`](Self::refresh_devices).
    #[must_use]
    pub fn new(config: NfcConfig, discovery: Discovery) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            discovery,
            events,
            active: RwLock::new(None),
        }
    }

    /// Service scanning the backends named in the configuration.
    #[must_use]
    pub fn from_config(config: NfcConfig) -> Self {
        let discovery = Discovery::from_kinds(&config.transport.backends);
        Self::new(config, discovery)
    }

    #[must_use]
    pub fn config(&self) -> &NfcConfig {
        &self.config
    }

    /// Receive every event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NfcEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: NfcEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            debug!(event = name, "No event subscribers");
        }
    }

    /// Readers currently attached, across the configured backends.
    pub async fn scan_devices(&self) -> Vec<ReaderDevice> {
        self.discovery.scan().await
    }

    /// Close the current session, if any, and open the first supported
    /// reader. Returns `false` when no reader is attached.
    ///
    /// Emits `DeviceDisconnected` for the old session and `DeviceConnected`
    /// for the new one. Polling starts right away unless disabled.
    ///
    /// # Errors
    /// Returns the hardware error when a found reader cannot be opened, or
    /// `Config` for an unusable key.
    pub async fn refresh_devices(&self) -> BridgeResult<bool> {
        let session_config = self.config.session_config()?;
        let mut active = self.active.write().await;

        if let Some(mut old) = active.take() {
            old.poller.stop().await;
            old.session.close().await;
            self.emit(NfcEvent::DeviceDisconnected {
                reason: "refreshing devices".to_string(),
            });
        }

        let session = match self.discovery.open_first(session_config).await {
            Ok(session) => Arc::new(session),
            Err(HardwareError::DeviceNotFound { detail }) => {
                warn!(%detail, "No reader available");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let device = session.device().clone();
        let firmware = device
            .firmware
            .clone()
            .unwrap_or_else(|| UNKNOWN_FIRMWARE.to_string());
        info!(name = %device.name, %firmware, "Reader connected");
        self.emit(NfcEvent::DeviceConnected { device, firmware });

        let mut poller = Poller::new(
            Arc::clone(&session),
            self.config.poller_config(),
            self.events.clone(),
        );
        if self.config.poller.auto_start {
            poller.start();
        }
        *active = Some(Active { session, poller });
        Ok(true)
    }

    /// Connection and polling state.
    pub async fn get_status(&self) -> ServiceStatus {
        self.reap_faulted().await;
        let active = self.active.read().await;
        match active.as_ref() {
            Some(active) => ServiceStatus {
                connected: true,
                device: Some(active.session.device().clone()),
                polling: active.poller.is_polling(),
                last_card_uid: active.poller.snapshot().last_card_uid,
            },
            None => ServiceStatus {
                connected: false,
                device: None,
                polling: false,
                last_card_uid: None,
            },
        }
    }

    /// Start the poller. Returns `false` if it was already running.
    ///
    /// # Errors
    /// Returns `NoDevice` without an open session.
    pub async fn start_polling(&self) -> BridgeResult<bool> {
        self.reap_faulted().await;
        let mut active = self.active.write().await;
        let active = active.as_mut().ok_or(HardwareError::NoDevice)?;
        Ok(active.poller.start())
    }

    /// Stop the poller. Safe to call when it is not running.
    pub async fn stop_polling(&self) {
        if let Some(active) = self.active.write().await.as_mut() {
            active.poller.stop().await;
        }
    }

    /// Read and decode the card in the field.
    ///
    /// # Errors
    /// `NoDevice`, `NoCardPresent`, or a transport failure.
    pub async fn read_card(&self) -> BridgeResult<CardRead> {
        let session = self.session().await?;
        let result = session.read_card().await;
        self.settle(&session, result).await
    }

    /// Encode `payload` with the configured wire format and write it to the
    /// card in the field.
    ///
    /// # Errors
    /// `NoDevice`, `NoCardPresent`, `BlockWrite`, or a codec error when the
    /// payload does not fit.
    pub async fn write_card(&self, payload: &WritePayload) -> BridgeResult<WriteOutcome> {
        let bytes = self.config.codec.encoder().encode(payload)?;
        let session = self.session().await?;
        let result = session.write_card(&bytes).await;
        self.settle(&session, result).await
    }

    /// Stop polling and close the reader.
    pub async fn shutdown(&self) {
        let Some(mut active) = self.active.write().await.take() else {
            return;
        };
        active.poller.stop().await;
        active.session.close().await;
        self.emit(NfcEvent::DeviceDisconnected {
            reason: "shutdown".to_string(),
        });
    }

    async fn session(&self) -> BridgeResult<Arc<Session>> {
        self.reap_faulted().await;
        let active = self.active.read().await;
        let active = active.as_ref().ok_or(HardwareError::NoDevice)?;
        Ok(Arc::clone(&active.session))
    }

    /// Drop a session whose poller died on a device fault. The poller has
    /// already announced the disconnect.
    async fn reap_faulted(&self) {
        let faulted = {
            let active = self.active.read().await;
            active
                .as_ref()
                .is_some_and(|a| a.poller.snapshot().fault.is_some())
        };
        if !faulted {
            return;
        }

        let mut active = self.active.write().await;
        if active
            .as_ref()
            .is_some_and(|a| a.poller.snapshot().fault.is_some())
            && let Some(mut dead) = active.take()
        {
            dead.poller.stop().await;
            info!(name = %dead.session.device().name, "Dropped faulted reader session");
        }
    }

    async fn settle<T>(
        &self,
        session: &Arc<Session>,
        result: evlic_hardware::Result<T>,
    ) -> BridgeResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_fatal() {
                    self.disconnect(session, &e.to_string()).await;
                }
                Err(e.into())
            }
        }
    }

    /// End `session` after a device fault, unless it was already replaced.
    async fn disconnect(&self, session: &Arc<Session>, reason: &str) {
        let mut active = self.active.write().await;
        if !active
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(&a.session, session))
        {
            return;
        }
        if let Some(mut dead) = active.take() {
            dead.poller.stop().await;
            warn!(name = %dead.session.device().name, reason, "Reader session lost");
            self.emit(NfcEvent::DeviceDisconnected {
                reason: reason.to_string(),
            });
        }
    }
}
