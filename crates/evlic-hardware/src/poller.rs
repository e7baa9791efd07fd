//! Card presence poller.
//!
//! The poller drives the active session on a fixed interval and turns what
//! it sees into presence edges.
//!
//! # Architecture
//!
//! ```text
//! interval ──tick──► lock session ──► request-A (+ read) ──► PollState
//!    ▲                                                          │ edge
//!    │ cancel                                                   ▼
//! stop()                        broadcast<NfcEvent> + watch<PollerSnapshot>
//! ```
//!
//! State machine: `Idle → Polling → (CardPresent ⇄ CardAbsent) → Stopped`.
//!
//! Tick errors never leave the loop. A `DeviceIo` fault is the exception
//! that ends it: the poller emits `Error` and `DeviceDisconnected`, moves to
//! `Stopped`, and leaves recovery to the owner.

use std::sync::Arc;
use std::time::Duration;

use evlic_core::{
    CardSession, Uid,
    constants::{
        DEFAULT_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS,
        POLL_COMMAND_TIMEOUT_MS,
    },
};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::events::NfcEvent;
use crate::session::{DetectedCard, Session};

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollerState {
    /// Created, never started.
    Idle,
    /// Started, no tick has completed yet.
    Polling,
    /// A card is held.
    CardPresent,
    /// No card in the field.
    CardAbsent,
    /// Stopped by the owner or by a device fault.
    Stopped,
}

/// What subscribers see of the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerSnapshot {
    pub state: PollerState,
    /// Card currently held, if any.
    pub session: Option<CardSession>,
    /// UID of the most recently detected card, kept after removal.
    pub last_card_uid: Option<Uid>,
    /// Set when `stop()` ended polling.
    pub stopped_by_user: bool,
    /// Device fault that ended polling.
    pub fault: Option<String>,
}

impl Default for PollerSnapshot {
    fn default() -> Self {
        Self {
            state: PollerState::Idle,
            session: None,
            last_card_uid: None,
            stopped_by_user: false,
            fault: None,
        }
    }
}

/// Poller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Deadline for each poll command.
    pub command_timeout: Duration,
    /// Read and decode the card payload when a new card is detected.
    pub read_on_detect: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            command_timeout: Duration::from_millis(POLL_COMMAND_TIMEOUT_MS),
            read_on_detect: true,
        }
    }
}

impl PollerConfig {
    /// Interval clamped to the supported range.
    #[must_use]
    pub fn clamped_interval(&self) -> Duration {
        self.interval.clamp(
            Duration::from_millis(MIN_POLL_INTERVAL_MS),
            Duration::from_millis(MAX_POLL_INTERVAL_MS),
        )
    }
}

/// Presence edge produced by one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A card with a new UID appeared (possibly replacing another).
    Detected(CardSession),
    /// The held card is gone.
    Removed(CardSession),
    /// Same card as before, or still nothing.
    Unchanged,
}

/// Held-card bookkeeping, separate from I/O so it can be tested directly.
#[derive(Debug, Default)]
pub struct PollState {
    current: Option<CardSession>,
}

impl PollState {
    /// Fold one detection result into the held session.
    pub fn observe(&mut self, seen: Option<DetectedCard>) -> Transition {
        let Some(card) = seen else {
            return match self.current.take() {
                Some(session) => Transition::Removed(session),
                None => Transition::Unchanged,
            };
        };

        if let Some(held) = self.current.as_mut()
            && held.uid == card.uid
        {
            held.touch();
            return Transition::Unchanged;
        }

        let session = CardSession::new(card.uid, card.info, card.atr);
        self.current = Some(session.clone());
        Transition::Detected(session)
    }

    /// Card currently held.
    #[must_use]
    pub fn current(&self) -> Option<&CardSession> {
        self.current.as_ref()
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

/// Polls one session for card presence.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use evlic_hardware::discovery::Discovery;
/// use evlic_hardware::mock::MockReader;
/// use evlic_hardware::poller::{Poller, PollerConfig, PollerState};
/// use evlic_hardware::session::SessionConfig;
/// use tokio::sync::broadcast;
///
/// #[tokio::main]
/// async fn main() -> evlic_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new();
///     let session = Discovery::new()
///         .with_mock(reader)
///         .open_first(SessionConfig::default())
///         .await?;
///
///     let (events, _rx) = broadcast::channel(16);
///     let mut poller = Poller::new(Arc::new(session), PollerConfig::default(), events);
///     poller.start();
///     poller.stop().await;
///     assert_eq!(poller.snapshot().state, PollerState::Stopped);
///     Ok(())
/// }
/// ```
pub struct Poller {
    session: Arc<Session>,
    config: PollerConfig,
    events: broadcast::Sender<NfcEvent>,
    state: Arc<watch::Sender<PollerSnapshot>>,
    running: Option<Running>,
}

impl Poller {
    pub fn new(
        session: Arc<Session>,
        config: PollerConfig,
        events: broadcast::Sender<NfcEvent>,
    ) -> Self {
        let (state, _) = watch::channel(PollerSnapshot::default());
        Self {
            session,
            config,
            events,
            state: Arc::new(state),
            running: None,
        }
    }

    /// Start polling. Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        if self.running.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        self.state.send_modify(|s| {
            s.state = PollerState::Polling;
            s.session = None;
            s.stopped_by_user = false;
            s.fault = None;
        });

        let task = tokio::spawn(run(
            Arc::clone(&self.session),
            self.config,
            self.events.clone(),
            Arc::clone(&self.state),
            cancel.clone(),
        ));
        info!(interval_ms = self.config.clamped_interval().as_millis() as u64, "Poller started");
        self.running = Some(Running { cancel, task });
        true
    }

    /// Stop polling and wait for the loop to exit.
    ///
    /// Clears the held card without emitting `CardRemoved`. Calling it again
    /// is a no-op.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();

        match classify_task_result(running.task.await) {
            TaskTermination::Success | TaskTermination::Cancelled => {}
            TaskTermination::Error => debug!("Poll loop had ended on a device fault"),
            TaskTermination::Panic => error!("Poll loop panicked"),
        }

        self.state.send_modify(|s| {
            s.state = PollerState::Stopped;
            s.session = None;
            s.stopped_by_user = true;
        });
        info!("Poller stopped");
    }

    /// Returns `true` while the poll loop is alive.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PollerSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that sees every snapshot change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<PollerSnapshot> {
        self.state.subscribe()
    }

    /// Session being polled.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Task termination classification for shutdown handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Success,
    Error,
    Cancelled,
    Panic,
}

fn classify_task_result(
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> TaskTermination {
    match result {
        Ok(Ok(())) => TaskTermination::Success,
        Ok(Err(_)) => TaskTermination::Error,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

async fn run(
    session: Arc<Session>,
    config: PollerConfig,
    events: broadcast::Sender<NfcEvent>,
    state: Arc<watch::Sender<PollerSnapshot>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(config.clamped_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll = PollState::default();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            _ = interval.tick() => {}
        }

        if let Err(e) = tick(&session, &config, &mut poll, &events, &state).await {
            error!(error = %e, "Reader lost, polling stopped");
            let message = e.to_string();
            state.send_modify(|s| {
                s.state = PollerState::Stopped;
                s.session = None;
                s.fault = Some(message.clone());
            });
            // No receivers is fine
            let _ = events.send(NfcEvent::Error {
                message: message.clone(),
                cause: Some("device-io".to_string()),
            });
            let _ = events.send(NfcEvent::DeviceDisconnected { reason: message });
            return Err(e);
        }
    }
}

/// One poll cycle. Holds the session lock for the whole APDU sequence.
/// Only fatal errors are returned.
async fn tick(
    session: &Session,
    config: &PollerConfig,
    poll: &mut PollState,
    events: &broadcast::Sender<NfcEvent>,
    state: &watch::Sender<PollerSnapshot>,
) -> Result<()> {
    let mut link = session.lock().await;
    let seen = match link.detect(config.command_timeout).await {
        Ok(seen) => seen,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!(error = %e, "Poll tick failed, treating as no card");
            None
        }
    };

    match poll.observe(seen.clone()) {
        Transition::Detected(card) => {
            let payload = match seen.filter(|_| config.read_on_detect) {
                Some(detected) => {
                    let session_config = session.config();
                    match link
                        .read_card(detected, session_config.key_a, session_config.max_data_blocks)
                        .await
                    {
                        Ok(read) => Some(read.payload),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!(uid = %card.uid, error = %e, "Reading detected card failed");
                            None
                        }
                    }
                }
                None => None,
            };
            drop(link);

            info!(uid = %card.uid, family = %card.info.family, "Card detected");
            let event = NfcEvent::CardDetected {
                uid: card.uid.clone(),
                card_type: card.info.family,
                technology: card.info.technology,
                payload,
            };
            state.send_modify(|s| {
                s.state = PollerState::CardPresent;
                s.last_card_uid = Some(card.uid.clone());
                s.session = Some(card);
            });
            let _ = events.send(event);
        }
        Transition::Removed(card) => {
            drop(link);
            info!(uid = %card.uid, "Card removed");
            state.send_modify(|s| {
                s.state = PollerState::CardAbsent;
                s.session = None;
            });
            let _ = events.send(NfcEvent::CardRemoved { uid: card.uid });
        }
        Transition::Unchanged => {
            drop(link);
            let current = poll.current().cloned();
            state.send_if_modified(|s| {
                let next = if current.is_some() {
                    PollerState::CardPresent
                } else {
                    PollerState::CardAbsent
                };
                let changed = s.state != next;
                s.state = next;
                s.session = current;
                changed
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evlic_core::{CardFamily, CardInfo};

    fn detected(uid: &[u8]) -> DetectedCard {
        DetectedCard {
            uid: Uid::from_bytes(uid).unwrap(),
            info: CardInfo::for_family(CardFamily::Classic1K),
            atr: Vec::new(),
        }
    }

    #[test]
    fn test_same_uid_is_suppressed() {
        let mut poll = PollState::default();
        let a = detected(&[1, 2, 3, 4]);
        let b = detected(&[5, 6, 7, 8]);

        let edges: Vec<_> = [Some(a.clone()), Some(a.clone()), None, Some(a), Some(b)]
            .into_iter()
            .map(|seen| match poll.observe(seen) {
                Transition::Detected(s) => format!("detected {}", s.uid),
                Transition::Removed(s) => format!("removed {}", s.uid),
                Transition::Unchanged => "unchanged".to_string(),
            })
            .collect();

        assert_eq!(
            edges,
            [
                "detected 01020304",
                "unchanged",
                "removed 01020304",
                "detected 01020304",
                "detected 05060708",
            ]
        );
        assert_eq!(poll.current().unwrap().uid.to_hex(), "05060708");
    }

    #[test]
    fn test_same_uid_updates_last_seen() {
        let mut poll = PollState::default();
        poll.observe(Some(detected(&[1, 2, 3, 4])));
        let first = poll.current().unwrap().clone();
        poll.observe(Some(detected(&[1, 2, 3, 4])));
        let second = poll.current().unwrap();
        assert_eq!(second.first_seen, first.first_seen);
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn test_nothing_seen_without_session() {
        let mut poll = PollState::default();
        assert_eq!(poll.observe(None), Transition::Unchanged);
    }

    #[test]
    fn test_interval_is_clamped() {
        let config = PollerConfig {
            interval: Duration::from_millis(5),
            ..PollerConfig::default()
        };
        assert_eq!(config.clamped_interval(), Duration::from_millis(100));
    }
}
