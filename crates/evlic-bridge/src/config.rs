//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `EVLIC_`-prefixed environment variables. Nested keys use a double
//! underscore, so `EVLIC_POLLER__INTERVAL_MS=500` sets `poller.interval_ms`.
//!
//! ```toml
//! log_level = "debug"
//!
//! [poller]
//! interval_ms = 500
//!
//! [transport]
//! backends = ["pcsc"]
//! command_timeout_ms = 4000
//!
//! [codec]
//! format = "ndef"
//! ```

use std::path::Path;
use std::time::Duration;

use evlic_codec::{Encoder, WireFormat};
use evlic_core::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_KEY_A, DEFAULT_MAX_DATA_BLOCKS, DEFAULT_POLL_INTERVAL_MS,
    MAX_COMMAND_TIMEOUT_MS, MAX_POLL_INTERVAL_MS, MIN_COMMAND_TIMEOUT_MS, MIN_POLL_INTERVAL_MS,
    NDEF_DEFAULT_LANGUAGE, POLL_COMMAND_TIMEOUT_MS,
};
use evlic_hardware::{BackendKind, SessionConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{BridgeError, BridgeResult};

/// Prefix of environment variables read by [`NfcConfig::load`].
pub const ENV_PREFIX: &str = "EVLIC_";

/// NFC subsystem configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfcConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub poller: PollerConfig,
    pub transport: TransportConfig,
    pub codec: CodecConfig,
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            poller: PollerConfig::default(),
            transport: TransportConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

/// Card presence polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Start polling as soon as a reader session opens.
    pub auto_start: bool,
    /// Delay between ticks in milliseconds.
    pub interval_ms: u64,
    /// Deadline for the detection commands of one tick.
    pub timeout_ms: u64,
    /// Read and decode the card when it is detected.
    pub read_on_detect: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: POLL_COMMAND_TIMEOUT_MS,
            read_on_detect: true,
        }
    }
}

/// Reader discovery and command exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Backends scanned for readers, in order.
    pub backends: Vec<BackendKind>,
    /// Deadline for one command/response exchange.
    pub command_timeout_ms: u64,
    /// MIFARE Classic key A as 12 hex digits.
    pub key_a: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Hid, BackendKind::Pcsc],
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            key_a: hex::encode_upper(DEFAULT_KEY_A),
        }
    }
}

impl TransportConfig {
    /// Parsed key A.
    ///
    /// # Errors
    /// Returns `Config` unless `key_a` is exactly six bytes of hex.
    pub fn key_a_bytes(&self) -> BridgeResult<[u8; 6]> {
        let bytes = hex::decode(self.key_a.trim())
            .map_err(|e| BridgeError::config(format!("transport.key_a: {e}")))?;
        <[u8; 6]>::try_from(bytes.as_slice()).map_err(|_| {
            BridgeError::config(format!(
                "transport.key_a must be 6 bytes, got {}",
                bytes.len()
            ))
        })
    }
}

/// Payload encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Wire format used for writes. Reads detect the format themselves.
    pub format: WireFormat,
    /// Language code of NDEF text records.
    pub language: String,
    /// Largest payload, in data blocks, written to or read from a card.
    pub max_data_blocks: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            format: WireFormat::default(),
            language: NDEF_DEFAULT_LANGUAGE.to_string(),
            max_data_blocks: DEFAULT_MAX_DATA_BLOCKS,
        }
    }
}

impl CodecConfig {
    #[must_use]
    pub fn encoder(&self) -> Encoder {
        Encoder::new(self.format).with_language(self.language.clone())
    }
}

impl NfcConfig {
    /// Load defaults, then `path` if given, then the environment, and
    /// validate the result. A missing file is not an error.
    ///
    /// # Errors
    /// Returns `Config` for malformed sources or out-of-range values.
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns `Config` naming the first offending key.
    pub fn validate(&self) -> BridgeResult<()> {
        check_range(
            "poller.interval_ms",
            self.poller.interval_ms,
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
        )?;
        check_range(
            "poller.timeout_ms",
            self.poller.timeout_ms,
            MIN_COMMAND_TIMEOUT_MS,
            MAX_COMMAND_TIMEOUT_MS,
        )?;
        check_range(
            "transport.command_timeout_ms",
            self.transport.command_timeout_ms,
            MIN_COMMAND_TIMEOUT_MS,
            MAX_COMMAND_TIMEOUT_MS,
        )?;
        self.transport.key_a_bytes()?;

        let language = &self.codec.language;
        // NDEF stores the code length in six bits.
        if language.is_empty() || language.len() > 0x3F || !language.is_ascii() {
            return Err(BridgeError::config(format!(
                "codec.language {language:?} is not a valid language code"
            )));
        }
        if self.codec.max_data_blocks == 0 {
            return Err(BridgeError::config("codec.max_data_blocks must be at least 1"));
        }
        Ok(())
    }

    /// Session settings derived from this configuration.
    ///
    /// # Errors
    /// Returns `Config` for an unparsable key.
    pub fn session_config(&self) -> BridgeResult<SessionConfig> {
        Ok(SessionConfig {
            command_timeout: Duration::from_millis(self.transport.command_timeout_ms),
            key_a: self.transport.key_a_bytes()?,
            max_data_blocks: self.codec.max_data_blocks,
        })
    }

    /// Poll loop settings derived from this configuration.
    #[must_use]
    pub fn poller_config(&self) -> evlic_hardware::PollerConfig {
        evlic_hardware::PollerConfig {
            interval: Duration::from_millis(self.poller.interval_ms),
            command_timeout: Duration::from_millis(self.poller.timeout_ms),
            read_on_detect: self.poller.read_on_detect,
        }
    }
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> BridgeResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(BridgeError::config(format!(
            "{key} = {value} is outside {min}..={max}"
        )))
    }
}
