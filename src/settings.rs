//! Connection configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default EtherNet/IP encapsulation port (TCP and UDP).
pub const DEFAULT_PORT: u16 = 0xAF12;

/// Default I/O timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default number of end-to-end attempts made by `execute`.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default base delay between retry attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Size of the frame buffer owned by each connection.
pub const BUFFER_SIZE: usize = 600;

/// Settings for a connection to an EtherNet/IP device.
///
/// Immutable once handed to a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionSettings {
    /// Host name or IP address of the device.
    pub address: String,
    /// Encapsulation port.
    /// Default: 0xAF12 (44818).
    #[cfg_attr(feature = "serde", serde(default = "default_port"))]
    pub port: u16,
    /// Slot number 0, 1, .. of the controller within the PLC crate.
    pub slot: u8,
    /// Connect, send and receive timeout in milliseconds.
    /// Default: 2000.
    #[cfg_attr(feature = "serde", serde(default = "default_timeout_ms"))]
    pub timeout_ms: u64,
    /// Maximum number of attempts made by `execute`. Zero selects the default.
    /// Default: 3.
    #[cfg_attr(feature = "serde", serde(default = "default_retries"))]
    pub retries: u32,
    /// Base delay for the jittered backoff between attempts, in milliseconds.
    /// Default: 500.
    #[cfg_attr(feature = "serde", serde(default = "default_retry_delay_ms"))]
    pub retry_delay_ms: u64,
}

#[cfg(feature = "serde")]
fn default_port() -> u16 {
    DEFAULT_PORT
}

#[cfg(feature = "serde")]
fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[cfg(feature = "serde")]
fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

#[cfg(feature = "serde")]
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl ConnectionSettings {
    /// Creates settings for `address` and controller `slot` with all other values defaulted.
    pub fn new(address: impl Into<String>, slot: u8) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            slot,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// I/O timeout. A zero value falls back to [`DEFAULT_TIMEOUT_MS`], since a zero
    /// socket timeout would block forever.
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Duration::from_millis(DEFAULT_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }

    /// Number of attempts `execute` makes, never less than one.
    pub fn retry_limit(&self) -> u32 {
        if self.retries > 0 { self.retries } else { DEFAULT_RETRIES }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// `address:port` as used for logging and name resolution.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
