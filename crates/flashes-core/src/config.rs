//! Transfer configuration shared by the device server and the host client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{DEFAULT_BLOCK_SIZE, DEFAULT_PORT};

/// Timeouts, block size and port for one transfer endpoint.
///
/// Loaded from JSON by the emulator; unknown fields are rejected and missing
/// ones take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Device listening port, and the port the host appends to bare addresses.
    ///
    /// Default: 6827.
    pub port: u16,

    /// Largest data block in bytes (1-65535).
    ///
    /// The device additionally requires a multiple of the flash program unit.
    /// Default: 1024.
    pub max_block_size: usize,

    /// Device per-read timeout in milliseconds.
    pub read_timeout_ms: u64,

    /// Per-write timeout in milliseconds, both ends.
    pub write_timeout_ms: u64,

    /// Host wait for each acknowledgment in milliseconds.
    ///
    /// Default: 20000, long enough to cover a multi-sector erase.
    pub response_timeout_ms: u64,

    /// Host connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// How long the device listens without a client before launching the
    /// installed application. `None` waits forever.
    pub idle_fallback_ms: Option<u64>,

    /// Pause between the final acknowledgment and the reset, in milliseconds.
    pub ack_flush_delay_ms: u64,
}

impl TransferConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=usize::from(u16::MAX)).contains(&self.max_block_size) {
            return Err(ConfigError::invalid(
                "max_block_size must be between 1 and 65535",
            ));
        }
        let timeouts = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::invalid(format!("{name} must be non-zero")));
        }
        if self.idle_fallback_ms == Some(0) {
            return Err(ConfigError::invalid(
                "idle_fallback_ms must be non-zero when set",
            ));
        }
        Ok(())
    }

    /// Device per-read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Per-write timeout.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Host acknowledgment timeout.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Host connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Device idle window before launching the installed application.
    #[must_use]
    pub fn idle_fallback(&self) -> Option<Duration> {
        self.idle_fallback_ms.map(Duration::from_millis)
    }

    /// Pause between the final acknowledgment and the reset.
    #[must_use]
    pub fn ack_flush_delay(&self) -> Duration {
        Duration::from_millis(self.ack_flush_delay_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_block_size: DEFAULT_BLOCK_SIZE,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            response_timeout_ms: 20000,
            connect_timeout_ms: 5000,
            idle_fallback_ms: Some(5000),
            ack_flush_delay_ms: 100,
        }
    }
}

/// Builder for `TransferConfig`.
#[derive(Debug, Default)]
pub struct TransferConfigBuilder {
    config: TransferConfig,
}

impl TransferConfigBuilder {
    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the maximum block size.
    #[must_use]
    pub fn max_block_size(mut self, bytes: usize) -> Self {
        self.config.max_block_size = bytes;
        self
    }

    /// Set the device per-read timeout in milliseconds.
    #[must_use]
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the per-write timeout in milliseconds.
    #[must_use]
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the host acknowledgment timeout in milliseconds.
    #[must_use]
    pub fn response_timeout_ms(mut self, ms: u64) -> Self {
        self.config.response_timeout_ms = ms;
        self
    }

    /// Set the host connect timeout in milliseconds.
    #[must_use]
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the idle fallback window; `None` disables it.
    #[must_use]
    pub fn idle_fallback_ms(mut self, ms: Option<u64>) -> Self {
        self.config.idle_fallback_ms = ms;
        self
    }

    /// Set the pause before reset in milliseconds.
    #[must_use]
    pub fn ack_flush_delay_ms(mut self, ms: u64) -> Self {
        self.config.ack_flush_delay_ms = ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<TransferConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
