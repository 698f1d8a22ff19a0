//! Context configuration
//!
//! Pacing and timeout tunables are fixed for the lifetime of a [`Context`](super::Context);
//! they are handed over when the context is opened.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{
    CardError, CARD_I2C_MAX, DEFAULT_RESTART_QUIESCENCE_MS, DEFAULT_SEGMENT_DELAY_MS,
    DEFAULT_SEGMENT_MAX_LEN,
};

/// Transport pacing and timeout parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Bytes transmitted before pausing for the card to drain its buffer
    pub segment_max_len: usize,
    /// Pause between segments in milliseconds
    pub segment_delay_ms: u64,
    /// Largest payload of a single I2C transfer (1-253)
    pub i2c_chunk_max: usize,
    /// Minimum spacing of I2C bus operations in milliseconds
    pub i2c_min_interval_ms: u64,
    /// Attempts for a failed I2C read before giving up
    pub i2c_read_retries: u32,
    /// Pause between I2C read attempts in milliseconds
    pub i2c_retry_backoff_ms: u64,
    /// Reply window before any byte has been received, in milliseconds
    pub i2c_initial_timeout_ms: u64,
    /// Reply window re-armed after each non-empty read, in milliseconds
    pub i2c_active_timeout_ms: u64,
    /// Wait between newline probes while resynchronizing serial, in milliseconds
    pub serial_settle_ms: u64,
    /// How long serial read errors are tolerated while waiting for a reply
    pub read_error_tolerance_ms: u64,
    /// Pause after a tolerated serial read error
    pub read_error_backoff_ms: u64,
    /// Newline probes sent while resynchronizing serial before giving up
    pub serial_reset_probes: u32,
    /// Lock hold after `card.restore` / `card.restart`
    pub restart_quiescence_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            segment_max_len: DEFAULT_SEGMENT_MAX_LEN,
            segment_delay_ms: DEFAULT_SEGMENT_DELAY_MS,
            i2c_chunk_max: CARD_I2C_MAX,
            i2c_min_interval_ms: 1,
            i2c_read_retries: 10,
            i2c_retry_backoff_ms: 2,
            i2c_initial_timeout_ms: 60_000,
            i2c_active_timeout_ms: 90_000,
            serial_settle_ms: 750,
            read_error_tolerance_ms: 2_000,
            read_error_backoff_ms: 1_000,
            serial_reset_probes: 10,
            restart_quiescence_ms: DEFAULT_RESTART_QUIESCENCE_MS,
        }
    }
}

impl Tunables {
    /// Check the values against what the card can physically accept
    pub fn validate(&self) -> Result<(), CardError> {
        if self.segment_max_len == 0 {
            return Err(CardError::Config("segment_max_len must be at least 1".into()));
        }
        if self.serial_reset_probes == 0 {
            return Err(CardError::Config(
                "serial_reset_probes must be at least 1".into(),
            ));
        }
        if !(1..=CARD_I2C_MAX).contains(&self.i2c_chunk_max) {
            return Err(CardError::Config(format!(
                "i2c_chunk_max must be 1-{CARD_I2C_MAX}, got {}",
                self.i2c_chunk_max
            )));
        }
        Ok(())
    }

    /// Pause between request segments
    pub fn segment_delay(&self) -> Duration {
        Duration::from_millis(self.segment_delay_ms)
    }

    /// Minimum spacing of I2C bus operations
    pub fn i2c_min_interval(&self) -> Duration {
        Duration::from_millis(self.i2c_min_interval_ms)
    }

    /// Pause between I2C read attempts
    pub fn i2c_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.i2c_retry_backoff_ms)
    }

    /// Reply window before the first byte arrives
    pub fn i2c_initial_timeout(&self) -> Duration {
        Duration::from_millis(self.i2c_initial_timeout_ms)
    }

    /// Reply window once bytes are flowing
    pub fn i2c_active_timeout(&self) -> Duration {
        Duration::from_millis(self.i2c_active_timeout_ms)
    }

    /// Wait after each serial resynchronization probe
    pub fn serial_settle(&self) -> Duration {
        Duration::from_millis(self.serial_settle_ms)
    }

    /// How long serial read errors are tolerated
    pub fn read_error_tolerance(&self) -> Duration {
        Duration::from_millis(self.read_error_tolerance_ms)
    }

    /// Pause after a tolerated serial read error
    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }

    /// Lock hold after a restart request
    pub fn restart_quiescence(&self) -> Duration {
        Duration::from_millis(self.restart_quiescence_ms)
    }
}

/// Settings applied when a context is opened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Log every request and reply
    pub debug: bool,
    /// Do not attach a user agent to `hub.set`
    pub disable_user_agent: bool,
    /// Pacing and timeouts
    pub tunables: Tunables,
}

impl CardConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, CardError> {
        let config: CardConfig =
            serde_json::from_str(text).map_err(|e| CardError::Config(e.to_string()))?;
        config.tunables.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CardError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CardError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}
