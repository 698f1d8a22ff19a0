//! Card Protocol
//!
//! Newline-delimited JSON transactions with the card over serial or I2C.
//!
//! A [`Context`] owns one transport and runs the transaction engine on top
//! of it; transports only move framed bytes.

mod config;
mod context;
pub mod deadline;
mod error;
pub mod i2c;
pub mod serial;
pub mod transport;
mod user_agent;

pub use config::{CardConfig, Tunables};
pub use context::{Context, WireLock};
pub use deadline::transaction_with_deadline;
pub use error::{
    error_clean, error_contains, error_json, CardError, ErrorKind, ERR_IO, ERR_TIMEOUT,
};
pub use i2c::{decode_chunk, ChunkRead, HalI2c, I2cTransport};
pub use serial::{open_port, SerialTransport};
pub use transport::{i2c_fn, uart_fns, I2cBus, I2cFn, SerialIo, Transport, UartFns};
pub use user_agent::{user_agent, AGENT_NAME};

/// Default baud rate for the card's serial port
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default 7-bit I2C address of the card
pub const DEFAULT_I2C_ADDRESS: u16 = 0x17;

/// Largest payload a single I2C transfer may carry
pub const CARD_I2C_MAX: usize = 253;

/// Bytes sent before pausing so the card's receive buffer can drain
pub const DEFAULT_SEGMENT_MAX_LEN: usize = 250;

/// Pause between request segments in milliseconds
pub const DEFAULT_SEGMENT_DELAY_MS: u64 = 250;

/// How long the wire is held after the card is told to restart, in milliseconds
pub const DEFAULT_RESTART_QUIESCENCE_MS: u64 = 8000;
