//! # cardwire core library
//!
//! Host-side driver for a cellular/IoT card that speaks newline-delimited
//! JSON over a serial port or an I2C bus.
//!
//! This library provides:
//! - A JSON value model with an encoder and decoder matched to the card
//! - Serial and I2C transports, including the I2C chunk protocol
//! - A transaction engine that serializes access to the wire and recovers
//!   from interrupted exchanges
//!
//! ## Example
//!
//! ```rust,ignore
//! use cardwire_core::prelude::*;
//!
//! let port = open_port("/dev/ttyACM0", None)?;
//! let card = Context::open_serial(port, CardConfig::default())?;
//!
//! let reply = card.request_response(&new_request("card.version"))?;
//! println!("{:?}", reply.get("version"));
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod json;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::json::{new_body, new_command, new_request, Object, Value};
    pub use crate::protocol::{
        open_port, CardConfig, CardError, Context, ErrorKind, HalI2c, Transport, WireLock,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
