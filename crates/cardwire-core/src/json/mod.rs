//! JSON Codec
//!
//! A deliberately small JSON value model and the encoder/decoder pair used to
//! exchange requests and replies with the card.

mod decode;
mod encode;
mod value;

pub use decode::decode_object;
pub use encode::{encode_object, encode_object_string};
pub(crate) use value::str_field;
pub use value::{new_body, new_command, new_request, Object, Value};
