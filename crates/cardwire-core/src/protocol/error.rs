//! Card errors
//!
//! Errors carry a typed [`ErrorKind`] and also render the bracketed markers
//! (`{io}`, `{timeout}`) that callers match against in error strings.

use std::time::Duration;
use thiserror::Error;

/// Marker embedded in messages of I/O-classified errors
pub const ERR_IO: &str = "{io}";

/// Marker embedded in messages of timeout-classified errors
pub const ERR_TIMEOUT: &str = "{timeout}";

/// Errors that can occur while talking to the card
#[derive(Error, Debug)]
pub enum CardError {
    /// Malformed JSON or a root that is not an object
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// A value with no JSON representation
    #[error("JSON encode error: {0}")]
    Encode(String),

    /// A failed bus or port primitive
    #[error("{0} {{io}}")]
    Io(String),

    /// The I2C reply window closed
    #[error("transaction timeout (received {received} bytes in {secs} secs) {{io}}{{timeout}}")]
    Timeout {
        /// Bytes received before the window closed
        received: usize,
        /// Length of the reply window
        secs: u64,
    },

    /// The card answered with a non-empty `err` field
    #[error("{0}")]
    Device(String),

    /// Tunables the card cannot work with
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An async caller stopped waiting
    #[error("no reply within {0:?} {{timeout}}")]
    Deadline(Duration),

    /// Any of the above, decorated with the name of the request that failed
    #[error("{request}: {source}")]
    Request {
        /// Name of the failed request
        request: String,
        /// The underlying error
        source: Box<CardError>,
    },
}

/// Classification of a [`CardError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`CardError::Parse`]
    Parse,
    /// See [`CardError::Encode`]
    Encode,
    /// See [`CardError::Io`]
    Io,
    /// See [`CardError::Timeout`]
    Timeout,
    /// See [`CardError::Device`]
    Device,
    /// See [`CardError::Config`]
    Config,
    /// See [`CardError::Deadline`]
    Deadline,
}

impl CardError {
    pub(crate) fn io(context: &str, detail: impl std::fmt::Display) -> Self {
        CardError::Io(format!("{context}: {detail}"))
    }

    /// The kind of the innermost error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CardError::Parse(_) => ErrorKind::Parse,
            CardError::Encode(_) => ErrorKind::Encode,
            CardError::Io(_) => ErrorKind::Io,
            CardError::Timeout { .. } => ErrorKind::Timeout,
            CardError::Device(_) => ErrorKind::Device,
            CardError::Config(_) => ErrorKind::Config,
            CardError::Deadline(_) => ErrorKind::Deadline,
            CardError::Request { source, .. } => source.kind(),
        }
    }

    /// True for errors whose message carries the `{io}` marker
    pub fn is_io(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::Timeout)
    }

    /// True for the reply window and for caller deadlines
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Deadline)
    }

    /// The request this error was raised for, if known
    pub fn request(&self) -> Option<&str> {
        match self {
            CardError::Request { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Decorate with a request name; an empty name leaves the error bare
    pub(crate) fn for_request(self, request: &str) -> Self {
        if request.is_empty() {
            self
        } else {
            CardError::Request {
                request: request.to_string(),
                source: Box::new(self),
            }
        }
    }

    /// Whether the rendered message contains `marker`
    pub fn contains(&self, marker: &str) -> bool {
        error_contains(&self.to_string(), marker)
    }
}

/// Test an error message for a keyword such as [`ERR_IO`]
pub fn error_contains(message: &str, marker: &str) -> bool {
    message.contains(marker)
}

/// Remove every `{...}` marker from an error message.
///
/// A single space following a marker is dropped with it, and trailing
/// whitespace left behind is trimmed. An unterminated `{` drops the rest of
/// the message.
pub fn error_clean(message: &str) -> String {
    let mut out = message.to_string();
    while let Some((left, rest)) = out.split_once('{') {
        let mut next = left.to_string();
        if let Some((_, tail)) = rest.split_once('}') {
            next.push_str(tail.strip_prefix(' ').unwrap_or(tail));
        }
        out = next;
    }
    out.trim_end().to_string()
}

/// Render a reply consisting of nothing but an `err` field
pub fn error_json(message: &str, err: Option<&CardError>) -> Vec<u8> {
    let text = match (message.is_empty(), err) {
        (true, Some(e)) => e.to_string(),
        (false, Some(e)) => format!("{message}: {e}"),
        (_, None) => message.to_string(),
    };
    serde_json::json!({ "err": text }).to_string().into_bytes()
}
