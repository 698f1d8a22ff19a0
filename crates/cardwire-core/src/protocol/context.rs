//! Card context
//!
//! The transaction engine: validates and frames requests, serializes access
//! to the wire, resynchronizes after failures, and turns replies (including
//! device-reported errors) into results.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::i2c::I2cTransport;
use super::serial::SerialTransport;
use super::transport::{I2cBus, SerialIo, Transport};
use super::user_agent::user_agent;
use super::{CardConfig, CardError, Tunables};
use crate::json::{decode_object, encode_object, str_field, Object, Value};

/// Requests after which the card reboots and must be left alone
const RESTART_REQUESTS: [&str; 2] = ["card.restore", "card.restart"];

/// Serializes transactions on one physical wire.
///
/// Clones share the same lock. Every context opened without an explicit lock
/// uses [`WireLock::global`], so at most one transaction is in flight per
/// process unless separate wires are given separate locks.
#[derive(Clone, Default)]
pub struct WireLock(Arc<Mutex<()>>);

impl WireLock {
    /// A lock for a wire not shared with the global default
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock
    pub fn global() -> Self {
        static GLOBAL: OnceLock<WireLock> = OnceLock::new();
        GLOBAL.get_or_init(WireLock::new).clone()
    }

    /// Whether both handles guard the same wire
    pub fn same_wire(&self, other: &WireLock) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        // The guarded unit carries no state a panic could corrupt
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WireLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WireLock")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

/// Transport plus the state that must change together with it
struct Session {
    transport: Box<dyn Transport>,
    reset_required: bool,
}

impl Session {
    fn reset(&mut self) -> Result<(), CardError> {
        self.reset_required = false;
        self.transport.reset()
    }

    fn transact(&mut self, request: &[u8], no_response: bool) -> Result<Vec<u8>, CardError> {
        if self.reset_required {
            if let Err(e) = self.reset() {
                tracing::warn!(error = %e, "reset before transaction failed");
            }
        }

        let result = self.transport.transact(request, no_response);
        if result.is_err() {
            self.reset_required = true;
        }
        result
    }
}

/// An open session with the card
pub struct Context {
    session: Mutex<Session>,
    wire: WireLock,
    interface: &'static str,
    i2c_address: Option<u16>,
    debug: AtomicBool,
    disable_user_agent: AtomicBool,
    tunables: Tunables,
}

impl Context {
    /// Open the card on a serial link
    pub fn open_serial<S>(io: S, config: CardConfig) -> Result<Self, CardError>
    where
        S: SerialIo + 'static,
    {
        config.tunables.validate()?;
        let transport = SerialTransport::new(io, config.tunables.clone());
        Ok(Self::build(Box::new(transport), None, config))
    }

    /// Open the card on an I2C bus; `None` or 0 selects the default address
    pub fn open_i2c<B>(address: Option<u16>, bus: B, config: CardConfig) -> Result<Self, CardError>
    where
        B: I2cBus + 'static,
    {
        config.tunables.validate()?;
        let transport = I2cTransport::new(bus, address, config.tunables.clone());
        let address = transport.address();
        Ok(Self::build(Box::new(transport), Some(address), config))
    }

    /// Open the card over a custom transport
    pub fn open(transport: Box<dyn Transport>, config: CardConfig) -> Result<Self, CardError> {
        config.tunables.validate()?;
        Ok(Self::build(transport, None, config))
    }

    fn build(transport: Box<dyn Transport>, i2c_address: Option<u16>, config: CardConfig) -> Self {
        let interface = transport.name();
        tracing::debug!(interface, ?i2c_address, "card context opened");
        Self {
            session: Mutex::new(Session {
                transport,
                reset_required: false,
            }),
            wire: WireLock::global(),
            interface,
            i2c_address,
            debug: AtomicBool::new(config.debug),
            disable_user_agent: AtomicBool::new(config.disable_user_agent),
            tunables: config.tunables,
        }
    }

    /// Serialize this context's transactions with `wire` instead of the global lock
    pub fn with_wire_lock(mut self, wire: WireLock) -> Self {
        self.wire = wire;
        self
    }

    /// The lock serializing this context's wire
    pub fn wire_lock(&self) -> &WireLock {
        &self.wire
    }

    /// Interface name of the open transport
    pub fn identify(&self) -> &'static str {
        self.interface
    }

    /// Bus address when opened on I2C
    pub fn i2c_address(&self) -> Option<u16> {
        self.i2c_address
    }

    /// Pacing and timeouts fixed at open time
    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Enable or disable request/reply logging, returning the previous setting
    pub fn debug_output(&self, enabled: bool) -> bool {
        self.debug.swap(enabled, Ordering::Relaxed)
    }

    fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Suppress the user agent attached to `hub.set`, returning the previous setting
    pub fn set_user_agent_disabled(&self, disabled: bool) -> bool {
        self.disable_user_agent.swap(disabled, Ordering::Relaxed)
    }

    /// The user agent attached to `hub.set` requests
    pub fn user_agent(&self) -> Object {
        user_agent(self.interface)
    }

    /// Whether the next transaction will resynchronize first
    pub fn reset_required(&self) -> bool {
        self.lock_session().reset_required
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        // Session state stays consistent across a panicking transport call
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resynchronize with the card
    pub fn reset(&self) -> Result<(), CardError> {
        let _wire = self.wire.acquire();
        self.lock_session().reset()
    }

    /// Close the transport
    pub fn close(self) {
        let mut session = self
            .session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        session.transport.close();
        tracing::debug!(interface = self.interface, "card context closed");
    }

    /// Send a request or command, discarding the reply
    pub fn request(&self, request: &Object) -> Result<(), CardError> {
        self.transaction(request).map(drop)
    }

    /// Send a request and return the card's reply
    pub fn request_response(&self, request: &Object) -> Result<Object, CardError> {
        self.transaction(request)
    }

    /// Read a reply without sending anything, for interactions known to
    /// produce an unsolicited follow-up message
    pub fn response(&self) -> Result<Object, CardError> {
        self.exchange(b"").map(|(_, reply)| reply)
    }

    /// Perform a transaction with structured request and reply
    pub fn transaction(&self, request: &Object) -> Result<Object, CardError> {
        let bytes = encode_object(request)?;
        self.exchange(&bytes).map(|(_, reply)| reply)
    }

    /// Perform a transaction on raw JSON.
    ///
    /// Returns the reply bytes as received, or `{}` for commands, which get
    /// no reply.
    pub fn transaction_json(&self, request: &[u8]) -> Result<Vec<u8>, CardError> {
        self.exchange(request).map(|(bytes, _)| bytes)
    }

    fn wants_user_agent(&self, request: &Object) -> bool {
        !self.disable_user_agent.load(Ordering::Relaxed)
            && (str_field(request, "req") == "hub.set" || str_field(request, "cmd") == "hub.set")
            && request.get("body").map_or(true, Value::is_null)
    }

    fn exchange(&self, request: &[u8]) -> Result<(Vec<u8>, Object), CardError> {
        // An empty request only collects a pending reply
        let reply_only = request.iter().all(u8::is_ascii_whitespace);

        let (parsed, mut wire_bytes) = if reply_only {
            (Object::new(), Vec::new())
        } else {
            // Transports do not validate JSON, so reject it here
            let mut parsed = decode_object(request)?;
            let mut bytes = request.to_vec();
            if self.wants_user_agent(&parsed) {
                parsed.insert("body".to_string(), Value::Object(self.user_agent()));
                bytes = encode_object(&parsed)?;
            }
            (parsed, bytes)
        };

        let req_name = str_field(&parsed, "req").to_string();
        let cmd_name = str_field(&parsed, "cmd");
        let no_response = req_name.is_empty() && !cmd_name.is_empty();

        if !reply_only {
            normalize_terminator(&mut wire_bytes);
        }

        if self.debug() {
            tracing::info!(
                interface = self.interface,
                request = %String::from_utf8_lossy(&wire_bytes).trim_end(),
                "card request"
            );
        }

        let result = {
            let _wire = self.wire.acquire();
            let mut session = self.lock_session();
            let result = session.transact(&wire_bytes, no_response);

            if RESTART_REQUESTS.contains(&req_name.as_str()) {
                tracing::debug!(request = %req_name, "holding wire while card restarts");
                std::thread::sleep(self.tunables.restart_quiescence());
            }
            result
        };

        if let Err(e) = &result {
            if self.debug() {
                tracing::warn!(error = %e, "card transaction failed");
            }
        }

        if no_response {
            result.map_err(|e| e.for_request(cmd_name))?;
            return Ok((b"{}".to_vec(), Object::new()));
        }

        let reply_bytes = result.map_err(|e| e.for_request(&req_name))?;

        if self.debug() {
            tracing::info!(
                interface = self.interface,
                reply = %String::from_utf8_lossy(&reply_bytes).trim_end(),
                "card reply"
            );
        }

        let reply = decode_object(&reply_bytes).map_err(|e| e.for_request(&req_name))?;
        let device_err = str_field(&reply, "err");
        if !device_err.is_empty() {
            return Err(CardError::Device(device_err.to_string()).for_request(&req_name));
        }

        Ok((reply_bytes, reply))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("interface", &self.interface)
            .field("i2c_address", &self.i2c_address)
            .field("debug", &self.debug())
            .field("wire", &self.wire)
            .finish_non_exhaustive()
    }
}

/// Strip any trailing CR/LF run and terminate with exactly one newline
fn normalize_terminator(bytes: &mut Vec<u8>) {
    while matches!(bytes.last(), Some(b'\r' | b'\n')) {
        bytes.pop();
    }
    bytes.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::new_request;

    /// Transport that records what it was asked to do
    #[derive(Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        resets: Arc<Mutex<u32>>,
        fail_next: bool,
        reply: Vec<u8>,
    }

    impl Transport for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn reset(&mut self) -> Result<(), CardError> {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        }

        fn transact(&mut self, request: &[u8], no_response: bool) -> Result<Vec<u8>, CardError> {
            self.sent.lock().unwrap().push(request.to_vec());
            if std::mem::take(&mut self.fail_next) {
                return Err(CardError::io("error reading from module", "gone"));
            }
            if no_response {
                return Ok(Vec::new());
            }
            Ok(self.reply.clone())
        }
    }

    fn fast_config() -> CardConfig {
        CardConfig {
            tunables: Tunables {
                restart_quiescence_ms: 0,
                ..Tunables::default()
            },
            ..CardConfig::default()
        }
    }

    #[test]
    fn test_normalize_terminator() {
        let mut b = b"{}\r\n\r\n".to_vec();
        normalize_terminator(&mut b);
        assert_eq!(b, b"{}\n");

        let mut b = b"{}".to_vec();
        normalize_terminator(&mut b);
        assert_eq!(b, b"{}\n");
    }

    #[test]
    fn test_failure_schedules_reset() {
        let resets = Arc::new(Mutex::new(0));
        let transport = Recorder {
            resets: resets.clone(),
            fail_next: true,
            reply: b"{}\n".to_vec(),
            ..Recorder::default()
        };
        let ctx = Context::open(Box::new(transport), fast_config())
            .unwrap()
            .with_wire_lock(WireLock::new());

        let err = ctx.transaction(&new_request("card.version")).unwrap_err();
        assert!(err.is_io());
        assert_eq!(err.request(), Some("card.version"));
        assert!(ctx.reset_required());
        assert_eq!(*resets.lock().unwrap(), 0);

        ctx.transaction(&new_request("card.version")).unwrap();
        assert!(!ctx.reset_required());
        assert_eq!(*resets.lock().unwrap(), 1);
    }

    #[test]
    fn test_device_error_does_not_schedule_reset() {
        let transport = Recorder {
            reply: b"{\"err\":\"nope {not-found}\"}\r\n".to_vec(),
            ..Recorder::default()
        };
        let ctx = Context::open(Box::new(transport), fast_config())
            .unwrap()
            .with_wire_lock(WireLock::new());
        let err = ctx.transaction(&new_request("note.get")).unwrap_err();
        assert_eq!(err.to_string(), "note.get: nope {not-found}");
        assert!(err.contains("{not-found}"));
        assert!(!ctx.reset_required());
    }

    #[test]
    fn test_flags_return_previous() {
        let ctx = Context::open(Box::new(Recorder::default()), fast_config()).unwrap();
        assert!(!ctx.debug_output(true));
        assert!(ctx.debug_output(false));
        assert!(!ctx.set_user_agent_disabled(true));
        assert!(ctx.set_user_agent_disabled(false));
        assert_eq!(ctx.identify(), "recorder");
        assert_eq!(ctx.i2c_address(), None);
    }

    #[test]
    fn test_global_wire_lock_shared() {
        assert!(WireLock::global().same_wire(&WireLock::global()));
        assert!(!WireLock::new().same_wire(&WireLock::global()));
        let ctx = Context::open(Box::new(Recorder::default()), fast_config()).unwrap();
        assert!(ctx.wire_lock().same_wire(&WireLock::global()));
    }

    #[test]
    fn test_invalid_tunables_rejected() {
        let config = CardConfig {
            tunables: Tunables {
                i2c_chunk_max: 300,
                ..Tunables::default()
            },
            ..CardConfig::default()
        };
        let err = Context::open(Box::new(Recorder::default()), config).unwrap_err();
        assert!(matches!(err, CardError::Config(_)));
    }
}
