//! User agent
//!
//! Identification attached to `hub.set` so the service behind the card can
//! tell which host library and interface produced the request.

use crate::json::{Object, Value};

/// Agent name reported to the card
pub const AGENT_NAME: &str = "cardwire";

/// Build the user agent object for a transport interface name
pub fn user_agent(interface: &str) -> Object {
    let mut ua = Object::new();
    ua.insert("agent".to_string(), Value::from(AGENT_NAME));
    ua.insert(
        "agent_version".to_string(),
        Value::from(env!("CARGO_PKG_VERSION")),
    );
    ua.insert(
        "compiler".to_string(),
        Value::from(format!(
            "rust/{}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        )),
    );
    ua.insert("req_interface".to_string(), Value::from(interface));
    ua
}
