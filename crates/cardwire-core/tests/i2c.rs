//! Transaction engine over a simulated I2C card

mod common;

use cardwire_core::json::{new_request, Value};
use cardwire_core::protocol::{CardConfig, Context, ErrorKind, Tunables, WireLock, ERR_TIMEOUT};
use common::{fast_config, init_tracing, Card};
use pretty_assertions::assert_eq;

fn open(card: &Card, config: CardConfig) -> Context {
    init_tracing();
    Context::open_i2c(None, card.i2c(), config)
        .unwrap()
        .with_wire_lock(WireLock::new())
}

#[test]
fn test_long_reply_read_in_chunks() {
    let card = Card::new();
    let payload = "x".repeat(600);
    card.reply(&format!("{{\"payload\":\"{payload}\"}}\r\n"));
    let ctx = open(&card, fast_config());

    let reply = ctx.transaction(&new_request("note.get")).unwrap();
    assert_eq!(
        reply.get("payload").and_then(Value::as_str),
        Some(payload.as_str())
    );
    assert!(card.state().reads >= 4);
    assert_eq!(ctx.identify(), "i2c");
    assert_eq!(ctx.i2c_address(), Some(0x17));
}

#[test]
fn test_long_request_written_in_chunks() {
    let card = Card::new();
    card.reply("{}\n");
    let ctx = open(
        &card,
        CardConfig {
            tunables: Tunables {
                i2c_chunk_max: 32,
                ..fast_config().tunables
            },
            ..fast_config()
        },
    );

    let mut req = new_request("note.add");
    req.insert("note".into(), "y".repeat(100).into());
    ctx.request(&req).unwrap();

    let requests = card.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains(&"y".repeat(100)));
    assert!(card.written().ends_with(b"}\n"));
}

#[test]
fn test_silent_card_times_out() {
    let card = Card::new();
    let ctx = open(&card, fast_config());

    let err = ctx.transaction(&new_request("card.version")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_io());
    assert!(err.contains(ERR_TIMEOUT));
    assert_eq!(
        err.to_string(),
        "card.version: transaction timeout (received 0 bytes in 0 secs) {io}{timeout}"
    );
    assert!(ctx.reset_required());
}

#[test]
fn test_reset_drains_queued_output() {
    let card = Card::new();
    card.emit(&"z".repeat(400));
    let ctx = open(&card, fast_config());

    ctx.reset().unwrap();
    assert!(card.state().output.is_empty());
}

#[test]
fn test_stale_output_drained_after_failure() {
    let card = Card::new();
    card.state().fail_writes = 1;
    let ctx = open(&card, fast_config());

    let err = ctx.transaction(&new_request("card.time")).unwrap_err();
    assert!(err.is_io());
    assert!(ctx.reset_required());

    card.emit("{\"stale\":true}\n");
    card.reply("{\"time\":1700000000}\n");
    let reply = ctx.transaction(&new_request("card.time")).unwrap();
    assert_eq!(reply.get("time").and_then(Value::as_f64), Some(1_700_000_000.0));
}

#[test]
fn test_custom_address() {
    let card = Card::new();
    let ctx = Context::open_i2c(Some(0x42), card.i2c(), fast_config()).unwrap();
    assert_eq!(ctx.i2c_address(), Some(0x42));
}
