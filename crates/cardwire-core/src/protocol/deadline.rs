//! Transactions with a deadline
//!
//! The transaction engine is blocking. Async callers run it on the blocking
//! pool and stop waiting once the deadline passes; the transaction itself
//! keeps the wire until the card answers or the transport gives up, so a
//! late reply can never be read as the answer to the next request.

use std::sync::Arc;
use std::time::Duration;

use super::{CardError, Context};
use crate::json::{str_field, Object};

/// Run `request` on `context`, failing with [`CardError::Deadline`] if no
/// result arrives within `deadline`.
pub async fn transaction_with_deadline(
    context: Arc<Context>,
    request: Object,
    deadline: Duration,
) -> Result<Object, CardError> {
    let name = match str_field(&request, "req") {
        "" => str_field(&request, "cmd").to_string(),
        req => req.to_string(),
    };

    let handle = tokio::task::spawn_blocking(move || context.transaction(&request));

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(CardError::io("transaction task failed", e).for_request(&name)),
        Err(_) => {
            tracing::warn!(request = %name, ?deadline, "card transaction deadline passed");
            Err(CardError::Deadline(deadline).for_request(&name))
        }
    }
}
