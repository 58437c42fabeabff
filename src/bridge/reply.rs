use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{callback, ReplyCallback};

/// Success/error sink pair that resolves a oneshot with the first reply.
/// Later replies on either sink are ignored.
pub fn reply_channel() -> (
    ReplyCallback,
    ReplyCallback,
    oneshot::Receiver<Result<Value, Value>>,
) {
    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(tx)));

    let success_slot = Arc::clone(&slot);
    let on_success = callback(move |value| resolve(&success_slot, Ok(value)));
    let on_error = callback(move |value| resolve(&slot, Err(value)));

    (on_success, on_error, rx)
}

fn resolve(
    slot: &Mutex<Option<oneshot::Sender<Result<Value, Value>>>>,
    reply: Result<Value, Value>,
) {
    if let Ok(mut slot) = slot.lock() {
        if let Some(tx) = slot.take() {
            let _ = tx.send(reply);
        }
    }
}
