//! Request/reply plumbing between web handlers and actors.
//!
//! Actor messages must be `Clone`, so the oneshot sender is wrapped in an
//! `Arc<Mutex<Option<_>>>` and taken exactly once by the handler that
//! answers.

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Cloneable response channel carried inside actor messages.
pub type ResponseChannel<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

/// Create a request-reply pair.
#[must_use]
pub fn create_request_reply<T>() -> (ResponseChannel<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

/// Send a response through a response channel.
///
/// # Errors
///
/// Returns the value if the receiver was dropped or the channel was
/// already used.
pub async fn send_response<T>(response_tx: ResponseChannel<T>, value: T) -> Result<(), T> {
    let tx = response_tx.lock().await.take();
    if let Some(tx) = tx {
        tx.send(value)
    } else {
        Err(value)
    }
}
