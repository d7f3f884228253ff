//! Sliding-window message batching.
//!
//! Rapid messages in one chat are coalesced: each arrival resets the
//! window timer. When it fires, the first in-batch sender resolves with
//! the merged text and later senders resolve with `Skip`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use maestro_core::types::ChatId;

#[derive(Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// This sender owns the batch; process the merged text.
    Merged(String),
    /// Another sender owns the batch.
    Skip,
}

struct PendingBatch {
    texts: Vec<String>,
    waiters: Vec<oneshot::Sender<BatchOutcome>>,
    timer: CancellationToken,
}

#[derive(Clone)]
pub struct MessageBatcher {
    window: Duration,
    pending: Arc<Mutex<HashMap<String, PendingBatch>>>,
}

impl MessageBatcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a message to the chat's batch and wait for the window to close.
    pub async fn submit(&self, chat: &ChatId, text: &str) -> BatchOutcome {
        let (tx, rx) = oneshot::channel();
        let timer = CancellationToken::new();

        {
            let mut pending = self.pending.lock().unwrap();
            match pending.get_mut(chat.as_str()) {
                Some(batch) => {
                    batch.texts.push(text.to_string());
                    batch.waiters.push(tx);
                    // Each arrival resets the window: cancel the running
                    // timer and install ours.
                    let previous = std::mem::replace(&mut batch.timer, timer.clone());
                    previous.cancel();
                }
                None => {
                    pending.insert(
                        chat.to_string(),
                        PendingBatch {
                            texts: vec![text.to_string()],
                            waiters: vec![tx],
                            timer: timer.clone(),
                        },
                    );
                }
            }
        }

        let window = self.window;
        let pending = Arc::clone(&self.pending);
        let key = chat.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    flush(&pending, &key);
                }
            }
        });

        rx.await.unwrap_or(BatchOutcome::Skip)
    }
}

fn flush(pending: &Mutex<HashMap<String, PendingBatch>>, key: &str) {
    let Some(batch) = pending.lock().unwrap().remove(key) else {
        return;
    };
    debug!(chat = %key, count = batch.texts.len(), "batch window closed");

    let merged = merge(&batch.texts);
    let mut waiters = batch.waiters.into_iter();
    if let Some(first) = waiters.next() {
        let _ = first.send(BatchOutcome::Merged(merged));
    }
    for waiter in waiters {
        let _ = waiter.send(BatchOutcome::Skip);
    }
}

/// Verbatim for a single message; numbered and blank-line separated for
/// several.
fn merge(texts: &[String]) -> String {
    if texts.len() == 1 {
        return texts[0].clone();
    }
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}]: {t}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}
