//! Strict per-chat FIFO execution.
//!
//! Each chat gets one drainer task that runs queued work sequentially —
//! the next task starts only when the prior one finished, success or not.
//! The map entry is purged when the chain drains so the map stays bounded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use maestro_core::types::ChatId;

type Task = BoxFuture<'static, ()>;

struct QueueHandle {
    tx: mpsc::UnboundedSender<Task>,
    depth: usize,
}

#[derive(Clone, Default)]
pub struct ChatQueues {
    inner: Arc<Mutex<HashMap<String, QueueHandle>>>,
}

impl ChatQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the chat's chain.
    pub fn enqueue<F>(&self, chat: &ChatId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let boxed: Task = Box::pin(task);
        let mut map = self.inner.lock().unwrap();

        if let Some(handle) = map.get_mut(chat.as_str()) {
            handle.depth += 1;
            // The drainer only exits under this lock at depth 0, so the
            // send cannot race its shutdown.
            let _ = handle.tx.send(boxed);
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(boxed);
        map.insert(chat.to_string(), QueueHandle { tx, depth: 1 });

        let inner = Arc::clone(&self.inner);
        let key = chat.to_string();
        tokio::spawn(drain(key, rx, inner));
    }

    /// Enqueue a task and receive its result once the chain reaches it.
    pub fn run<F, T>(&self, chat: &ChatId, task: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(chat, async move {
            let _ = tx.send(task.await);
        });
        rx
    }

    /// Number of chats with live chains (test and introspection hook).
    pub fn active_chains(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

async fn drain(
    key: String,
    mut rx: mpsc::UnboundedReceiver<Task>,
    inner: Arc<Mutex<HashMap<String, QueueHandle>>>,
) {
    while let Some(task) = rx.recv().await {
        task.await;

        let mut map = inner.lock().unwrap();
        let Some(handle) = map.get_mut(&key) else { break };
        handle.depth -= 1;
        if handle.depth == 0 {
            map.remove(&key);
            debug!(chat = %key, "chat queue drained");
            return;
        }
    }
}
