//! Typing indicator — re-sent every 4 seconds while a task runs, since
//! transports expire the action after roughly 5.

use std::sync::Arc;
use std::time::Duration;

use maestro_core::types::ChatId;

use crate::transport::{ChatAction, Transport};

const REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Handle to a background typing loop. `stop()` aborts it immediately.
pub struct TypingHandle(tokio::task::JoinHandle<()>);

impl TypingHandle {
    pub fn start(transport: Arc<dyn Transport>, chat: ChatId) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                let _ = transport.send_chat_action(&chat, ChatAction::Typing).await;
                tokio::time::sleep(REFRESH_INTERVAL).await;
            }
        });
        TypingHandle(handle)
    }

    pub fn stop(self) {
        self.0.abort();
    }
}

impl Drop for TypingHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
