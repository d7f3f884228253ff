//! Chat transport port.
//!
//! The concrete transport (Telegram or otherwise) lives outside the core
//! and feeds inbound events into [`crate::ChatPipeline::handle_event`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use maestro_core::types::ChatId;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("markdown rejected")]
    MarkdownRejected,

    #[error("file download failed: {0}")]
    Download(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Outbound surface plus file download, implemented by the host transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message; returns the transport-assigned message id.
    async fn send_message(
        &self,
        chat: &ChatId,
        text: &str,
        mode: ParseMode,
    ) -> Result<i64, TransportError>;

    async fn edit_message(
        &self,
        chat: &ChatId,
        message_id: i64,
        text: &str,
    ) -> Result<(), TransportError>;

    async fn send_photo(
        &self,
        chat: &ChatId,
        path: &str,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn send_chat_action(&self, chat: &ChatId, action: ChatAction)
        -> Result<(), TransportError>;

    async fn send_reaction(
        &self,
        chat: &ChatId,
        message_id: i64,
        emoji: &str,
        big: bool,
    ) -> Result<(), TransportError>;

    async fn download_file(&self, file_id: &str) -> Result<PathBuf, TransportError>;
}

/// Inbound events delivered by the transport adapter.
#[derive(Debug, Clone)]
pub enum IncomingEvent {
    Message(IncomingMessage),
    CallbackQuery {
        chat: ChatId,
        message_id: i64,
        data: String,
    },
    Reaction {
        chat: ChatId,
        message_id: i64,
        emoji: String,
    },
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub user_id: String,
    pub username: Option<String>,
    pub message_id: i64,
    pub text: String,
    /// File id of an attached document, when present.
    pub document: Option<String>,
}

/// Send with Markdown, retry once as plain text; a second failure is
/// logged only. Returns the message id when either attempt lands.
pub async fn send_with_fallback(
    transport: &dyn Transport,
    chat: &ChatId,
    text: &str,
) -> Option<i64> {
    match transport.send_message(chat, text, ParseMode::Markdown).await {
        Ok(id) => Some(id),
        Err(_) => match transport.send_message(chat, text, ParseMode::Plain).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(chat = %chat, error = %e, "message dropped after plain-text retry");
                None
            }
        },
    }
}

/// Adapter giving the orchestrator its chat-addressed delivery surface.
pub struct TransportOutbound {
    transport: Arc<dyn Transport>,
}

impl TransportOutbound {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl maestro_agent::ports::Outbound for TransportOutbound {
    async fn send(&self, chat: &ChatId, text: &str) -> Option<i64> {
        send_with_fallback(self.transport.as_ref(), chat, text).await
    }

    async fn edit(&self, chat: &ChatId, message_id: i64, text: &str) {
        if let Err(e) = self.transport.edit_message(chat, message_id, text).await {
            warn!(chat = %chat, message_id, error = %e, "edit failed");
        }
    }

    async fn send_photo(&self, chat: &ChatId, path: &str, caption: Option<&str>) {
        if let Err(e) = self.transport.send_photo(chat, path, caption).await {
            warn!(chat = %chat, error = %e, "photo send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport that rejects Markdown but accepts plain text.
    #[derive(Default)]
    struct MarkdownHostile {
        plain_sends: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for MarkdownHostile {
        async fn send_message(
            &self,
            _chat: &ChatId,
            text: &str,
            mode: ParseMode,
        ) -> Result<i64, TransportError> {
            match mode {
                ParseMode::Markdown => Err(TransportError::MarkdownRejected),
                ParseMode::Plain => {
                    self.plain_sends.lock().unwrap().push(text.to_string());
                    Ok(7)
                }
            }
        }

        async fn edit_message(
            &self,
            _chat: &ChatId,
            _message_id: i64,
            _text: &str,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_photo(
            &self,
            _chat: &ChatId,
            _path: &str,
            _caption: Option<&str>,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_chat_action(
            &self,
            _chat: &ChatId,
            _action: ChatAction,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_reaction(
            &self,
            _chat: &ChatId,
            _message_id: i64,
            _emoji: &str,
            _big: bool,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn download_file(&self, _file_id: &str) -> Result<PathBuf, TransportError> {
            Err(TransportError::Download("unsupported".into()))
        }
    }

    #[tokio::test]
    async fn markdown_rejection_falls_back_to_plain() {
        let transport = MarkdownHostile::default();
        let id = send_with_fallback(&transport, &ChatId::new("c1"), "hello *world*").await;
        assert_eq!(id, Some(7));
        assert_eq!(transport.plain_sends.lock().unwrap().len(), 1);
    }
}
