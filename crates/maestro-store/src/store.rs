//! Per-chat ordered message log with truncation, stale-prefix
//! summarization, active-skill pointers, and JSON persistence.
//!
//! Persistence is a single document whose top-level keys are chat ids plus
//! a reserved `_skills` sub-object. Writes are best-effort: failures are
//! logged and never surface to callers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use maestro_core::clock::Clock;
use maestro_core::types::ChatId;

use crate::types::{Message, MessageContent, Role};

/// Characters of each summarized older message kept in the digest.
const SUMMARY_SNIPPET_LEN: usize = 200;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedStore {
    #[serde(flatten)]
    chats: HashMap<String, Vec<Message>>,
    #[serde(rename = "_skills", default, skip_serializing_if = "HashMap::is_empty")]
    skills: HashMap<String, String>,
}

pub struct ConversationStore {
    state: Mutex<PersistedStore>,
    path: PathBuf,
    max_history: usize,
    recent_window: usize,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    /// Open the store, loading `conversations.json` from `data_dir` if it
    /// exists. A missing or corrupt file starts empty.
    pub fn open(
        data_dir: impl AsRef<Path>,
        max_history: usize,
        recent_window: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let path = data_dir.as_ref().join("conversations.json");
        let state = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<PersistedStore>(&raw) {
                Ok(mut loaded) => {
                    for history in loaded.chats.values_mut() {
                        normalize(history, max_history);
                    }
                    loaded
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt conversation file, starting empty");
                    PersistedStore::default()
                }
            },
            Err(_) => PersistedStore::default(),
        };

        Self {
            state: Mutex::new(state),
            path,
            max_history,
            recent_window,
            clock,
        }
    }

    /// Append a message, trim to `max_history`, and re-establish the
    /// leading-user invariant. Persists best-effort.
    pub fn add_message(&self, chat: &ChatId, role: Role, content: impl Into<MessageContent>) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let history = state.chats.entry(chat.to_string()).or_default();
            history.push(Message {
                role,
                content: content.into(),
                timestamp_ms: self.clock.now_ms(),
            });
            normalize(history, self.max_history);
            self.serialize_locked(&state)
        };
        self.write(snapshot);
    }

    pub fn history(&self, chat: &ChatId) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        state.chats.get(chat.as_str()).cloned().unwrap_or_default()
    }

    pub fn len(&self, chat: &ChatId) -> usize {
        let state = self.state.lock().unwrap();
        state.chats.get(chat.as_str()).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, chat: &ChatId) -> bool {
        self.len(chat) == 0
    }

    /// Delete a chat's history and its active skill.
    pub fn clear(&self, chat: &ChatId) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.chats.remove(chat.as_str());
            state.skills.remove(chat.as_str());
            self.serialize_locked(&state)
        };
        self.write(snapshot);
    }

    pub fn set_active_skill(&self, chat: &ChatId, skill: Option<String>) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            match skill {
                Some(id) => {
                    state.skills.insert(chat.to_string(), id);
                }
                None => {
                    state.skills.remove(chat.as_str());
                }
            }
            self.serialize_locked(&state)
        };
        self.write(snapshot);
    }

    pub fn active_skill(&self, chat: &ChatId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.skills.get(chat.as_str()).cloned()
    }

    /// Prompt-ready view of a chat's history.
    ///
    /// Short histories come back as copies with a relative-time marker
    /// prepended to each text message. Longer ones compress the stale
    /// prefix into one synthetic user message followed by the annotated
    /// recent window. The result always begins with a user-role message.
    pub fn summarized_history(&self, chat: &ChatId) -> Vec<Message> {
        let history = self.history(chat);
        let now_ms = self.clock.now_ms();

        if history.len() <= self.recent_window {
            return history
                .iter()
                .map(|m| annotate(m, now_ms))
                .collect();
        }

        let split = history.len() - self.recent_window;
        let (older, recent) = history.split_at(split);

        let mut digest = format!("[CONVERSATION SUMMARY - {} earlier messages]", older.len());
        for m in older {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let rendered = m.content.render();
            let snippet: String = rendered.chars().take(SUMMARY_SNIPPET_LEN).collect();
            digest.push_str(&format!(
                "\n[{role}][{}]: {snippet}",
                relative_marker(now_ms, m.timestamp_ms)
            ));
        }

        let mut out = Vec::with_capacity(1 + recent.len());
        out.push(Message {
            role: Role::User,
            content: MessageContent::Text(digest),
            timestamp_ms: now_ms,
        });
        out.extend(recent.iter().map(|m| annotate(m, now_ms)));
        out
    }

    /// Chat ids with at least one stored message.
    pub fn chats(&self) -> Vec<ChatId> {
        let state = self.state.lock().unwrap();
        state.chats.keys().map(|k| ChatId::new(k.clone())).collect()
    }

    fn serialize_locked(&self, state: &PersistedStore) -> Option<String> {
        match serde_json::to_string_pretty(state) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize conversations");
                None
            }
        }
    }

    fn write(&self, snapshot: Option<String>) {
        let Some(json) = snapshot else { return };
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "failed to persist conversations");
        } else {
            debug!(path = %self.path.display(), "conversations persisted");
        }
    }
}

/// Trim to `max_history` FIFO and drop leading non-user messages.
fn normalize(history: &mut Vec<Message>, max_history: usize) {
    if history.len() > max_history {
        let excess = history.len() - max_history;
        history.drain(..excess);
    }
    while history.first().is_some_and(|m| m.role != Role::User) {
        history.remove(0);
    }
}

/// Copy of `m` with a relative-time marker prepended to text content.
/// Tool-result envelopes pass through untouched.
fn annotate(m: &Message, now_ms: i64) -> Message {
    match &m.content {
        MessageContent::Text(s) => Message {
            role: m.role,
            content: MessageContent::Text(format!(
                "[{}] {s}",
                relative_marker(now_ms, m.timestamp_ms)
            )),
            timestamp_ms: m.timestamp_ms,
        },
        MessageContent::Envelope(_) => m.clone(),
    }
}

fn relative_marker(now_ms: i64, ts_ms: i64) -> String {
    let delta_s = (now_ms - ts_ms).max(0) / 1000;
    if delta_s < 60 {
        "just now".to_string()
    } else if delta_s < 3600 {
        format!("{}m ago", delta_s / 60)
    } else if delta_s < 86_400 {
        format!("{}h ago", delta_s / 3600)
    } else {
        format!("{}d ago", delta_s / 86_400)
    }
}
