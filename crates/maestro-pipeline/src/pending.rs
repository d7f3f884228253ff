//! Pending-input state machines, keyed by chat and strictly owned by the
//! pipeline. The next inbound text for a chat with a pending machine is
//! consumed by that machine (the literal `cancel` aborts any of them).

use std::collections::HashMap;
use std::sync::Mutex;

use maestro_core::types::ChatId;

/// Questions asked, in order, by the custom character flow.
pub const CHARACTER_QUESTIONS: &[&str] = &[
    "What is the character's name?",
    "Describe their personality in a few sentences.",
    "What do they care about most?",
    "How do they speak? Give an example line.",
    "Anything they refuse to do?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaudeAuthKind {
    ApiKey,
    OauthToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillStep {
    Name,
    Prompt { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInput {
    /// Next text is the API key for the chosen worker model.
    BrainKey { provider: String, model: String },
    /// Next text is the API key for the chosen orchestrator model.
    OrchestratorKey { provider: String, model: String },
    /// Next text is the credential for a Claude-style provider.
    ClaudeAuth { kind: ClaudeAuthKind },
    /// Two-step: skill name, then its prompt (file upload accepted).
    CustomSkill { step: SkillStep },
    /// Sequential Q/A until the fixed question list is exhausted.
    CustomCharacter { answers: Vec<String> },
}

#[derive(Default)]
pub struct PendingInputs {
    map: Mutex<HashMap<String, PendingInput>>,
}

impl PendingInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a machine for a chat, replacing any existing one.
    pub fn begin(&self, chat: &ChatId, input: PendingInput) {
        self.map.lock().unwrap().insert(chat.to_string(), input);
    }

    /// Remove and return the chat's machine; the caller re-installs it for
    /// multi-step flows.
    pub fn take(&self, chat: &ChatId) -> Option<PendingInput> {
        self.map.lock().unwrap().remove(chat.as_str())
    }

    pub fn is_pending(&self, chat: &ChatId) -> bool {
        self.map.lock().unwrap().contains_key(chat.as_str())
    }

    pub fn clear(&self, chat: &ChatId) {
        self.map.lock().unwrap().remove(chat.as_str());
    }
}
