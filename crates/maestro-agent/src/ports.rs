//! Ports to the collaborators the core consumes but never implements:
//! outbound delivery, memory/journal/persona stores, automations, and the
//! synthetic-prompt runner shared by automations and the life engine.
//!
//! Each port is deliberately narrow — the core neither creates nor
//! inspects the collaborator's files.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use maestro_core::types::ChatId;
use maestro_store::ConversationStore;

use crate::error::AgentError;

/// Chat-addressed delivery surface the orchestrator writes through: live
/// status cards, job completion chunks, photos.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a new message; returns its transport id when available.
    async fn send(&self, chat: &ChatId, text: &str) -> Option<i64>;

    /// Edit a previously sent message in place.
    async fn edit(&self, chat: &ChatId, message_id: i64, text: &str);

    async fn send_photo(&self, chat: &ChatId, path: &str, caption: Option<&str>);
}

/// Runs a synthetic prompt through the full per-chat pipeline, so
/// automation and life-engine traffic serializes with live messages.
#[async_trait]
pub trait SyntheticRunner: Send + Sync {
    async fn run(&self, chat: &ChatId, prompt: &str) -> Result<String, AgentError>;
}

/// Automation CRUD as seen from the orchestrator's tool surface. Inputs
/// and outputs are tool-layer JSON; validation lives with the manager.
#[async_trait]
pub trait AutomationOps: Send + Sync {
    async fn create_automation(&self, chat: &ChatId, input: Value) -> Result<Value, String>;
    async fn list_automations(&self, chat: &ChatId) -> Value;
    async fn update_automation(&self, chat: &ChatId, input: Value) -> Result<Value, String>;
    async fn delete_automation(&self, chat: &ChatId, id: &str) -> Result<Value, String>;
    /// Fire an automation immediately, bypassing its schedule.
    async fn run_automation(&self, chat: &ChatId, id: &str) -> Result<Value, String>;
}

#[async_trait]
pub trait MemoryManager: Send + Sync {
    async fn add(&self, chat: &ChatId, text: &str);
    async fn list_recent(&self, chat: &ChatId, limit: usize) -> Vec<String>;
    async fn search(&self, chat: &ChatId, query: &str, limit: usize) -> Vec<String>;
}

#[async_trait]
pub trait JournalManager: Send + Sync {
    async fn append(&self, entry: &str);
    async fn for_date(&self, date: &str) -> Option<String>;
    async fn list_dates(&self) -> Vec<String>;
}

/// Outbound share queue for content produced by the life engine.
#[async_trait]
pub trait ShareQueue: Send + Sync {
    async fn enqueue(&self, text: &str);
}

#[async_trait]
pub trait EvolutionTracker: Send + Sync {
    async fn record(&self, note: &str);
    async fn history(&self, limit: usize) -> Vec<String>;
    async fn lessons(&self) -> Vec<String>;
}

#[async_trait]
pub trait PersonaManager: Send + Sync {
    async fn current(&self) -> String;
    async fn update(&self, text: &str);
}

/// Generates a character profile from collected Q/A answers and yields the
/// root context for it.
#[async_trait]
pub trait CharacterManager: Send + Sync {
    async fn list(&self) -> Vec<String>;
    async fn generate(&self, answers: &[String]) -> Result<String, String>;
    async fn activate(&self, name: &str) -> Result<Arc<CharacterContext>, String>;
}

/// Swappable prompt fragments selected per chat.
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    async fn list(&self) -> Vec<(String, String)>;
    async fn prompt(&self, id: &str) -> Option<String>;
    async fn save_custom(&self, name: &str, prompt: &str) -> Result<(), String>;
}

/// Builds a model provider from a captured credential, so the key-entry
/// flows can hot-swap providers without the core speaking HTTP.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(
        &self,
        kind: &str,
        model: &str,
        credential: &str,
    ) -> Result<Arc<dyn crate::provider::ModelProvider>, String>;
}

/// Runtime control over the life engine, surfaced through the command set.
#[async_trait]
pub trait LifeControl: Send + Sync {
    async fn pause(&self);
    async fn resume(&self);
    /// Bypass timer and cooldowns; `kind` picks the activity when given.
    async fn trigger_now(&self, kind: Option<&str>) -> Result<String, String>;
    /// Human-readable engine state for `/life review`.
    async fn review(&self) -> String;
}

/// Everything that makes up an active identity. Swapped atomically —
/// individual managers are never mutated from outside.
pub struct CharacterContext {
    pub store: Arc<ConversationStore>,
    pub memory: Arc<dyn MemoryManager>,
    pub journal: Arc<dyn JournalManager>,
    pub shares: Arc<dyn ShareQueue>,
    pub evolution: Arc<dyn EvolutionTracker>,
    pub persona: Arc<dyn PersonaManager>,
}
