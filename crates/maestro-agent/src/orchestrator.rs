//! The top-level tool loop: decides whether to answer directly or to
//! dispatch work to a specialized worker, and bridges job lifecycle
//! events back into conversations.

use std::sync::{Arc, OnceLock, Weak};

use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use maestro_core::clock::Clock;
use maestro_core::types::ChatId;
use maestro_jobs::{Job, JobEvent, JobManager, JobStatus, StartOutcome, WorkerType};
use maestro_store::Role;

use crate::error::Result;
use crate::ports::{AutomationOps, CharacterContext, Outbound, SkillCatalog};
use crate::provider::{
    ChatRequest, ModelProvider, ProviderError, StopReason, ToolCall, ToolDefinition,
};
use crate::status::JobStatusReporter;
use crate::tools::{call_summary, outcome_to_value, ToolCatalog, ToolError};
use crate::truncate::truncate_result;
use crate::worker::{WorkerProgress, WorkerRuntime};

/// Fallback reply when the model stops for an unhandled reason without text.
const UNEXPECTED_RESPONSE: &str = "Unexpected response from the model.";

pub struct Orchestrator {
    orchestrator_provider: RwLock<Arc<dyn ModelProvider>>,
    worker_provider: RwLock<Arc<dyn ModelProvider>>,
    orchestrator_model: RwLock<String>,
    worker_model: RwLock<String>,
    character: RwLock<Arc<CharacterContext>>,
    jobs: Arc<JobManager>,
    worker_tools: Arc<dyn ToolCatalog>,
    skills: Arc<dyn SkillCatalog>,
    outbound: Arc<dyn Outbound>,
    automations: OnceLock<Arc<dyn AutomationOps>>,
    max_tool_depth: usize,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Build the orchestrator and install the job-event bridge. The bridge
    /// is the only subscriber that turns lifecycle events into chat
    /// messages, so completion chunks are formatted exactly once.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        model: String,
        character: Arc<CharacterContext>,
        jobs: Arc<JobManager>,
        worker_tools: Arc<dyn ToolCatalog>,
        skills: Arc<dyn SkillCatalog>,
        outbound: Arc<dyn Outbound>,
        max_tool_depth: usize,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            orchestrator_provider: RwLock::new(provider.clone()),
            worker_provider: RwLock::new(provider),
            orchestrator_model: RwLock::new(model.clone()),
            worker_model: RwLock::new(model),
            character: RwLock::new(character),
            jobs,
            worker_tools,
            skills,
            outbound,
            automations: OnceLock::new(),
            max_tool_depth,
            clock,
        });
        Self::spawn_event_bridge(&orchestrator);
        orchestrator
    }

    /// Wire in automation CRUD once the manager exists. Called exactly
    /// once during startup wiring.
    pub fn set_automations(&self, ops: Arc<dyn AutomationOps>) {
        let _ = self.automations.set(ops);
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub async fn character(&self) -> Arc<CharacterContext> {
        self.character.read().await.clone()
    }

    /// Atomically replace the active identity's root context.
    pub async fn switch_character(&self, ctx: Arc<CharacterContext>) {
        *self.character.write().await = ctx;
        info!("active character context replaced");
    }

    /// Swap the orchestrator provider, pinging the replacement once.
    pub async fn switch_orchestrator_provider(
        &self,
        provider: Arc<dyn ModelProvider>,
        model: String,
    ) -> std::result::Result<(), ProviderError> {
        provider.ping().await?;
        *self.orchestrator_provider.write().await = provider;
        *self.orchestrator_model.write().await = model;
        Ok(())
    }

    /// Swap the worker ("brain") provider, pinging the replacement once.
    pub async fn switch_worker_provider(
        &self,
        provider: Arc<dyn ModelProvider>,
        model: String,
    ) -> std::result::Result<(), ProviderError> {
        provider.ping().await?;
        *self.worker_provider.write().await = provider;
        *self.worker_model.write().await = model;
        Ok(())
    }

    /// Run one full orchestrator turn for a chat.
    ///
    /// Appends the user message, loops the model against the orchestrator
    /// tool surface up to `max_tool_depth` times, and returns the reply
    /// that was appended to the log.
    pub async fn process_message(&self, chat: &ChatId, text: &str) -> Result<String> {
        let ctx = self.character().await;
        ctx.store.add_message(chat, Role::User, text);

        let system = self.build_system_prompt(&ctx, chat).await;
        let mut messages = history_as_blocks(&ctx, chat);
        let tool_defs = orchestrator_tool_definitions();

        for depth in 0..self.max_tool_depth {
            let provider = self.orchestrator_provider.read().await.clone();
            let req = ChatRequest {
                model: self.orchestrator_model.read().await.clone(),
                system: system.clone(),
                messages: messages.clone(),
                max_tokens: 4096,
                tools: tool_defs.clone(),
            };

            debug!(chat = %chat, depth, "orchestrator model call");
            let resp = provider.chat(&req).await?;

            match resp.stop_reason {
                StopReason::EndTurn => {
                    ctx.store.add_message(chat, Role::Assistant, resp.text.clone());
                    return Ok(resp.text);
                }

                StopReason::ToolUse => {
                    messages.push(json!({ "role": "assistant", "content": resp.raw_content }));

                    let mut results: Vec<Value> = Vec::with_capacity(resp.tool_calls.len());
                    for call in &resp.tool_calls {
                        let summary = call_summary(&call.name, &call.input);
                        let _ = self.outbound.send(chat, &format!("⚡ {summary}")).await;

                        let outcome = self.execute_orchestrator_tool(chat, call).await;
                        let rendered = truncate_result(&outcome_to_value(outcome));
                        results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": call.id,
                            "content": rendered,
                        }));
                    }
                    messages.push(json!({ "role": "user", "content": results }));
                }

                StopReason::Other => {
                    let reply = if resp.text.is_empty() {
                        UNEXPECTED_RESPONSE.to_string()
                    } else {
                        resp.text
                    };
                    ctx.store.add_message(chat, Role::Assistant, reply.clone());
                    return Ok(reply);
                }
            }
        }

        let reply = format!("Reached maximum orchestrator depth ({}).", self.max_tool_depth);
        ctx.store.add_message(chat, Role::Assistant, reply.clone());
        Ok(reply)
    }

    // --- orchestrator tool surface -----------------------------------------

    async fn execute_orchestrator_tool(
        &self,
        chat: &ChatId,
        call: &ToolCall,
    ) -> std::result::Result<Value, ToolError> {
        match call.name.as_str() {
            "dispatch_task" => self.tool_dispatch_task(chat, &call.input).await,
            "list_jobs" => Ok(json!({
                "jobs": self
                    .jobs
                    .list(chat)
                    .iter()
                    .map(|j| json!({
                        "id": j.id,
                        "worker_type": j.worker_type.label(),
                        "status": j.status.to_string(),
                        "task": j.task,
                    }))
                    .collect::<Vec<_>>()
            })),
            "cancel_job" => self.tool_cancel_job(chat, &call.input),
            "create_automation" => {
                self.automation_ops()?
                    .create_automation(chat, call.input.clone())
                    .await
                    .map_err(ToolError::Failed)
            }
            "list_automations" => Ok(self.automation_ops()?.list_automations(chat).await),
            "update_automation" => {
                self.automation_ops()?
                    .update_automation(chat, call.input.clone())
                    .await
                    .map_err(ToolError::Failed)
            }
            "delete_automation" => {
                let id = require_str(&call.input, "id")?;
                self.automation_ops()?
                    .delete_automation(chat, id)
                    .await
                    .map_err(ToolError::Failed)
            }
            "update_user_persona" => {
                let text = require_str(&call.input, "text")?;
                let ctx = self.character().await;
                ctx.persona.update(text).await;
                Ok(json!({ "updated": true }))
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }

    fn automation_ops(&self) -> std::result::Result<&Arc<dyn AutomationOps>, ToolError> {
        self.automations
            .get()
            .ok_or_else(|| ToolError::Failed("automations are not available".into()))
    }

    /// Register a job and start a worker for it without waiting for the
    /// result. Capped jobs stay queued; the event bridge promotes them.
    async fn tool_dispatch_task(
        &self,
        chat: &ChatId,
        input: &Value,
    ) -> std::result::Result<Value, ToolError> {
        let worker_type: WorkerType = require_str(input, "worker_type")?
            .parse()
            .map_err(ToolError::Failed)?;
        let task = require_str(input, "task")?;
        let depends_on = input["depends_on"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let job = self.jobs.create(chat, worker_type, task, depends_on);
        match self.jobs.start(&job.id) {
            StartOutcome::Started(snapshot) => {
                self.spawn_worker(*snapshot).await;
                Ok(json!({ "job_id": job.id, "status": "running" }))
            }
            StartOutcome::AtCapacity => Ok(json!({
                "job_id": job.id,
                "status": "queued",
                "note": "concurrency cap reached; the job starts when a slot frees",
            })),
            StartOutcome::NotStartable => {
                Err(ToolError::Failed(format!("job {} cannot start", job.id)))
            }
        }
    }

    fn tool_cancel_job(
        &self,
        chat: &ChatId,
        input: &Value,
    ) -> std::result::Result<Value, ToolError> {
        match input["job_id"].as_str() {
            Some(id) => match self.jobs.cancel(id) {
                Some(job) => Ok(json!({ "cancelled": [job.id] })),
                None => Ok(json!({ "cancelled": [] })),
            },
            None => {
                let cancelled: Vec<String> = self
                    .jobs
                    .cancel_all_for_chat(chat)
                    .into_iter()
                    .map(|j| j.id)
                    .collect();
                Ok(json!({ "cancelled": cancelled }))
            }
        }
    }

    // --- worker dispatch ----------------------------------------------------

    /// Spawn the worker task for a job that just transitioned to running.
    pub async fn spawn_worker(&self, job: Job) {
        let Some(cancel) = self.jobs.cancel_token(&job.id) else {
            warn!(job_id = %job.id, "no cancel token; job vanished before spawn");
            return;
        };

        let ctx = self.character().await;
        let skill_prompt = match ctx.store.active_skill(&job.chat_id) {
            Some(id) => self.skills.prompt(&id).await,
            None => None,
        };

        // Open the live status card before the worker's first tool call.
        let mut reporter = JobStatusReporter::new(self.outbound.clone(), &job);
        if let Some(message_id) = reporter.open().await {
            self.jobs.set_status_message(&job.id, message_id);
        }

        let runtime = WorkerRuntime {
            provider: self.worker_provider.read().await.clone(),
            tools: self.worker_tools.clone(),
            model: self.worker_model.read().await.clone(),
            max_tool_depth: self.max_tool_depth,
        };
        let jobs = self.jobs.clone();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<WorkerProgress>();

        tokio::spawn(async move {
            let run = runtime.run(&job, skill_prompt, cancel, progress_tx);
            tokio::pin!(run);

            let outcome = loop {
                tokio::select! {
                    maybe = progress_rx.recv() => {
                        if let Some(progress) = maybe {
                            match progress {
                                WorkerProgress::LlmCall => jobs.note_llm_call(&job.id),
                                WorkerProgress::ToolCall(line) => {
                                    jobs.note_tool_call(&job.id);
                                    jobs.record_progress(&job.id, line.clone());
                                    reporter.activity(&line).await;
                                }
                                WorkerProgress::Thinking(text) => {
                                    jobs.set_last_thinking(&job.id, text);
                                }
                            }
                        }
                    }
                    out = &mut run => break out,
                }
            };

            use crate::worker::WorkerOutcome;
            let final_status = match outcome {
                WorkerOutcome::Completed(text) => {
                    jobs.complete(&job.id, text, None);
                    JobStatus::Completed
                }
                WorkerOutcome::Failed(error) => {
                    jobs.fail(&job.id, error);
                    JobStatus::Failed
                }
                WorkerOutcome::TimedOut => {
                    jobs.fail(&job.id, "timeout");
                    JobStatus::Failed
                }
                WorkerOutcome::Cancelled => {
                    // Usually already terminal via JobManager::cancel.
                    jobs.cancel(&job.id);
                    JobStatus::Cancelled
                }
            };
            reporter.finish(final_status).await;
        });
    }

    // --- job event bridge ---------------------------------------------------

    /// Single construction-time subscriber: formats terminal-event chunks,
    /// appends them to the originating chat, delivers them outbound, and
    /// promotes queued jobs into freed slots.
    fn spawn_event_bridge(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        let mut rx = this.jobs.subscribe();

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "job event bridge lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                let Some(orchestrator) = weak.upgrade() else { break };
                if !event.is_terminal() {
                    continue;
                }

                let job = event.job();
                let chunk = format_result_chunk(&event);
                let ctx = orchestrator.character().await;
                ctx.store
                    .add_message(&job.chat_id, Role::Assistant, chunk.clone());
                let _ = orchestrator.outbound.send(&job.chat_id, &chunk).await;

                orchestrator.promote_queued().await;
            }
        });
    }

    /// Start the oldest queued job if a concurrency slot is free.
    async fn promote_queued(&self) {
        while let Some(job) = self.jobs.next_queued() {
            match self.jobs.start(&job.id) {
                StartOutcome::Started(snapshot) => {
                    info!(job_id = %snapshot.id, "queued job promoted");
                    self.spawn_worker(*snapshot).await;
                }
                _ => break,
            }
        }
    }

    // --- prompt building ----------------------------------------------------

    async fn build_system_prompt(&self, ctx: &CharacterContext, chat: &ChatId) -> String {
        let mut prompt = ctx.persona.current().await;
        prompt.push_str(
            "\n\nYou orchestrate a pool of specialized worker agents. Reply \
             directly for conversation; use dispatch_task for work that \
             takes more than a moment. Available workers:\n",
        );
        for wt in WorkerType::ALL {
            prompt.push_str(&format!(
                "- {} {}: {}\n",
                wt.emoji(),
                wt.label(),
                wt.description()
            ));
        }
        prompt.push_str(&format!(
            "\nCurrent time: {}\n",
            self.clock.now_utc().format("%Y-%m-%d %H:%M UTC")
        ));

        if let Some(skill_id) = ctx.store.active_skill(chat) {
            if let Some(skill_prompt) = self.skills.prompt(&skill_id).await {
                prompt.push_str("\n");
                prompt.push_str(&skill_prompt);
            }
        }
        prompt
    }
}

/// Render summarized history as raw message blocks for the model.
fn history_as_blocks(ctx: &CharacterContext, chat: &ChatId) -> Vec<Value> {
    ctx.store
        .summarized_history(chat)
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let content = match &m.content {
                maestro_store::MessageContent::Text(s) => Value::String(s.clone()),
                maestro_store::MessageContent::Envelope(v) => v.clone(),
            };
            json!({ "role": role, "content": content })
        })
        .collect()
}

fn format_result_chunk(event: &JobEvent) -> String {
    let job = event.job();
    let duration = job.duration_s.unwrap_or(0);
    match event {
        JobEvent::Completed(_) => {
            let mut chunk = format!(
                "✅ {} finished ({}, {}s)",
                job.worker_type.label(),
                job.id,
                duration
            );
            if let Some(result) = job.result.as_deref().filter(|r| !r.is_empty()) {
                chunk.push_str("\n\n");
                chunk.push_str(result);
            }
            chunk
        }
        JobEvent::Failed(_) => format!(
            "❌ {} failed ({}): {}",
            job.worker_type.label(),
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        ),
        JobEvent::Cancelled(_) => format!("🚫 Cancelled job {}", job.id),
        JobEvent::Started(_) => String::new(),
    }
}

fn require_str<'a>(input: &'a Value, key: &str) -> std::result::Result<&'a str, ToolError> {
    input[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::Failed(format!("missing required field: {key}")))
}

/// Tool surface exposed to the orchestrator model.
pub fn orchestrator_tool_definitions() -> Vec<ToolDefinition> {
    let worker_types: Vec<&str> = WorkerType::ALL.iter().map(|w| w.label()).collect();
    vec![
        ToolDefinition {
            name: "dispatch_task".into(),
            description: "Hand a long-running task to a specialized worker. \
                          Returns immediately with a job id; the result is \
                          posted to the chat when the job finishes."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "worker_type": { "type": "string", "enum": worker_types },
                    "task": { "type": "string", "description": "Complete task description for the worker" },
                    "depends_on": { "type": "array", "items": { "type": "string" } },
                },
                "required": ["worker_type", "task"],
            }),
        },
        ToolDefinition {
            name: "list_jobs".into(),
            description: "List this chat's jobs and their statuses.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "cancel_job".into(),
            description: "Cancel a job by id, or every running job for this \
                          chat when no id is given."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": { "job_id": { "type": "string" } },
            }),
        },
        ToolDefinition {
            name: "create_automation".into(),
            description: "Create a recurring automation for this chat.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "schedule": {
                        "type": "object",
                        "description": "Tagged schedule: {kind: cron, expr} | {kind: interval, minutes} | {kind: random, min_minutes, max_minutes}",
                    },
                    "respect_quiet_hours": { "type": "boolean" },
                },
                "required": ["name", "description", "schedule"],
            }),
        },
        ToolDefinition {
            name: "list_automations".into(),
            description: "List this chat's automations.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "update_automation".into(),
            description: "Update fields of an existing automation.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "schedule": { "type": "object" },
                    "enabled": { "type": "boolean" },
                    "respect_quiet_hours": { "type": "boolean" },
                },
                "required": ["id"],
            }),
        },
        ToolDefinition {
            name: "delete_automation".into(),
            description: "Delete an automation by id.".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"],
            }),
        },
        ToolDefinition {
            name: "update_user_persona".into(),
            description: "Rewrite the stored notes about the user.".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"],
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use maestro_core::clock::SystemClock;
    use maestro_store::ConversationStore;

    use crate::ports::{
        EvolutionTracker, JournalManager, MemoryManager, PersonaManager, ShareQueue,
    };
    use crate::provider::ChatResponse;
    use crate::tools::ToolContext;

    // --- mocks -------------------------------------------------------------

    struct NullMemory;
    #[async_trait]
    impl MemoryManager for NullMemory {
        async fn add(&self, _chat: &ChatId, _text: &str) {}
        async fn list_recent(&self, _chat: &ChatId, _limit: usize) -> Vec<String> {
            vec![]
        }
        async fn search(&self, _chat: &ChatId, _query: &str, _limit: usize) -> Vec<String> {
            vec![]
        }
    }

    struct NullJournal;
    #[async_trait]
    impl JournalManager for NullJournal {
        async fn append(&self, _entry: &str) {}
        async fn for_date(&self, _date: &str) -> Option<String> {
            None
        }
        async fn list_dates(&self) -> Vec<String> {
            vec![]
        }
    }

    struct NullShares;
    #[async_trait]
    impl ShareQueue for NullShares {
        async fn enqueue(&self, _text: &str) {}
    }

    struct NullEvolution;
    #[async_trait]
    impl EvolutionTracker for NullEvolution {
        async fn record(&self, _note: &str) {}
        async fn history(&self, _limit: usize) -> Vec<String> {
            vec![]
        }
        async fn lessons(&self) -> Vec<String> {
            vec![]
        }
    }

    struct NullPersona;
    #[async_trait]
    impl PersonaManager for NullPersona {
        async fn current(&self) -> String {
            "You are a helpful assistant.".into()
        }
        async fn update(&self, _text: &str) {}
    }

    struct NullSkills;
    #[async_trait]
    impl SkillCatalog for NullSkills {
        async fn list(&self) -> Vec<(String, String)> {
            vec![]
        }
        async fn prompt(&self, _id: &str) -> Option<String> {
            None
        }
        async fn save_custom(&self, _name: &str, _prompt: &str) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send(&self, chat: &ChatId, text: &str) -> Option<i64> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((chat.to_string(), text.to_string()));
            Some(sent.len() as i64)
        }
        async fn edit(&self, _chat: &ChatId, _message_id: i64, _text: &str) {}
        async fn send_photo(&self, _chat: &ChatId, _path: &str, _caption: Option<&str>) {}
    }

    struct EchoTools;
    #[async_trait]
    impl ToolCatalog for EchoTools {
        fn definitions(&self, scope: &[&str]) -> Vec<ToolDefinition> {
            scope
                .iter()
                .map(|name| ToolDefinition {
                    name: name.to_string(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                })
                .collect()
        }
        async fn execute(
            &self,
            name: &str,
            input: Value,
            _ctx: &ToolContext,
        ) -> std::result::Result<Value, ToolError> {
            Ok(json!({ "tool": name, "echo": input }))
        }
    }

    /// Provider that pops scripted responses, then keeps ending the turn.
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ChatResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn end_turn(text: &str) -> ChatResponse {
            ChatResponse {
                text: text.into(),
                tool_calls: vec![],
                raw_content: json!([{ "type": "text", "text": text }]),
                stop_reason: StopReason::EndTurn,
            }
        }

        fn tool_use(name: &str, input: Value) -> ChatResponse {
            ChatResponse {
                text: String::new(),
                tool_calls: vec![ToolCall {
                    id: "t1".into(),
                    name: name.into(),
                    input,
                }],
                raw_content: json!([{ "type": "tool_use", "id": "t1", "name": name }]),
                stop_reason: StopReason::ToolUse,
            }
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn chat(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop() {
                Some(resp) => Ok(resp),
                None => Ok(Self::end_turn("done")),
            }
        }
        async fn ping(&self) -> std::result::Result<(), ProviderError> {
            Ok(())
        }
    }

    /// Provider that always wants another tool round.
    struct AlwaysToolUse;
    #[async_trait]
    impl ModelProvider for AlwaysToolUse {
        fn name(&self) -> &str {
            "looping"
        }
        async fn chat(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Ok(ScriptedProvider::tool_use("list_jobs", json!({})))
        }
        async fn ping(&self) -> std::result::Result<(), ProviderError> {
            Ok(())
        }
    }

    fn character(dir: &std::path::Path) -> Arc<CharacterContext> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Arc::new(CharacterContext {
            store: Arc::new(ConversationStore::open(dir, 200, 20, clock)),
            memory: Arc::new(NullMemory),
            journal: Arc::new(NullJournal),
            shares: Arc::new(NullShares),
            evolution: Arc::new(NullEvolution),
            persona: Arc::new(NullPersona),
        })
    }

    fn orchestrator_with(
        dir: &std::path::Path,
        provider: Arc<dyn ModelProvider>,
        max_depth: usize,
    ) -> (Arc<Orchestrator>, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let jobs = Arc::new(JobManager::new(3, clock.clone()));
        let orchestrator = Orchestrator::new(
            provider,
            "test-model".into(),
            character(dir),
            jobs,
            Arc::new(EchoTools),
            Arc::new(NullSkills),
            outbound.clone(),
            max_depth,
            clock,
        );
        (orchestrator, outbound)
    }

    #[tokio::test]
    async fn greeting_round_trip_appends_both_turns() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::end_turn("hi!")]));
        let (orchestrator, _outbound) = orchestrator_with(dir.path(), provider, 5);

        let chat = ChatId::new("c1");
        let reply = orchestrator.process_message(&chat, "hi").await.unwrap();
        assert_eq!(reply, "hi!");

        let ctx = orchestrator.character().await;
        let history = ctx.store.history(&chat);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content.as_text(), Some("hi"));
        assert_eq!(history[1].content.as_text(), Some("hi!"));
        assert!(orchestrator.jobs().list(&chat).is_empty(), "no job for a greeting");
    }

    #[tokio::test]
    async fn depth_cap_appends_fixed_message() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _outbound) = orchestrator_with(dir.path(), Arc::new(AlwaysToolUse), 4);

        let chat = ChatId::new("c1");
        let reply = orchestrator.process_message(&chat, "loop forever").await.unwrap();
        assert_eq!(reply, "Reached maximum orchestrator depth (4).");

        let ctx = orchestrator.character().await;
        let history = ctx.store.history(&chat);
        assert_eq!(
            history.last().unwrap().content.as_text(),
            Some("Reached maximum orchestrator depth (4).")
        );
    }

    #[tokio::test]
    async fn dispatch_creates_job_and_posts_completion_chunk() {
        let dir = tempfile::tempdir().unwrap();
        // Orchestrator dispatches, then replies; the worker's provider is the
        // same scripted one, whose next response completes the job.
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_use(
                "dispatch_task",
                json!({ "worker_type": "coding", "task": "create hello.py and run it" }),
            ),
            // Worker run: immediate completion.
            ScriptedProvider::end_turn("created hello.py"),
            // Orchestrator's follow-up turn after the tool result.
            ScriptedProvider::end_turn("On it — dispatched a coding job."),
        ]));
        let (orchestrator, outbound) = orchestrator_with(dir.path(), provider, 5);

        let chat = ChatId::new("c1");
        let reply = orchestrator
            .process_message(&chat, "build hello.py and run it")
            .await
            .unwrap();
        assert!(!reply.is_empty());

        // Let the worker task and event bridge drain.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let jobs = orchestrator.jobs().list(&chat);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Completed);

        let sent = outbound.sent.lock().unwrap();
        assert!(
            sent.iter().any(|(_, text)| text.contains("✅ coding finished")
                && text.contains(&jobs[0].id)),
            "completion chunk must be delivered with the job id: {sent:?}"
        );

        let ctx = orchestrator.character().await;
        let history = ctx.store.history(&chat);
        let logged = history
            .iter()
            .filter_map(|m| m.content.as_text())
            .any(|t| t.contains("✅ coding finished"));
        assert!(logged, "completion chunk must be appended to the log");
    }

    #[tokio::test]
    async fn cancel_job_emits_single_cancelled_event() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (orchestrator, outbound) = orchestrator_with(dir.path(), provider, 5);

        let chat = ChatId::new("c1");
        let job = orchestrator
            .jobs()
            .create(&chat, WorkerType::Coding, "long task", vec![]);
        orchestrator.jobs().start(&job.id);

        let mut rx = orchestrator.jobs().subscribe();
        orchestrator.jobs().cancel(&job.id).unwrap();
        orchestrator.jobs().cancel(&job.id); // idempotent, no second event

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, JobEvent::Cancelled(_)));
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = outbound.sent.lock().unwrap();
        assert!(sent
            .iter()
            .any(|(_, text)| text.contains(&format!("🚫 Cancelled job {}", job.id))));
    }

    #[tokio::test]
    async fn unexpected_stop_reason_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse {
            text: String::new(),
            tool_calls: vec![],
            raw_content: json!([]),
            stop_reason: StopReason::Other,
        }]));
        let (orchestrator, _outbound) = orchestrator_with(dir.path(), provider, 5);

        let reply = orchestrator
            .process_message(&ChatId::new("c1"), "hm")
            .await
            .unwrap();
        assert_eq!(reply, UNEXPECTED_RESPONSE);
    }
}
