//! End-to-end pipeline scenarios with a scripted provider, a recording
//! transport, and the clock frozen (tokio paused time).

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use maestro_agent::orchestrator::Orchestrator;
use maestro_agent::ports::{
    CharacterContext, CharacterManager, EvolutionTracker, JournalManager, MemoryManager,
    PersonaManager, ProviderFactory, ShareQueue, SkillCatalog, SyntheticRunner,
};
use maestro_agent::provider::{
    ChatRequest, ChatResponse, ModelProvider, ProviderError, StopReason, ToolCall, ToolDefinition,
};
use maestro_agent::tools::{ToolCatalog, ToolContext, ToolError};
use maestro_core::clock::{Clock, SystemClock};
use maestro_core::config::MaestroConfig;
use maestro_core::envstore::{ConfigStore, EnvStore};
use maestro_core::quiet::QuietHours;
use maestro_core::types::ChatId;
use maestro_jobs::{JobManager, JobStatus};
use maestro_pipeline::transport::TransportOutbound;
use maestro_pipeline::{
    ChatAction, ChatPipeline, IncomingMessage, ParseMode, Transport, TransportError,
};
use maestro_store::{ConversationStore, Role};

// --- recording transport -----------------------------------------------------

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    typing: AtomicUsize,
    next_id: AtomicUsize,
}

#[derive(Debug, Clone)]
struct SentMessage {
    chat: String,
    text: String,
    at: tokio::time::Instant,
}

impl RecordingTransport {
    fn texts_for(&self, chat: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat == chat)
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        chat: &ChatId,
        text: &str,
        _mode: ParseMode,
    ) -> Result<i64, TransportError> {
        self.sent.lock().unwrap().push(SentMessage {
            chat: chat.to_string(),
            text: text.to_string(),
            at: tokio::time::Instant::now(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1)
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
        self.typing.fetch_add(1, Ordering::SeqCst);
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

    async fn download_file(&self, _file_id: &str) -> Result<std::path::PathBuf, TransportError> {
        Err(TransportError::Download("not supported in tests".into()))
    }
}

// --- scripted provider -------------------------------------------------------

struct ScriptedProvider {
    responses: Mutex<Vec<ChatResponse>>,
    requests: Mutex<Vec<(ChatRequest, tokio::time::Instant)>>,
}

impl ScriptedProvider {
    fn new(mut responses: Vec<ChatResponse>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
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

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Text of the final user message of request `i`.
    fn user_text(&self, i: usize) -> String {
        let requests = self.requests.lock().unwrap();
        let (req, _) = &requests[i];
        let last = req.messages.last().unwrap();
        last["content"].as_str().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((req.clone(), tokio::time::Instant::now()));
        match self.responses.lock().unwrap().pop() {
            Some(resp) => Ok(resp),
            None => Ok(Self::end_turn("done")),
        }
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Provider whose calls never finish — a worker stuck mid-model-call.
struct StuckProvider;

#[async_trait]
impl ModelProvider for StuckProvider {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

// --- null collaborator ports -------------------------------------------------

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
        "Test persona.".into()
    }
    async fn update(&self, _text: &str) {}
}

struct NullCharacters;
#[async_trait]
impl CharacterManager for NullCharacters {
    async fn list(&self) -> Vec<String> {
        vec![]
    }
    async fn generate(&self, _answers: &[String]) -> Result<String, String> {
        Ok("generated".into())
    }
    async fn activate(&self, name: &str) -> Result<Arc<CharacterContext>, String> {
        Err(format!("no character {name}"))
    }
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
    async fn save_custom(&self, _name: &str, _prompt: &str) -> Result<(), String> {
        Ok(())
    }
}

struct NullFactory;
#[async_trait]
impl ProviderFactory for NullFactory {
    async fn create(
        &self,
        _kind: &str,
        _model: &str,
        _credential: &str,
    ) -> Result<Arc<dyn ModelProvider>, String> {
        Err("no factory in tests".into())
    }
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

    async fn execute(&self, name: &str, input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        Ok(json!({ "tool": name, "echo": input }))
    }
}

// --- fixture -----------------------------------------------------------------

struct Fixture {
    pipeline: Arc<ChatPipeline>,
    transport: Arc<RecordingTransport>,
    provider: Arc<ScriptedProvider>,
    orchestrator: Arc<Orchestrator>,
}

fn fixture(dir: &Path, responses: Vec<ChatResponse>) -> Fixture {
    let mut config = MaestroConfig::default();
    config.data_dir = dir.to_string_lossy().to_string();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport = Arc::new(RecordingTransport::default());
    let provider = ScriptedProvider::new(responses);
    let store = Arc::new(ConversationStore::open(
        dir,
        config.conversation.max_history,
        config.conversation.recent_window,
        clock.clone(),
    ));
    let character = Arc::new(CharacterContext {
        store,
        memory: Arc::new(NullMemory),
        journal: Arc::new(NullJournal),
        shares: Arc::new(NullShares),
        evolution: Arc::new(NullEvolution),
        persona: Arc::new(NullPersona),
    });
    let jobs = Arc::new(JobManager::new(config.jobs.max_concurrent_jobs, clock.clone()));
    let orchestrator = Orchestrator::new(
        provider.clone(),
        config.orchestrator.model.clone(),
        character,
        jobs,
        Arc::new(EchoTools),
        Arc::new(NullSkills),
        Arc::new(TransportOutbound::new(transport.clone())),
        config.orchestrator.max_tool_depth,
        clock.clone(),
    );
    let env: Arc<dyn ConfigStore> = Arc::new(EnvStore::open(dir));
    let pipeline = ChatPipeline::new(
        &config,
        transport.clone(),
        orchestrator.clone(),
        env,
        Arc::new(NullCharacters),
        Arc::new(NullSkills),
        Arc::new(NullFactory),
        Arc::new(EchoTools),
        clock,
    );

    Fixture {
        pipeline,
        transport,
        provider,
        orchestrator,
    }
}

fn message(chat: &str, user: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat: ChatId::new(chat),
        user_id: user.to_string(),
        username: None,
        message_id: 1,
        text: text.to_string(),
        document: None,
    }
}

async fn settle() {
    // Paused-time runs advance through every pending sleep here.
    tokio::time::sleep(Duration::from_secs(30)).await;
}

// --- scenarios ---------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn greeting_round_trip_with_typing_and_delay() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![ScriptedProvider::end_turn("hi!")]);

    f.pipeline
        .handle_incoming(message("c1", "owner", "hi"))
        .await;
    settle().await;

    let ctx = f.orchestrator.character().await;
    let history = ctx.store.history(&ChatId::new("c1"));
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content.as_text(), Some("hi"));
    assert_eq!(history[1].content.as_text(), Some("hi!"));

    assert!(f.orchestrator.jobs().list(&ChatId::new("c1")).is_empty());
    assert_eq!(f.transport.texts_for("c1"), vec!["hi!".to_string()]);
    assert!(
        f.transport.typing.load(Ordering::SeqCst) >= 1,
        "typing indicator must run during the turn"
    );
}

#[tokio::test(start_paused = true)]
async fn batching_coalesces_three_rapid_sends() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![ScriptedProvider::end_turn("ok")]);
    let start = tokio::time::Instant::now();

    // Sends at t0, t0 + w/2, t0 + w (w = 3s).
    f.pipeline.handle_incoming(message("c1", "owner", "a")).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    f.pipeline.handle_incoming(message("c1", "owner", "b")).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    f.pipeline.handle_incoming(message("c1", "owner", "c")).await;

    settle().await;

    // Exactly one orchestrator entry with the merged text.
    assert_eq!(f.provider.call_count(), 1);
    assert!(f.provider.user_text(0).contains("[1]: a\n\n[2]: b\n\n[3]: c"));

    // Flushed no earlier than t0 + 2w.
    let (_, at) = f.provider.requests.lock().unwrap()[0].clone();
    assert!(at.duration_since(start) >= Duration::from_secs(6));

    // One merged turn, one pair in the log.
    let ctx = f.orchestrator.character().await;
    assert_eq!(ctx.store.len(&ChatId::new("c1")), 2);
}

#[tokio::test(start_paused = true)]
async fn separate_batches_keep_order() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(
        dir.path(),
        vec![
            ScriptedProvider::end_turn("reply to A"),
            ScriptedProvider::end_turn("reply to B"),
        ],
    );

    f.pipeline.handle_incoming(message("c1", "owner", "A")).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    f.pipeline.handle_incoming(message("c1", "owner", "B")).await;
    settle().await;

    let ctx = f.orchestrator.character().await;
    let texts: Vec<String> = ctx
        .store
        .history(&ChatId::new("c1"))
        .iter()
        .filter_map(|m| m.content.as_text().map(String::from))
        .collect();
    assert_eq!(
        texts,
        vec!["A", "reply to A", "B", "reply to B"],
        "A strictly precedes B, and A's reply precedes B"
    );
}

#[tokio::test(start_paused = true)]
async fn unauthorized_user_gets_fixed_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![ScriptedProvider::end_turn("hello owner")]);

    // First user becomes the owner.
    f.pipeline.handle_incoming(message("c1", "111", "hi")).await;
    settle().await;

    // A different user is rejected without reaching the model.
    let calls_before = f.provider.call_count();
    f.pipeline
        .handle_incoming(message("c2", "999", "let me in"))
        .await;
    settle().await;

    assert_eq!(f.provider.call_count(), calls_before);
    let texts = f.transport.texts_for("c2");
    assert_eq!(texts, vec!["Sorry, I only talk to my owner.".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn long_replies_split_into_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let long_reply = "x".repeat(5000);
    let f = fixture(dir.path(), vec![ScriptedProvider::end_turn(&long_reply)]);

    f.pipeline
        .handle_incoming(message("c1", "owner", "write a lot"))
        .await;
    settle().await;

    let texts = f.transport.texts_for("c1");
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0].chars().count(), 4096);
    assert_eq!(texts[1].chars().count(), 5000 - 4096);
}

#[tokio::test(start_paused = true)]
async fn cancel_command_cancels_running_job_once() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(
        dir.path(),
        vec![
            ScriptedProvider::tool_use(
                "dispatch_task",
                json!({ "worker_type": "coding", "task": "long build" }),
            ),
            ScriptedProvider::end_turn("working on it"),
        ],
    );
    // The worker model hangs so the job stays running.
    f.orchestrator
        .switch_worker_provider(Arc::new(StuckProvider), "stuck-model".into())
        .await
        .unwrap();

    f.pipeline
        .handle_incoming(message("c1", "owner", "build the thing"))
        .await;
    settle().await;

    let chat = ChatId::new("c1");
    let running = f.orchestrator.jobs().list_running(&chat);
    assert_eq!(running.len(), 1, "exactly one running job");
    let job_id = running[0].id.clone();

    let mut rx = f.orchestrator.jobs().subscribe();
    f.pipeline
        .handle_incoming(message("c1", "owner", "/cancel"))
        .await;
    settle().await;

    assert_eq!(
        f.orchestrator.jobs().get(&job_id).unwrap().status,
        JobStatus::Cancelled
    );

    // job:cancelled fires exactly once.
    let mut cancelled_events = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, maestro_jobs::JobEvent::Cancelled(_)) {
            cancelled_events += 1;
        }
    }
    assert_eq!(cancelled_events, 1);

    let texts = f.transport.texts_for("c1");
    assert!(
        texts
            .iter()
            .any(|t| t.contains(&format!("🚫 Cancelled job {job_id}"))),
        "cancellation notice must be sent: {texts:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn commands_bypass_batching() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![]);

    let start = tokio::time::Instant::now();
    f.pipeline
        .handle_incoming(message("c1", "owner", "/jobs"))
        .await;

    // The reply lands well before the 3s batch window would close.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let texts = f.transport.texts_for("c1");
    assert_eq!(texts, vec!["No jobs yet.".to_string()]);
    let sent_at = f.transport.sent.lock().unwrap()[0].at;
    assert!(sent_at.duration_since(start) < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn automation_fires_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(
        dir.path(),
        vec![ScriptedProvider::end_turn("automation handled")],
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let quiet = QuietHours::new(0, 0); // empty window: never quiet
    let automations = maestro_automation::AutomationManager::open(dir.path(), 10, 5, quiet, clock);
    automations.set_runner(f.pipeline.clone() as Arc<dyn SyntheticRunner>);

    let chat = ChatId::new("c1");
    let automation = automations
        .create(
            &chat,
            "ping",
            "report status",
            maestro_scheduler::Schedule::Interval { minutes: 10 },
            false,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(601)).await;
    settle().await;

    let after = automations.get(&automation.id).unwrap();
    assert_eq!(after.run_count, 1);
    assert!(after.last_error.is_none());
    assert!(after.next_run.unwrap() > after.last_run.unwrap());

    // The synthetic prompt went through the orchestrator and the reply
    // reached the transport.
    assert!(f
        .provider
        .user_text(0)
        .contains("[AUTOMATION: ping] report status"));
    assert!(f
        .transport
        .texts_for("c1")
        .contains(&"automation handled".to_string()));

    // And it is recorded in the conversation log.
    let ctx = f.orchestrator.character().await;
    let texts: Vec<String> = ctx
        .store
        .history(&chat)
        .iter()
        .filter_map(|m| m.content.as_text().map(String::from))
        .collect();
    assert!(texts[0].contains("[AUTOMATION: ping]"));
}
