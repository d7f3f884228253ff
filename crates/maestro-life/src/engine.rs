//! Timer loop choosing activities under cooldowns and quiet hours, and
//! routing their output to the configured stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use maestro_agent::orchestrator::Orchestrator;
use maestro_agent::ports::{LifeControl, SyntheticRunner};
use maestro_core::clock::Clock;
use maestro_core::quiet::QuietHours;
use maestro_core::types::ChatId;

use crate::kinds::ActivityKind;

/// Activity history entries kept for `/life review`.
const REVIEW_TAIL: usize = 10;

pub struct LifeEngine {
    runner: Arc<dyn SyntheticRunner>,
    orchestrator: Arc<Orchestrator>,
    paused: AtomicBool,
    idle_interval: Duration,
    quiet: QuietHours,
    clock: Arc<dyn Clock>,
    last_run: Mutex<HashMap<ActivityKind, DateTime<Utc>>>,
    recent: Mutex<Vec<(DateTime<Utc>, ActivityKind)>>,
}

impl LifeEngine {
    /// Build the engine and start its timer loop.
    pub fn start(
        runner: Arc<dyn SyntheticRunner>,
        orchestrator: Arc<Orchestrator>,
        idle_minutes: u64,
        quiet: QuietHours,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            runner,
            orchestrator,
            paused: AtomicBool::new(false),
            idle_interval: Duration::from_secs(idle_minutes * 60),
            quiet,
            clock,
            last_run: Mutex::new(HashMap::new()),
            recent: Mutex::new(Vec::new()),
        });
        Self::spawn_loop(&engine);
        engine
    }

    fn spawn_loop(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        tokio::spawn(async move {
            loop {
                let delay = match weak.upgrade() {
                    Some(engine) => engine.next_delay(),
                    None => return,
                };
                tokio::time::sleep(delay).await;

                let Some(engine) = weak.upgrade() else { return };
                engine.tick().await;
            }
        });
    }

    /// Idle interval with up to +20 % jitter.
    fn next_delay(&self) -> Duration {
        let base = self.idle_interval.as_secs().max(60);
        let jitter = rand::thread_rng().gen_range(0..=base / 5);
        Duration::from_secs(base + jitter)
    }

    async fn tick(&self) {
        if self.paused.load(Ordering::SeqCst) {
            debug!("life engine paused, skipping tick");
            return;
        }
        if self.quiet.is_quiet(self.clock.as_ref()) {
            debug!("quiet hours, life engine idle");
            return;
        }
        let Some(kind) = self.choose_activity() else {
            debug!("no eligible activity, all kinds cooling down");
            return;
        };
        if let Err(e) = self.run_activity(kind).await {
            warn!(kind = %kind, error = %e, "life activity failed");
        }
    }

    /// Pick a random kind whose cooldown has elapsed.
    fn choose_activity(&self) -> Option<ActivityKind> {
        let now = self.clock.now_utc();
        let last = self.last_run.lock().unwrap();
        let eligible: Vec<ActivityKind> = ActivityKind::ALL
            .into_iter()
            .filter(|kind| match last.get(kind) {
                Some(at) => {
                    let elapsed = (now - *at).to_std().unwrap_or_default();
                    elapsed >= kind.cooldown()
                }
                None => true,
            })
            .collect();
        eligible.choose(&mut rand::thread_rng()).copied()
    }

    /// Inject the activity prompt under `__life__` and route the reply.
    async fn run_activity(&self, kind: ActivityKind) -> Result<String, String> {
        let now = self.clock.now_utc();
        info!(kind = %kind, "life activity starting");
        {
            let mut last = self.last_run.lock().unwrap();
            last.insert(kind, now);
        }
        {
            let mut recent = self.recent.lock().unwrap();
            recent.push((now, kind));
            let len = recent.len();
            if len > REVIEW_TAIL * 2 {
                recent.drain(..len - REVIEW_TAIL);
            }
        }

        let reply = self
            .runner
            .run(&ChatId::life(), kind.prompt())
            .await
            .map_err(|e| e.to_string())?;

        self.route_reply(kind, &reply).await;
        Ok(reply)
    }

    /// Persist the reply where the activity's output belongs.
    async fn route_reply(&self, kind: ActivityKind, reply: &str) {
        if reply.is_empty() {
            return;
        }
        let ctx = self.orchestrator.character().await;
        match kind {
            ActivityKind::Journal => ctx.journal.append(reply).await,
            ActivityKind::Create => ctx.shares.enqueue(reply).await,
            ActivityKind::Reflect | ActivityKind::CodeReview | ActivityKind::SelfCode => {
                ctx.evolution.record(reply).await
            }
            ActivityKind::Think | ActivityKind::Browse => {
                ctx.memory.add(&ChatId::life(), reply).await
            }
        }
    }
}

#[async_trait]
impl LifeControl for LifeEngine {
    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("life engine paused");
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("life engine resumed");
    }

    /// Bypasses the timer, the cooldowns, pause, and quiet hours.
    async fn trigger_now(&self, kind: Option<&str>) -> Result<String, String> {
        let kind = match kind {
            Some(label) => label.parse::<ActivityKind>()?,
            None => *ActivityKind::ALL
                .choose(&mut rand::thread_rng())
                .expect("activity list is non-empty"),
        };
        self.run_activity(kind).await?;
        Ok(kind.label().to_string())
    }

    async fn review(&self) -> String {
        let paused = self.paused.load(Ordering::SeqCst);
        let recent = self.recent.lock().unwrap();
        let mut out = format!(
            "Life engine: {}\nIdle interval: {}m\n",
            if paused { "paused" } else { "running" },
            self.idle_interval.as_secs() / 60
        );
        if recent.is_empty() {
            out.push_str("No activities yet.");
        } else {
            out.push_str("Recent activities:\n");
            for (at, kind) in recent.iter().rev().take(REVIEW_TAIL) {
                out.push_str(&format!("- {} {}\n", at.format("%m-%d %H:%M"), kind));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use maestro_core::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    use maestro_agent::ports::{
        CharacterContext, EvolutionTracker, JournalManager, MemoryManager, Outbound,
        PersonaManager, ShareQueue, SkillCatalog,
    };
    use maestro_agent::provider::{ChatRequest, ChatResponse, ModelProvider, ProviderError, StopReason};
    use maestro_agent::tools::{ToolCatalog, ToolContext, ToolError};
    use maestro_jobs::JobManager;
    use maestro_store::ConversationStore;

    struct CountingRunner {
        runs: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SyntheticRunner for CountingRunner {
        async fn run(
            &self,
            chat: &ChatId,
            prompt: &str,
        ) -> Result<String, maestro_agent::AgentError> {
            assert!(chat.is_life(), "life traffic must use the reserved chat");
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("a reflective reply".to_string())
        }
    }

    struct RecordingJournal {
        entries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JournalManager for RecordingJournal {
        async fn append(&self, entry: &str) {
            self.entries.lock().unwrap().push(entry.to_string());
        }
        async fn for_date(&self, _date: &str) -> Option<String> {
            None
        }
        async fn list_dates(&self) -> Vec<String> {
            vec![]
        }
    }

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
            String::new()
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
        async fn save_custom(&self, _name: &str, _prompt: &str) -> Result<(), String> {
            Ok(())
        }
    }

    struct NullOutbound;
    #[async_trait]
    impl Outbound for NullOutbound {
        async fn send(&self, _chat: &ChatId, _text: &str) -> Option<i64> {
            None
        }
        async fn edit(&self, _chat: &ChatId, _message_id: i64, _text: &str) {}
        async fn send_photo(&self, _chat: &ChatId, _path: &str, _caption: Option<&str>) {}
    }

    struct NullProvider;
    #[async_trait]
    impl ModelProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                text: String::new(),
                tool_calls: vec![],
                raw_content: serde_json::json!([]),
                stop_reason: StopReason::EndTurn,
            })
        }
        async fn ping(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    struct NullTools;
    #[async_trait]
    impl ToolCatalog for NullTools {
        fn definitions(&self, _scope: &[&str]) -> Vec<maestro_agent::ToolDefinition> {
            vec![]
        }
        async fn execute(
            &self,
            name: &str,
            _input: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::Unknown(name.to_string()))
        }
    }

    fn engine_fixture(
        dir: &std::path::Path,
        quiet_contains_now: bool,
    ) -> (Arc<LifeEngine>, Arc<CountingRunner>, Arc<RecordingJournal>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let journal = Arc::new(RecordingJournal {
            entries: Mutex::new(Vec::new()),
        });
        let store = Arc::new(ConversationStore::open(
            dir,
            200,
            20,
            clock.clone() as Arc<dyn Clock>,
        ));
        let character = Arc::new(CharacterContext {
            store,
            memory: Arc::new(NullMemory),
            journal: journal.clone(),
            shares: Arc::new(NullShares),
            evolution: Arc::new(NullEvolution),
            persona: Arc::new(NullPersona),
        });
        let orchestrator = Orchestrator::new(
            Arc::new(NullProvider),
            "m".into(),
            character,
            Arc::new(JobManager::new(1, clock.clone() as Arc<dyn Clock>)),
            Arc::new(NullTools),
            Arc::new(NullSkills),
            Arc::new(NullOutbound),
            4,
            clock.clone() as Arc<dyn Clock>,
        );

        let t = clock.now_local().time();
        use chrono::Timelike;
        let m = t.hour() * 60 + t.minute();
        let quiet = if quiet_contains_now {
            QuietHours::new(m, (m + 60) % 1440)
        } else {
            QuietHours::new((m + 120) % 1440, (m + 180) % 1440)
        };

        let runner = Arc::new(CountingRunner {
            runs: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        });
        let engine = LifeEngine::start(runner.clone(), orchestrator, 45, quiet, clock.clone());
        (engine, runner, journal, clock)
    }

    #[tokio::test]
    async fn trigger_now_bypasses_cooldown_and_routes_journal() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, runner, journal, _clock) = engine_fixture(dir.path(), true);

        // Quiet hours and cooldowns do not stop an explicit trigger.
        let first = engine.trigger_now(Some("journal")).await.unwrap();
        assert_eq!(first, "journal");
        let second = engine.trigger_now(Some("journal")).await.unwrap();
        assert_eq!(second, "journal");

        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        assert_eq!(journal.entries.lock().unwrap().len(), 2);
        assert!(runner.prompts.lock().unwrap()[0].contains("journal entry"));
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _runner, _journal, _clock) = engine_fixture(dir.path(), false);
        assert!(engine.trigger_now(Some("nap")).await.is_err());
    }

    #[tokio::test]
    async fn cooldown_excludes_recent_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _runner, _journal, clock) = engine_fixture(dir.path(), false);

        engine.trigger_now(Some("journal")).await.unwrap();
        // Within the 4h cooldown the journal kind is ineligible.
        for _ in 0..50 {
            if let Some(kind) = engine.choose_activity() {
                assert_ne!(kind, ActivityKind::Journal);
            }
        }

        clock.advance(chrono::Duration::hours(5));
        let mut seen_journal = false;
        for _ in 0..200 {
            if engine.choose_activity() == Some(ActivityKind::Journal) {
                seen_journal = true;
                break;
            }
        }
        assert!(seen_journal, "journal must be eligible again after cooldown");
    }

    #[tokio::test]
    async fn paused_tick_dispatches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, runner, _journal, _clock) = engine_fixture(dir.path(), false);

        engine.pause().await;
        engine.tick().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);

        engine.resume().await;
        engine.tick().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quiet_hours_defer_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, runner, _journal, _clock) = engine_fixture(dir.path(), true);

        engine.tick().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn review_reports_state() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _runner, _journal, _clock) = engine_fixture(dir.path(), false);
        engine.trigger_now(Some("think")).await.unwrap();
        let review = engine.review().await;
        assert!(review.contains("running"));
        assert!(review.contains("think"));
    }
}
