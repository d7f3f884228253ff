//! The per-chat message pipeline.
//!
//! Inbound flow: authorization → pending-input machines → command
//! interception (bypasses batching) → sliding-window batching → strict
//! per-chat FIFO → orchestrator turn → human-delayed, chunked delivery.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use maestro_agent::error::AgentError;
use maestro_agent::orchestrator::Orchestrator;
use maestro_agent::ports::{
    AutomationOps, CharacterManager, LifeControl, ProviderFactory, SkillCatalog, SyntheticRunner,
};
use maestro_agent::tools::{ToolCatalog, ToolContext};
use maestro_agent::truncate::truncate_result;
use maestro_core::clock::Clock;
use maestro_core::config::MaestroConfig;
use maestro_core::envstore::ConfigStore;
use maestro_core::types::ChatId;
use maestro_store::Role;

use crate::auth::{AuthDecision, Authorizer, REJECTION_SENTENCE};
use crate::batch::{BatchOutcome, MessageBatcher};
use crate::commands::{
    self, AutoCmd, Command, EvolutionCmd, LifeCmd, LinkedinCmd, SkillsCmd,
};
use crate::delay::{inter_chunk_delay, pre_send_delay};
use crate::pending::{
    ClaudeAuthKind, PendingInput, PendingInputs, SkillStep, CHARACTER_QUESTIONS,
};
use crate::queue::ChatQueues;
use crate::ratelimit::RateLimiter;
use crate::split::split_reply;
use crate::transport::{send_with_fallback, IncomingEvent, IncomingMessage, Transport};
use crate::typing::TypingHandle;

pub struct ChatPipeline {
    transport: Arc<dyn Transport>,
    orchestrator: Arc<Orchestrator>,
    auth: Authorizer,
    batcher: MessageBatcher,
    queues: ChatQueues,
    pending: PendingInputs,
    limiter: RateLimiter,
    env: Arc<dyn ConfigStore>,
    characters: Arc<dyn CharacterManager>,
    skills: Arc<dyn SkillCatalog>,
    provider_factory: Arc<dyn ProviderFactory>,
    worker_tools: Arc<dyn ToolCatalog>,
    life: OnceLock<Arc<dyn LifeControl>>,
    automations: OnceLock<Arc<dyn AutomationOps>>,
    admin_chat: Option<ChatId>,
    clock: Arc<dyn Clock>,
}

impl ChatPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &MaestroConfig,
        transport: Arc<dyn Transport>,
        orchestrator: Arc<Orchestrator>,
        env: Arc<dyn ConfigStore>,
        characters: Arc<dyn CharacterManager>,
        skills: Arc<dyn SkillCatalog>,
        provider_factory: Arc<dyn ProviderFactory>,
        worker_tools: Arc<dyn ToolCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            orchestrator,
            auth: Authorizer::new(env.clone()),
            batcher: MessageBatcher::new(Duration::from_millis(config.pipeline.batch_window_ms)),
            queues: ChatQueues::new(),
            pending: PendingInputs::new(),
            limiter: RateLimiter::new(Duration::from_secs(60), 30),
            env,
            characters,
            skills,
            provider_factory,
            worker_tools,
            life: OnceLock::new(),
            automations: OnceLock::new(),
            admin_chat: config.pipeline.admin_chat.clone().map(ChatId::new),
            clock,
        })
    }

    pub fn set_life(&self, life: Arc<dyn LifeControl>) {
        let _ = self.life.set(life);
    }

    pub fn set_automations(&self, ops: Arc<dyn AutomationOps>) {
        let _ = self.automations.set(ops);
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Entry point for the transport's inbound event stream.
    pub async fn handle_event(self: &Arc<Self>, event: IncomingEvent) {
        match event {
            IncomingEvent::Message(msg) => self.handle_incoming(msg).await,
            IncomingEvent::CallbackQuery { chat, data, .. } => {
                debug!(chat = %chat, data = %data, "callback query ignored by core");
            }
            IncomingEvent::Reaction { chat, emoji, .. } => {
                debug!(chat = %chat, emoji = %emoji, "reaction noted");
            }
        }
    }

    pub async fn handle_incoming(self: &Arc<Self>, msg: IncomingMessage) {
        if !self.limiter.allow(&msg.user_id) {
            debug!(user = %msg.user_id, "rate limited, message dropped");
            return;
        }

        match self.auth.check(&msg.user_id) {
            AuthDecision::RegisteredOwner => {
                info!(user = %msg.user_id, "owner registered on first contact");
            }
            AuthDecision::Allowed => {}
            AuthDecision::Denied => {
                let _ = send_with_fallback(self.transport.as_ref(), &msg.chat, REJECTION_SENTENCE)
                    .await;
                if let Some(admin) = &self.admin_chat {
                    let notice = format!("Unauthorized contact from {}", msg.user_id);
                    let _ = send_with_fallback(self.transport.as_ref(), admin, &notice).await;
                }
                return;
            }
        }

        // Pending-input machines swallow the next message for their chat.
        if self.pending.is_pending(&msg.chat) {
            if let Some(reply) = self.handle_pending(&msg).await {
                let _ = send_with_fallback(self.transport.as_ref(), &msg.chat, &reply).await;
            }
            return;
        }

        // Commands bypass batching entirely.
        if commands::is_command(&msg.text) {
            if let Some(cmd) = commands::parse(&msg.text) {
                let this = Arc::clone(self);
                let chat = msg.chat.clone();
                self.queues.enqueue(&msg.chat, async move {
                    if let Some(reply) = this.handle_command(cmd, &chat).await {
                        let _ =
                            send_with_fallback(this.transport.as_ref(), &chat, &reply).await;
                    }
                });
                return;
            }
            // Unknown verb: fall through to the model like any other text.
        }

        // The batch wait runs off the event loop so later messages can
        // keep joining the window while the first sender blocks on it.
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let merged = match this.batcher.submit(&msg.chat, &msg.text).await {
                BatchOutcome::Merged(text) => text,
                BatchOutcome::Skip => return,
            };
            let runner = Arc::clone(&this);
            let chat = msg.chat.clone();
            this.queues.enqueue(&msg.chat, async move {
                runner.run_turn(&chat, &merged).await;
            });
        });
    }

    /// One orchestrator turn with typing indicator and delayed delivery.
    async fn run_turn(&self, chat: &ChatId, text: &str) {
        let typing = TypingHandle::start(self.transport.clone(), chat.clone());
        let result = self.orchestrator.process_message(chat, text).await;
        typing.stop();

        match result {
            Ok(reply) => self.deliver_reply(chat, &reply).await,
            Err(e) => {
                warn!(chat = %chat, error = %e, "orchestrator turn failed");
                let _ = send_with_fallback(
                    self.transport.as_ref(),
                    chat,
                    &format!("⚠️ {e}"),
                )
                .await;
            }
        }
    }

    /// Split, humanize, and send a reply.
    pub async fn deliver_reply(&self, chat: &ChatId, reply: &str) {
        if reply.is_empty() {
            return;
        }
        let chunks = split_reply(reply);
        tokio::time::sleep(pre_send_delay(reply.chars().count())).await;

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(inter_chunk_delay(chunk.chars().count())).await;
            }
            let _ = send_with_fallback(self.transport.as_ref(), chat, chunk).await;
        }
    }

    // --- pending-input machines --------------------------------------------

    async fn handle_pending(&self, msg: &IncomingMessage) -> Option<String> {
        let machine = self.pending.take(&msg.chat)?;
        let text = msg.text.trim();

        if text.eq_ignore_ascii_case("cancel") {
            return Some("Cancelled.".to_string());
        }

        match machine {
            PendingInput::BrainKey { provider, model } => {
                Some(self.finish_key_entry(&provider, &model, text, false).await)
            }
            PendingInput::OrchestratorKey { provider, model } => {
                Some(self.finish_key_entry(&provider, &model, text, true).await)
            }

            PendingInput::ClaudeAuth { kind } => {
                let key_name = match kind {
                    ClaudeAuthKind::ApiKey => "ANTHROPIC_API_KEY",
                    ClaudeAuthKind::OauthToken => "CLAUDE_OAUTH_TOKEN",
                };
                if let Err(e) = self.env.save_credential(key_name, text) {
                    return Some(format!("Could not save the credential: {e}"));
                }
                Some("Credential saved.".to_string())
            }

            PendingInput::CustomSkill { step } => match step {
                SkillStep::Name => {
                    let name = text.to_string();
                    if name.is_empty() {
                        self.pending.begin(
                            &msg.chat,
                            PendingInput::CustomSkill {
                                step: SkillStep::Name,
                            },
                        );
                        return Some("The skill needs a name. Try again (or `cancel`).".into());
                    }
                    self.pending.begin(
                        &msg.chat,
                        PendingInput::CustomSkill {
                            step: SkillStep::Prompt { name },
                        },
                    );
                    Some("Now send the skill prompt — as text or a file upload.".into())
                }
                SkillStep::Prompt { name } => {
                    let prompt = match self.read_prompt_source(msg).await {
                        Ok(p) => p,
                        Err(reply) => {
                            self.pending.begin(
                                &msg.chat,
                                PendingInput::CustomSkill {
                                    step: SkillStep::Prompt { name },
                                },
                            );
                            return Some(reply);
                        }
                    };
                    match self.skills.save_custom(&name, &prompt).await {
                        Ok(()) => Some(format!("Skill `{name}` saved. Activate it with /skills {name}.")),
                        Err(e) => Some(format!("Could not save the skill: {e}")),
                    }
                }
            },

            PendingInput::CustomCharacter { mut answers } => {
                answers.push(text.to_string());
                if answers.len() < CHARACTER_QUESTIONS.len() {
                    let next = CHARACTER_QUESTIONS[answers.len()];
                    self.pending
                        .begin(&msg.chat, PendingInput::CustomCharacter { answers });
                    return Some(next.to_string());
                }
                match self.characters.generate(&answers).await {
                    Ok(name) => Some(format!(
                        "Character `{name}` created. Switch with /character {name}."
                    )),
                    Err(e) => Some(format!("Character generation failed: {e}")),
                }
            }
        }
    }

    async fn finish_key_entry(
        &self,
        provider: &str,
        model: &str,
        credential: &str,
        orchestrator_role: bool,
    ) -> String {
        let key_name = format!("{}_API_KEY", provider.to_uppercase());
        if let Err(e) = self.env.save_credential(&key_name, credential) {
            return format!("Could not save the credential: {e}");
        }
        let role = if orchestrator_role { "orchestrator" } else { "brain" };
        let _ = self.env.save_provider(role, model);

        match self.provider_factory.create(provider, model, credential).await {
            Ok(instance) => {
                let switched = if orchestrator_role {
                    self.orchestrator
                        .switch_orchestrator_provider(instance, model.to_string())
                        .await
                } else {
                    self.orchestrator
                        .switch_worker_provider(instance, model.to_string())
                        .await
                };
                match switched {
                    Ok(()) => format!("{role} is now {provider} / {model}."),
                    Err(e) => format!("Saved the key, but the provider did not respond: {e}"),
                }
            }
            Err(e) => format!("Saved the key, but could not build the provider: {e}"),
        }
    }

    /// Prompt text for a custom skill: message text, or an uploaded file.
    async fn read_prompt_source(&self, msg: &IncomingMessage) -> Result<String, String> {
        if let Some(file_id) = &msg.document {
            let path = self
                .transport
                .download_file(file_id)
                .await
                .map_err(|e| format!("Download failed: {e}. Send the prompt as text?"))?;
            return std::fs::read_to_string(&path)
                .map_err(|e| format!("Could not read the uploaded file: {e}"));
        }
        if msg.text.trim().is_empty() {
            return Err("Send the prompt as text or a file (or `cancel`).".into());
        }
        Ok(msg.text.trim().to_string())
    }

    // --- command execution --------------------------------------------------

    async fn handle_command(self: &Arc<Self>, cmd: Command, chat: &ChatId) -> Option<String> {
        match cmd {
            Command::Help => Some(commands::help_text()),

            Command::Jobs => {
                let jobs = self.orchestrator.jobs().list(chat);
                if jobs.is_empty() {
                    return Some("No jobs yet.".into());
                }
                Some(
                    jobs.iter()
                        .map(|j| j.summary_line())
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
            }

            Command::Cancel(Some(id)) => match self.orchestrator.jobs().cancel(&id) {
                Some(_) => None, // the event bridge posts the 🚫 message
                None => Some(format!("No running job with id {id}.")),
            },
            Command::Cancel(None) => {
                let cancelled = self.orchestrator.jobs().cancel_all_for_chat(chat);
                if cancelled.is_empty() {
                    Some("No running jobs.".into())
                } else {
                    None
                }
            }

            Command::Clean => {
                let ctx = self.orchestrator.character().await;
                ctx.store.clear(chat);
                Some("Conversation cleared.".into())
            }

            Command::History => {
                let ctx = self.orchestrator.character().await;
                let history = ctx.store.summarized_history(chat);
                if history.is_empty() {
                    return Some("History is empty.".into());
                }
                let tail: Vec<String> = history
                    .iter()
                    .rev()
                    .take(10)
                    .rev()
                    .map(|m| {
                        let who = match m.role {
                            Role::User => "you",
                            Role::Assistant => "me",
                        };
                        format!("{who}: {}", m.content.render())
                    })
                    .collect();
                Some(tail.join("\n"))
            }

            Command::Context => {
                let ctx = self.orchestrator.character().await;
                let skill = ctx
                    .store
                    .active_skill(chat)
                    .unwrap_or_else(|| "none".into());
                let running = self.orchestrator.jobs().list_running(chat).len();
                Some(format!(
                    "Active skill: {skill}\nMessages in history: {}\nRunning jobs: {running}",
                    ctx.store.len(chat)
                ))
            }

            Command::Skills(sub) => self.handle_skills(sub, chat).await,

            Command::Character(None) => {
                let list = self.characters.list().await;
                if list.is_empty() {
                    return Some(
                        "No characters yet. Create one with /character new.".into(),
                    );
                }
                Some(format!(
                    "Characters: {}\nSwitch with /character <name>, or /character new.",
                    list.join(", ")
                ))
            }
            Command::Character(Some(arg)) if arg == "new" => {
                self.pending
                    .begin(chat, PendingInput::CustomCharacter { answers: vec![] });
                Some(CHARACTER_QUESTIONS[0].to_string())
            }
            Command::Character(Some(name)) => match self.characters.activate(&name).await {
                Ok(ctx) => {
                    self.orchestrator.switch_character(ctx).await;
                    Some(format!("Switched to {name}."))
                }
                Err(e) => Some(format!("Could not switch character: {e}")),
            },

            Command::Brain(None) => {
                Some("Usage: /brain <provider> <model> — I'll ask for the key next.".into())
            }
            Command::Brain(Some((provider, model))) => {
                self.pending
                    .begin(chat, PendingInput::BrainKey { provider: provider.clone(), model });
                Some(format!(
                    "Send the API key for {provider} (or `cancel`)."
                ))
            }
            Command::Orchestrator(None) => {
                Some("Usage: /orchestrator <provider> <model> — I'll ask for the key next.".into())
            }
            Command::Orchestrator(Some((provider, model))) => {
                self.pending.begin(
                    chat,
                    PendingInput::OrchestratorKey { provider: provider.clone(), model },
                );
                Some(format!(
                    "Send the API key for {provider} (or `cancel`)."
                ))
            }

            Command::ClaudeModel(None) => Some("Usage: /claudemodel <model>".into()),
            Command::ClaudeModel(Some(model)) => {
                let _ = self.env.save_provider("claude", &model);
                Some(format!("Claude model set to {model}."))
            }

            Command::Claude(arg) => {
                let kind = match arg.as_deref() {
                    Some("api_key") | None => ClaudeAuthKind::ApiKey,
                    Some("oauth_token") => ClaudeAuthKind::OauthToken,
                    Some(other) => {
                        return Some(format!(
                            "Unknown auth type `{other}`. Use api_key or oauth_token."
                        ))
                    }
                };
                self.pending.begin(chat, PendingInput::ClaudeAuth { kind });
                Some("Send the credential (or `cancel`).".into())
            }

            Command::Auto(sub) => self.handle_auto(sub, chat).await,
            Command::Life(sub) => self.handle_life(sub).await,

            Command::Journal(arg) => {
                let ctx = self.orchestrator.character().await;
                match arg.as_deref() {
                    Some("list") => {
                        let dates = ctx.journal.list_dates().await;
                        if dates.is_empty() {
                            Some("The journal is empty.".into())
                        } else {
                            Some(dates.join("\n"))
                        }
                    }
                    Some(date) => Some(
                        ctx.journal
                            .for_date(date)
                            .await
                            .unwrap_or_else(|| format!("No journal entry for {date}.")),
                    ),
                    None => {
                        let today = self.clock.now_local().format("%Y-%m-%d").to_string();
                        Some(
                            ctx.journal
                                .for_date(&today)
                                .await
                                .unwrap_or_else(|| "Nothing in the journal today.".into()),
                        )
                    }
                }
            }

            Command::Memories(query) => {
                let ctx = self.orchestrator.character().await;
                let found = match query {
                    Some(q) => ctx.memory.search(chat, &q, 10).await,
                    None => ctx.memory.list_recent(chat, 10).await,
                };
                if found.is_empty() {
                    Some("No memories found.".into())
                } else {
                    Some(found.join("\n"))
                }
            }

            Command::Evolution(sub) => {
                let ctx = self.orchestrator.character().await;
                match sub {
                    EvolutionCmd::Summary => {
                        let recent = ctx.evolution.history(5).await;
                        if recent.is_empty() {
                            Some("No evolution activity yet.".into())
                        } else {
                            Some(recent.join("\n"))
                        }
                    }
                    EvolutionCmd::History => Some(join_or(
                        ctx.evolution.history(20).await,
                        "No evolution history.",
                    )),
                    EvolutionCmd::Lessons => {
                        Some(join_or(ctx.evolution.lessons().await, "No lessons yet."))
                    }
                    EvolutionCmd::Trigger => {
                        ctx.evolution.record("manual evolution trigger").await;
                        Some("Evolution cycle triggered.".into())
                    }
                    EvolutionCmd::Scan => {
                        ctx.evolution.record("manual code scan").await;
                        Some("Scan queued.".into())
                    }
                }
            }

            Command::Linkedin(sub) => match sub {
                LinkedinCmd::Status => {
                    let linked = self
                        .env
                        .get("LINKEDIN_TOKEN")
                        .is_some_and(|v| !v.is_empty());
                    Some(if linked {
                        "LinkedIn is linked.".into()
                    } else {
                        "LinkedIn is not linked. Use /linkedin link <token>.".into()
                    })
                }
                LinkedinCmd::Link(token) => match self.env.save_credential("LINKEDIN_TOKEN", &token)
                {
                    Ok(()) => Some("LinkedIn linked.".into()),
                    Err(e) => Some(format!("Could not save the token: {e}")),
                },
                LinkedinCmd::Unlink => {
                    let _ = self.env.save_credential("LINKEDIN_TOKEN", "");
                    Some("LinkedIn unlinked.".into())
                }
            },

            Command::Browse(url) => Some(self.run_browser_tool(
                chat,
                "browser_goto",
                serde_json::json!({ "url": url }),
            )
            .await),
            Command::Screenshot(url) => {
                let result = self
                    .worker_tools
                    .execute(
                        "browser_screenshot",
                        serde_json::json!({ "url": url }),
                        &ToolContext::for_chat(chat.clone()),
                    )
                    .await;
                match result {
                    Ok(value) => {
                        if let Some(path) = value["path"].as_str() {
                            self.transport
                                .send_photo(chat, path, Some(&url))
                                .await
                                .ok();
                            None
                        } else {
                            Some(truncate_result(&value))
                        }
                    }
                    Err(e) => Some(format!("Screenshot failed: {e}")),
                }
            }
            Command::Extract { url, selector } => Some(
                self.run_browser_tool(
                    chat,
                    "browser_extract",
                    serde_json::json!({ "url": url, "selector": selector }),
                )
                .await,
            ),
        }
    }

    async fn handle_skills(&self, sub: SkillsCmd, chat: &ChatId) -> Option<String> {
        let ctx = self.orchestrator.character().await;
        match sub {
            SkillsCmd::List => {
                let available = self.skills.list().await;
                let active = ctx.store.active_skill(chat);
                let mut out = String::from("Skills:\n");
                for (id, description) in &available {
                    let marker = if active.as_deref() == Some(id) { "▸" } else { "-" };
                    out.push_str(&format!("{marker} `{id}` — {description}\n"));
                }
                if available.is_empty() {
                    out.push_str("(none)\n");
                }
                out.push_str("Use /skills <id>, /skills reset, or /skills new.");
                Some(out)
            }
            SkillsCmd::Reset => {
                ctx.store.set_active_skill(chat, None);
                Some("Skill reset.".into())
            }
            SkillsCmd::New => {
                self.pending.begin(
                    chat,
                    PendingInput::CustomSkill {
                        step: SkillStep::Name,
                    },
                );
                Some("What should the new skill be called?".into())
            }
            SkillsCmd::Select(id) => {
                if self.skills.prompt(&id).await.is_none() {
                    return Some(format!("No skill named `{id}`."));
                }
                ctx.store.set_active_skill(chat, Some(id.clone()));
                Some(format!("Skill `{id}` active for this chat."))
            }
        }
    }

    async fn handle_auto(self: &Arc<Self>, sub: AutoCmd, chat: &ChatId) -> Option<String> {
        let Some(ops) = self.automations.get() else {
            return Some("Automations are not available.".into());
        };
        match sub {
            AutoCmd::List => {
                let listing = ops.list_automations(chat).await;
                let items = listing["automations"].as_array().cloned().unwrap_or_default();
                if items.is_empty() {
                    return Some("No automations. Describe one with /auto <text>.".into());
                }
                let lines: Vec<String> = items
                    .iter()
                    .map(|a| {
                        format!(
                            "{} `{}` {} — next {}",
                            if a["enabled"].as_bool().unwrap_or(false) { "▶️" } else { "⏸" },
                            a["id"].as_str().unwrap_or("?"),
                            a["name"].as_str().unwrap_or("?"),
                            a["next_run"].as_str().unwrap_or("—"),
                        )
                    })
                    .collect();
                Some(lines.join("\n"))
            }
            AutoCmd::Pause(id) => Some(
                match ops
                    .update_automation(chat, serde_json::json!({ "id": id, "enabled": false }))
                    .await
                {
                    Ok(_) => format!("Automation {id} paused."),
                    Err(e) => e,
                },
            ),
            AutoCmd::Resume(id) => Some(
                match ops
                    .update_automation(chat, serde_json::json!({ "id": id, "enabled": true }))
                    .await
                {
                    Ok(_) => format!("Automation {id} resumed."),
                    Err(e) => e,
                },
            ),
            AutoCmd::Delete(id) => Some(match ops.delete_automation(chat, &id).await {
                Ok(_) => format!("Automation {id} deleted."),
                Err(e) => e,
            }),
            AutoCmd::Run(id) => Some(match ops.run_automation(chat, &id).await {
                Ok(_) => format!("Automation {id} running."),
                Err(e) => e,
            }),
            AutoCmd::Natural(text) => {
                // The orchestrator owns create_automation; let it interpret.
                let this = Arc::clone(self);
                let chat = chat.clone();
                let prompt = format!("Set up an automation: {text}");
                tokio::spawn(async move {
                    this.run_turn(&chat, &prompt).await;
                });
                None
            }
        }
    }

    async fn handle_life(&self, sub: LifeCmd) -> Option<String> {
        let Some(life) = self.life.get() else {
            return Some("The life engine is not running.".into());
        };
        match sub {
            LifeCmd::Review => Some(life.review().await),
            LifeCmd::Pause => {
                life.pause().await;
                Some("Life engine paused.".into())
            }
            LifeCmd::Resume => {
                life.resume().await;
                Some("Life engine resumed.".into())
            }
            LifeCmd::Trigger(kind) => match life.trigger_now(kind.as_deref()).await {
                Ok(activity) => Some(format!("Triggered: {activity}")),
                Err(e) => Some(e),
            },
        }
    }

    async fn run_browser_tool(
        &self,
        chat: &ChatId,
        tool: &str,
        input: serde_json::Value,
    ) -> String {
        match self
            .worker_tools
            .execute(tool, input, &ToolContext::for_chat(chat.clone()))
            .await
        {
            Ok(value) => truncate_result(&value),
            Err(e) => format!("{tool} failed: {e}"),
        }
    }
}

fn join_or(items: Vec<String>, fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join("\n")
    }
}

/// Synthetic prompts (automations, life engine) flow through the same
/// per-chat FIFO as live traffic, so history mutations never interleave.
#[async_trait::async_trait]
impl SyntheticRunner for ChatPipeline {
    async fn run(&self, chat: &ChatId, prompt: &str) -> Result<String, AgentError> {
        let orchestrator = self.orchestrator.clone();
        let transport = self.transport.clone();
        let chat_clone = chat.clone();
        let prompt = prompt.to_string();
        let deliver = !chat.is_life();

        let rx = self.queues.run(chat, async move {
            let result = orchestrator.process_message(&chat_clone, &prompt).await;
            if let (true, Ok(reply)) = (deliver, &result) {
                // Synthetic replies skip the human-typing delays.
                for chunk in split_reply(reply) {
                    let _ = send_with_fallback(transport.as_ref(), &chat_clone, &chunk).await;
                }
            }
            result
        });

        rx.await
            .map_err(|_| AgentError::Internal("chat queue dropped the task".into()))?
    }
}
